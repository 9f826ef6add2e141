use tokio::sync::broadcast;

use crate::service::views::ChannelView;

/// Called by the service after a successful state change, while the
/// operation still holds the serialization gate.
pub trait NotificationHook: Send + Sync {
    /// A message was posted to or deleted from `channel`.
    fn message_changed(&self, channel: &ChannelView);

    /// A channel was created, deleted or had its membership changed.
    fn channels_changed(&self);
}

pub struct NoopHook;

impl NotificationHook for NoopHook {
    fn message_changed(&self, _channel: &ChannelView) {}

    fn channels_changed(&self) {}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceEvent {
    MessageChanged(ChannelView),
    ChannelsChanged,
}

/// Fans notifications out to any number of subscribers.
pub struct BroadcastHook {
    tx: broadcast::Sender<ServiceEvent>,
}

impl BroadcastHook {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        BroadcastHook { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ServiceEvent> {
        self.tx.subscribe()
    }

    fn publish(&self, event: ServiceEvent) {
        // Err only means nobody is listening right now.
        if self.tx.send(event).is_err() {
            tracing::trace!("No subscribers for service event");
        }
    }
}

impl NotificationHook for BroadcastHook {
    fn message_changed(&self, channel: &ChannelView) {
        self.publish(ServiceEvent::MessageChanged(channel.clone()));
    }

    fn channels_changed(&self) {
        self.publish(ServiceEvent::ChannelsChanged);
    }
}
