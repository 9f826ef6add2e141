use std::collections::BTreeSet;
use uuid::Uuid;

use crate::db::Message;
use crate::error::{AppError, AppResult};
use crate::service::{MessageView, MessengerService};

pub const MAX_MESSAGE_LEN: usize = 4096;

fn validate_content(content: &str) -> AppResult<()> {
    if content.trim().is_empty() {
        return Err(AppError::InvalidOperation("Message content cannot be empty".to_string()));
    }
    if content.chars().count() > MAX_MESSAGE_LEN {
        return Err(AppError::InvalidOperation(format!(
            "Message content exceeds {} characters",
            MAX_MESSAGE_LEN
        )));
    }
    Ok(())
}

impl MessengerService {
    /// Post a message on behalf of `acting`, who must be its author and be
    /// allowed into the target channel.
    pub async fn post_message(&self, message: Message, acting: Uuid) -> AppResult<Uuid> {
        validate_content(&message.content)?;

        let _gate = self.gate.lock().await;

        // Only as yourself, and only where you may read
        let user = self.account(acting).await?;
        if message.author_id != user.id {
            return Err(AppError::unauthorized(format!(
                "Account {} can't post as {}",
                acting, message.author_id
            )));
        }

        let channel = self.readable_channel(message.channel_id, &user).await?;

        let id = message.id;
        self.messages.create_new(message).await?;

        let view = self.channel_view(&channel).await;
        self.hook.message_changed(&view);

        tracing::debug!("Account {} posted message {} to channel {}", acting, id, channel.id);
        Ok(id)
    }

    pub async fn get_message(&self, id: Uuid, acting: Uuid) -> AppResult<MessageView> {
        let _gate = self.gate.lock().await;

        let user = self.account(acting).await?;
        let message = self.message(id).await?;
        self.readable_channel(message.channel_id, &user).await?;

        let author = self.account(message.author_id).await?;
        Ok(MessageView::new(&message, &author))
    }

    /// Messages of one channel, oldest first.
    pub async fn get_all_messages_in_channel(&self, channel: Uuid, acting: Uuid) -> AppResult<Vec<MessageView>> {
        let _gate = self.gate.lock().await;

        let user = self.account(acting).await?;
        self.readable_channel(channel, &user).await?;

        let messages = self
            .messages
            .query(&|m: &Message| m.channel_id == channel)
            .await?;
        Ok(self.message_views(messages).await)
    }

    pub async fn get_all_messages(&self, acting: Uuid) -> AppResult<Vec<MessageView>> {
        let _gate = self.gate.lock().await;

        let user = self.account(acting).await?;
        if !user.is_admin {
            return Err(AppError::unauthorized("Only admins can list every message"));
        }

        let messages = self.messages.get_all().await?;
        Ok(self.message_views(messages).await)
    }

    /// Authors may delete their own messages, admins any message.
    pub async fn delete_message(&self, id: Uuid, acting: Uuid) -> AppResult<()> {
        let _gate = self.gate.lock().await;

        let user = self.account(acting).await?;
        let message = self.message(id).await?;
        if !(message.author_id == user.id || user.is_admin) {
            return Err(AppError::unauthorized(format!(
                "Account {} can't delete message {}",
                acting, id
            )));
        }

        self.messages.delete_item(id).await?;
        self.notify_message_changed(message.channel_id).await?;

        tracing::debug!("Account {} deleted message {}", acting, id);
        Ok(())
    }

    /// Wipe every message in every channel. Returns how many were removed.
    pub async fn delete_all_messages(&self, acting: Uuid) -> AppResult<usize> {
        let _gate = self.gate.lock().await;

        let user = self.account(acting).await?;
        if !user.is_admin {
            return Err(AppError::unauthorized("Only admins can delete all messages"));
        }

        // Remember which channels had messages so each gets one notification
        let touched: BTreeSet<Uuid> = self
            .messages
            .get_all()
            .await?
            .iter()
            .map(|m| m.channel_id)
            .collect();

        let removed = self.messages.delete_where(&|_: &Message| true).await?;
        for channel in touched {
            self.notify_message_changed(channel).await?;
        }

        tracing::info!("Admin {} deleted all {} messages", acting, removed);
        Ok(removed)
    }

    /// No notification for channels that no longer exist.
    async fn notify_message_changed(&self, channel: Uuid) -> AppResult<()> {
        if let Some(channel) = self.channels.get_by_id(channel).await? {
            let view = self.channel_view(&channel).await;
            self.hook.message_changed(&view);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::MAX_MESSAGE_LEN;
    use crate::db::{Message, Repository, GLOBAL_CHANNEL_ID};
    use crate::error::AppError;
    use crate::service::test_support::fixture;
    use crate::service::ServiceEvent;
    use chrono::Duration;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_anyone_can_post_to_global_channel() {
        let f = fixture().await;
        let alice = f.user("alice").await;
        let mut rx = f.events.subscribe();

        let id = f
            .service
            .post_message(Message::compose("hello world", GLOBAL_CHANNEL_ID, alice), alice)
            .await
            .unwrap();

        let view = f.service.get_message(id, alice).await.unwrap();
        assert_eq!(view.author_name, "alice");
        assert!(!view.author_is_admin);

        match rx.recv().await.unwrap() {
            ServiceEvent::MessageChanged(channel) => assert_eq!(channel.id, GLOBAL_CHANNEL_ID),
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unauthorized_post_persists_nothing() {
        let f = fixture().await;
        let alice = f.user("alice").await;
        let bob = f.user("bob").await;
        let private = f.service.create_channel([alice], alice, "private").await.unwrap();

        let err = f
            .service
            .post_message(Message::compose("let me in", private, bob), bob)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));
        assert!(f.stored_messages().await.is_empty());
    }

    #[tokio::test]
    async fn test_cannot_post_as_someone_else() {
        let f = fixture().await;
        let alice = f.user("alice").await;
        let bob = f.user("bob").await;

        let err = f
            .service
            .post_message(Message::compose("spoof", GLOBAL_CHANNEL_ID, alice), bob)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));
        assert!(f.stored_messages().await.is_empty());
    }

    #[tokio::test]
    async fn test_content_limits() {
        let f = fixture().await;
        let alice = f.user("alice").await;

        for content in ["   ".to_string(), "x".repeat(MAX_MESSAGE_LEN + 1)] {
            assert!(matches!(
                f.service
                    .post_message(Message::compose(content, GLOBAL_CHANNEL_ID, alice), alice)
                    .await,
                Err(AppError::InvalidOperation(_))
            ));
        }

        f.service
            .post_message(
                Message::compose("x".repeat(MAX_MESSAGE_LEN), GLOBAL_CHANNEL_ID, alice),
                alice,
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_post_to_missing_channel() {
        let f = fixture().await;
        let alice = f.user("alice").await;

        let err = f
            .service
            .post_message(Message::compose("void", Uuid::new_v4(), alice), alice)
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_delete_message_author_or_admin() {
        let f = fixture().await;
        let alice = f.user("alice").await;
        let bob = f.user("bob").await;
        let admin = f.admin("root").await;

        let first = f
            .service
            .post_message(Message::compose("one", GLOBAL_CHANNEL_ID, alice), alice)
            .await
            .unwrap();
        let second = f
            .service
            .post_message(Message::compose("two", GLOBAL_CHANNEL_ID, alice), alice)
            .await
            .unwrap();

        let mut rx = f.events.subscribe();

        assert!(matches!(
            f.service.delete_message(first, bob).await,
            Err(AppError::Unauthorized(_))
        ));
        f.service.delete_message(first, alice).await.unwrap();
        f.service.delete_message(second, admin).await.unwrap();

        for _ in 0..2 {
            match rx.try_recv().unwrap() {
                ServiceEvent::MessageChanged(channel) => assert_eq!(channel.id, GLOBAL_CHANNEL_ID),
                other => panic!("unexpected event {:?}", other),
            }
        }
        assert!(rx.try_recv().is_err());

        assert!(f.stored_messages().await.is_empty());
        assert!(f.service.delete_message(first, alice).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_channel_listing_is_ordered_and_skips_orphans() {
        let f = fixture().await;
        let alice = f.user("alice").await;

        let mut later = Message::compose("later", GLOBAL_CHANNEL_ID, alice);
        let mut earlier = Message::compose("earlier", GLOBAL_CHANNEL_ID, alice);
        earlier.timestamp = later.timestamp - Duration::minutes(5);
        later.timestamp += Duration::minutes(5);
        f.service.post_message(later, alice).await.unwrap();
        f.service.post_message(earlier, alice).await.unwrap();

        let orphan = Message::compose("ghost", GLOBAL_CHANNEL_ID, Uuid::new_v4());
        f.store.repository::<Message>().create_new(orphan).await.unwrap();

        let contents: Vec<String> = f
            .service
            .get_all_messages_in_channel(GLOBAL_CHANNEL_ID, alice)
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.content)
            .collect();
        assert_eq!(contents, vec!["earlier", "later"]);
    }

    #[tokio::test]
    async fn test_admin_only_bulk_operations() {
        let f = fixture().await;
        let alice = f.user("alice").await;
        let admin = f.admin("root").await;
        let private = f.service.create_channel([alice], alice, "private").await.unwrap();

        f.service
            .post_message(Message::compose("public", GLOBAL_CHANNEL_ID, alice), alice)
            .await
            .unwrap();
        f.service
            .post_message(Message::compose("private", private, alice), alice)
            .await
            .unwrap();

        assert!(matches!(
            f.service.get_all_messages(alice).await,
            Err(AppError::Unauthorized(_))
        ));
        assert!(matches!(
            f.service.delete_all_messages(alice).await,
            Err(AppError::Unauthorized(_))
        ));

        assert_eq!(f.service.get_all_messages(admin).await.unwrap().len(), 2);
        assert_eq!(f.service.delete_all_messages(admin).await.unwrap(), 2);
        assert!(f.stored_messages().await.is_empty());
    }
}
