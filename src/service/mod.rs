//! The messenger service: the only reader and writer of accounts, channels
//! and messages.
//!
//! Every public operation holds `gate` for its entire body, so multi-step
//! operations (look up, check permission, write, cascade) never interleave.
//! Private helpers assume the gate is already held and must not lock it.

pub mod accounts;
pub mod channels;
pub mod events;
pub mod messages;
pub mod session;
pub mod views;

pub use events::{BroadcastHook, NoopHook, NotificationHook, ServiceEvent};
pub use messages::MAX_MESSAGE_LEN;
pub use views::{collect_resolved, AccountView, ChannelView, MessageView, StreakUpdate};

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::db::{
    Account, Channel, DocumentStore, Message, Repository, DELETED_ID, EVERYONE_ID, EVERYONE_LABEL,
    GLOBAL_CHANNEL_ID,
};
use crate::error::{AppError, AppResult};

const DEFAULT_GLOBAL_CHANNEL_NAME: &str = "Global Channel";

pub struct MessengerService {
    accounts: Arc<dyn Repository<Account>>,
    channels: Arc<dyn Repository<Channel>>,
    messages: Arc<dyn Repository<Message>>,
    hook: Arc<dyn NotificationHook>,
    gate: Mutex<()>,
    global_channel_name: String,
}

impl MessengerService {
    pub fn new(
        accounts: Arc<dyn Repository<Account>>,
        channels: Arc<dyn Repository<Channel>>,
        messages: Arc<dyn Repository<Message>>,
        hook: Arc<dyn NotificationHook>,
    ) -> Self {
        MessengerService {
            accounts,
            channels,
            messages,
            hook,
            gate: Mutex::new(()),
            global_channel_name: DEFAULT_GLOBAL_CHANNEL_NAME.to_string(),
        }
    }

    /// A service whose three repositories share `store`.
    pub fn in_memory(store: &DocumentStore, hook: Arc<dyn NotificationHook>) -> Self {
        Self::new(
            Arc::new(store.repository::<Account>()),
            Arc::new(store.repository::<Channel>()),
            Arc::new(store.repository::<Message>()),
            hook,
        )
    }

    pub fn with_global_channel_name(mut self, name: impl Into<String>) -> Self {
        self.global_channel_name = name.into();
        self
    }

    /// Seed the reserved accounts and the global channel. Safe to call on
    /// every startup.
    pub async fn initialize(&self) -> AppResult<()> {
        let _gate = self.gate.lock().await;

        for (id, username) in [(EVERYONE_ID, EVERYONE_LABEL), (DELETED_ID, "Deleted User")] {
            if self.accounts.get_by_id(id).await?.is_none() {
                self.accounts.create_new(Account::reserved(id, username)).await?;
                tracing::info!("Seeded reserved account {} ({})", username, id);
            }
        }

        let global = Channel::new(GLOBAL_CHANNEL_ID, [EVERYONE_ID], self.global_channel_name.clone());
        match self.channels.create_new(global).await {
            Ok(()) => tracing::info!("Created global channel {}", GLOBAL_CHANNEL_ID),
            Err(AppError::AlreadyExists(_)) => tracing::debug!("Global channel already present"),
            Err(e) => return Err(e),
        }

        Ok(())
    }

    // -- Lookups (gate held) --

    async fn account(&self, id: Uuid) -> AppResult<Account> {
        self.accounts
            .get_by_id(id)
            .await?
            .ok_or_else(|| AppError::not_found("account", id))
    }

    async fn channel(&self, id: Uuid) -> AppResult<Channel> {
        self.channels
            .get_by_id(id)
            .await?
            .ok_or_else(|| AppError::not_found("channel", id))
    }

    async fn message(&self, id: Uuid) -> AppResult<Message> {
        self.messages
            .get_by_id(id)
            .await?
            .ok_or_else(|| AppError::not_found("message", id))
    }

    async fn find_by_username(&self, username: &str) -> AppResult<Option<Account>> {
        let mut matches = self
            .accounts
            .query(&|a: &Account| a.username == username)
            .await?;

        match matches.len() {
            0 => Ok(None),
            1 => Ok(matches.pop()),
            n => Err(AppError::Storage(format!(
                "{} accounts share the username {}",
                n, username
            ))),
        }
    }

    /// Fetch a channel the acting account is allowed to read.
    async fn readable_channel(&self, channel_id: Uuid, acting: &Account) -> AppResult<Channel> {
        let channel = self.channel(channel_id).await?;
        if !channel.admits(acting) {
            return Err(AppError::unauthorized(format!(
                "Account {} has no permission to see channel {}",
                acting.id, channel_id
            )));
        }
        Ok(channel)
    }

    // -- View assembly (gate held) --

    async fn member_name(&self, id: Uuid) -> AppResult<String> {
        if id == EVERYONE_ID {
            return Ok(EVERYONE_LABEL.to_string());
        }
        Ok(self.account(id).await?.username)
    }

    async fn channel_view(&self, channel: &Channel) -> ChannelView {
        let mut names = Vec::with_capacity(channel.members.len());
        for id in &channel.members {
            names.push(self.member_name(*id).await);
        }
        let member_names: BTreeSet<String> = collect_resolved(names, "channel member")
            .into_iter()
            .collect();
        ChannelView::new(channel, member_names)
    }

    async fn channel_views(&self, channels: &[Channel]) -> Vec<ChannelView> {
        let mut views = Vec::with_capacity(channels.len());
        for channel in channels {
            views.push(self.channel_view(channel).await);
        }
        views.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        views
    }

    /// Messages whose author cannot be resolved are left out.
    async fn message_views(&self, mut messages: Vec<Message>) -> Vec<MessageView> {
        messages.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then(a.id.cmp(&b.id)));

        let mut authors: HashMap<Uuid, Option<Account>> = HashMap::new();
        let mut resolved = Vec::with_capacity(messages.len());

        for message in &messages {
            if !authors.contains_key(&message.author_id) {
                let author = self.accounts.get_by_id(message.author_id).await.unwrap_or_else(|e| {
                    tracing::warn!("Author lookup for {} failed: {}", message.author_id, e);
                    None
                });
                authors.insert(message.author_id, author);
            }

            resolved.push(match authors.get(&message.author_id) {
                Some(Some(author)) => Ok(MessageView::new(message, author)),
                _ => Err(AppError::not_found("account", message.author_id)),
            });
        }

        collect_resolved(resolved, "message")
    }
}
