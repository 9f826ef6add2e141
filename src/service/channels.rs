use std::collections::BTreeSet;
use uuid::Uuid;

use crate::db::{Channel, Message, DELETED_ID, EVERYONE_ID, GLOBAL_CHANNEL_ID};
use crate::error::{AppError, AppResult};
use crate::service::{ChannelView, MessengerService};

impl MessengerService {
    /// Create a channel. The acting account must be one of the members
    /// unless it is an admin.
    pub async fn create_channel(
        &self,
        members: impl IntoIterator<Item = Uuid>,
        acting: Uuid,
        name: impl Into<String>,
    ) -> AppResult<Uuid> {
        let members: BTreeSet<Uuid> = members.into_iter().collect();
        let name = name.into();

        if members.is_empty() {
            return Err(AppError::InvalidOperation(
                "A channel needs at least one member".to_string(),
            ));
        }
        if name.trim().is_empty() {
            return Err(AppError::InvalidOperation("Channel name must not be empty".to_string()));
        }

        let _gate = self.gate.lock().await;

        let user = self.account(acting).await?;
        if !(members.contains(&acting) || user.is_admin) {
            return Err(AppError::unauthorized(format!(
                "Account {} can't create a channel it is not a member of",
                acting
            )));
        }

        // Every member must be a real account or the everyone marker
        for member in &members {
            self.check_joinable(*member).await?;
        }

        let channel = Channel::new(Uuid::new_v4(), members, name);
        let id = channel.id;
        self.channels.create_new(channel).await?;
        self.hook.channels_changed();

        tracing::info!("Account {} created channel {}", acting, id);
        Ok(id)
    }

    pub async fn add_user_to_channel(&self, account: Uuid, channel: Uuid, acting: Uuid) -> AppResult<()> {
        let _gate = self.gate.lock().await;

        let user = self.account(acting).await?;
        let mut target = self.channel(channel).await?;
        if !target.is_managed_by(&user) {
            return Err(AppError::unauthorized(format!(
                "Account {} can't add members to channel {}",
                acting, channel
            )));
        }

        self.check_joinable(account).await?;

        if !target.members.insert(account) {
            tracing::debug!("Account {} is already a member of channel {}", account, channel);
            return Ok(());
        }

        self.channels.replace(channel, target).await?;
        self.hook.channels_changed();

        tracing::debug!("Account {} added {} to channel {}", acting, account, channel);
        Ok(())
    }

    /// Remove a member. Leaving is always allowed; removing someone else
    /// requires membership or admin. The channel is deleted once empty.
    /// Removing from a channel that no longer exists succeeds.
    pub async fn remove_user_from_channel(
        &self,
        channel: Uuid,
        account: Uuid,
        acting: Uuid,
    ) -> AppResult<()> {
        if channel == GLOBAL_CHANNEL_ID && account == EVERYONE_ID {
            return Err(AppError::InvalidOperation(
                "The global channel must stay open to everyone".to_string(),
            ));
        }

        let _gate = self.gate.lock().await;

        let user = self.account(acting).await?;

        // A channel that is already gone has nothing left to remove
        let Some(target) = self.channels.get_by_id(channel).await? else {
            tracing::debug!("Channel {} already gone, nothing to remove", channel);
            return Ok(());
        };

        if !(acting == account || target.is_managed_by(&user)) {
            return Err(AppError::unauthorized(format!(
                "Account {} can't remove members from channel {}",
                acting, channel
            )));
        }

        if !target.members.contains(&account) {
            return Ok(());
        }

        // Deletes the channel and its messages if this was the last member
        self.remove_member(target, account).await?;
        self.hook.channels_changed();
        Ok(())
    }

    /// Delete a channel together with its messages.
    pub async fn delete_channel(&self, channel: Uuid, acting: Uuid) -> AppResult<()> {
        if channel == GLOBAL_CHANNEL_ID {
            return Err(AppError::InvalidOperation(
                "The global channel can't be deleted".to_string(),
            ));
        }

        let _gate = self.gate.lock().await;

        let user = self.account(acting).await?;
        let target = self.channel(channel).await?;
        if !target.is_managed_by(&user) {
            return Err(AppError::unauthorized(format!(
                "Account {} can't delete channel {}",
                acting, channel
            )));
        }

        self.purge_channel(channel).await?;
        self.hook.channels_changed();

        tracing::info!("Account {} deleted channel {}", acting, channel);
        Ok(())
    }

    pub async fn get_channel(&self, channel: Uuid, acting: Uuid) -> AppResult<ChannelView> {
        let _gate = self.gate.lock().await;

        let user = self.account(acting).await?;
        let channel = self.readable_channel(channel, &user).await?;
        Ok(self.channel_view(&channel).await)
    }

    /// Every channel the acting account can see.
    pub async fn get_all_channels(&self, acting: Uuid) -> AppResult<Vec<ChannelView>> {
        let _gate = self.gate.lock().await;

        let user = self.account(acting).await?;
        let visible = self.channels.query(&|c: &Channel| c.admits(&user)).await?;
        Ok(self.channel_views(&visible).await)
    }

    /// Channels that list `account` as an explicit member.
    pub async fn get_channels_with_user(&self, account: Uuid, acting: Uuid) -> AppResult<Vec<ChannelView>> {
        let _gate = self.gate.lock().await;

        let user = self.account(acting).await?;
        if !(user.id == account || user.is_admin) {
            return Err(AppError::unauthorized(format!(
                "Account {} can't list the channels of {}",
                acting, account
            )));
        }

        let joined = self
            .channels
            .query(&|c: &Channel| c.members.contains(&account))
            .await?;
        Ok(self.channel_views(&joined).await)
    }

    // -- Helpers (gate held) --

    /// Ids that may appear in a member set: existing accounts and the
    /// everyone marker.
    async fn check_joinable(&self, member: Uuid) -> AppResult<()> {
        if member == EVERYONE_ID {
            return Ok(());
        }
        if member == DELETED_ID {
            return Err(AppError::InvalidOperation(
                "The deleted-user sentinel can't join channels".to_string(),
            ));
        }
        self.account(member).await.map(|_| ())
    }

    /// Drop `account` from `channel`, deleting the channel if it ends up
    /// empty. Returns whether the channel was deleted.
    pub(super) async fn remove_member(&self, mut channel: Channel, account: Uuid) -> AppResult<bool> {
        channel.members.remove(&account);

        if channel.members.is_empty() {
            self.purge_channel(channel.id).await?;
            tracing::info!("Channel {} deleted after its last member left", channel.id);
            return Ok(true);
        }

        self.channels.replace(channel.id, channel).await?;
        Ok(false)
    }

    /// Messages go first so none outlive their channel.
    async fn purge_channel(&self, channel: Uuid) -> AppResult<()> {
        let removed = self
            .messages
            .delete_where(&|m: &Message| m.channel_id == channel)
            .await?;
        self.channels.delete_item(channel).await?;

        tracing::debug!("Purged channel {} and {} messages", channel, removed);
        Ok(())
    }
}
