use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeSet;
use uuid::Uuid;

use crate::db::{Account, Channel, Message};
use crate::error::AppResult;

/// Public view of an account; never carries the password hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountView {
    pub id: Uuid,
    pub username: String,
    pub is_admin: bool,
    pub locked: bool,
    pub email: Option<String>,
    pub login_streak: u32,
    pub last_login: Option<DateTime<Utc>>,
}

impl From<&Account> for AccountView {
    fn from(account: &Account) -> Self {
        AccountView {
            id: account.id,
            username: account.username.clone(),
            is_admin: account.is_admin,
            locked: account.locked,
            email: account.email.clone(),
            login_streak: account.login_streak,
            last_login: account.last_login,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelView {
    pub id: Uuid,
    pub name: String,
    pub members: BTreeSet<Uuid>,
    pub member_names: BTreeSet<String>,
}

impl ChannelView {
    pub fn new(channel: &Channel, member_names: BTreeSet<String>) -> Self {
        ChannelView {
            id: channel.id,
            name: channel.name.clone(),
            members: channel.members.clone(),
            member_names,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageView {
    pub id: Uuid,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub author_id: Uuid,
    pub author_name: String,
    pub author_is_admin: bool,
    pub channel_id: Uuid,
}

impl MessageView {
    pub fn new(message: &Message, author: &Account) -> Self {
        MessageView {
            id: message.id,
            content: message.content.clone(),
            timestamp: message.timestamp,
            author_id: message.author_id,
            author_name: author.username.clone(),
            author_is_admin: author.is_admin,
            channel_id: message.channel_id,
        }
    }
}

/// Outcome of recording a login against the daily streak.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StreakUpdate {
    Started,
    Unchanged(u32),
    Increased(u32),
    Lost { previous: u32 },
}

/// Keep the items that resolved and drop the ones that did not.
///
/// Bulk listings are best effort: one item whose author or member can no
/// longer be resolved must not fail the whole batch.
pub fn collect_resolved<T>(items: impl IntoIterator<Item = AppResult<T>>, what: &str) -> Vec<T> {
    items
        .into_iter()
        .filter_map(|item| match item {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!("Skipping unresolvable {}: {}", what, e);
                None
            }
        })
        .collect()
}
