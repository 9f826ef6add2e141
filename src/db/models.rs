use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

use crate::db::repository::Document;

/// Member id that grants every account access to a channel.
pub const EVERYONE_ID: Uuid = Uuid::from_u128(0);
/// Author id that messages of deleted accounts are reassigned to.
pub const DELETED_ID: Uuid = Uuid::from_u128(1);
/// The default channel every account can see.
pub const GLOBAL_CHANNEL_ID: Uuid = Uuid::from_u128(2);

/// Display label used for [`EVERYONE_ID`] instead of an account lookup.
pub const EVERYONE_LABEL: &str = "Everyone";

pub fn is_reserved_account(id: Uuid) -> bool {
    id == EVERYONE_ID || id == DELETED_ID
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub id: Uuid,
    pub username: String,
    pub password_hash: String,
    pub is_admin: bool,
    pub locked: bool,
    pub email: Option<String>,
    pub login_streak: u32,
    pub last_login: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Account {
    pub fn new(id: Uuid, username: String, password_hash: String, email: Option<String>) -> Self {
        Account {
            id,
            username,
            password_hash,
            is_admin: false,
            locked: false,
            email,
            login_streak: 0,
            last_login: None,
            created_at: Utc::now(),
        }
    }

    /// A sentinel account: locked, and with a hash nothing verifies against.
    pub fn reserved(id: Uuid, username: &str) -> Self {
        Account {
            locked: true,
            ..Account::new(id, username.to_string(), String::new(), None)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Channel {
    pub id: Uuid,
    pub members: BTreeSet<Uuid>,
    pub name: String,
}

impl Channel {
    pub fn new(id: Uuid, members: impl IntoIterator<Item = Uuid>, name: impl Into<String>) -> Self {
        Channel {
            id,
            members: members.into_iter().collect(),
            name: name.into(),
        }
    }

    pub fn is_open_to_everyone(&self) -> bool {
        self.members.contains(&EVERYONE_ID)
    }

    /// Read/post access: explicit member, open channel, or admin.
    pub fn admits(&self, account: &Account) -> bool {
        self.members.contains(&account.id) || self.is_open_to_everyone() || account.is_admin
    }

    /// Management access: explicit member or admin.
    pub fn is_managed_by(&self, account: &Account) -> bool {
        self.members.contains(&account.id) || account.is_admin
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: Uuid,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub author_id: Uuid,
    pub channel_id: Uuid,
}

impl Message {
    pub fn compose(content: impl Into<String>, channel_id: Uuid, author_id: Uuid) -> Self {
        Message {
            id: Uuid::new_v4(),
            content: content.into(),
            timestamp: Utc::now(),
            author_id,
            channel_id,
        }
    }
}

impl Document for Account {
    const KIND: &'static str = "account";

    fn id(&self) -> Uuid {
        self.id
    }
}

impl Document for Channel {
    const KIND: &'static str = "channel";

    fn id(&self) -> Uuid {
        self.id
    }
}

impl Document for Message {
    const KIND: &'static str = "message";

    fn id(&self) -> Uuid {
        self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_access_rules() {
        let member = Account::new(Uuid::new_v4(), "member".into(), String::new(), None);
        let outsider = Account::new(Uuid::new_v4(), "outsider".into(), String::new(), None);
        let admin = Account {
            is_admin: true,
            ..Account::new(Uuid::new_v4(), "admin".into(), String::new(), None)
        };

        let private = Channel::new(Uuid::new_v4(), [member.id], "private");
        assert!(private.admits(&member));
        assert!(!private.admits(&outsider));
        assert!(private.admits(&admin));
        assert!(private.is_managed_by(&admin));

        let open = Channel::new(Uuid::new_v4(), [EVERYONE_ID], "open");
        assert!(open.admits(&outsider));
        assert!(!open.is_managed_by(&outsider));
    }

    #[test]
    fn test_reserved_ids_are_distinct() {
        assert_ne!(EVERYONE_ID, DELETED_ID);
        assert_ne!(DELETED_ID, GLOBAL_CHANNEL_ID);
        assert!(is_reserved_account(EVERYONE_ID));
        assert!(is_reserved_account(DELETED_ID));
        assert!(!is_reserved_account(GLOBAL_CHANNEL_ID));
    }
}
