use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::crypto::{hash_password, verify_password};
use crate::db::{is_reserved_account, Account, Channel, Message, DELETED_ID};
use crate::error::{AppError, AppResult};
use crate::service::{AccountView, MessengerService, StreakUpdate};
use crate::token::{EmailVerifyClaims, TokenAuthority};

const MAX_USERNAME_LEN: usize = 32;

/// Run the KDF on the blocking pool, off the runtime workers.
async fn hash_off_thread(password: &str, id: Uuid) -> AppResult<String> {
    let password = password.to_string();
    tokio::task::spawn_blocking(move || hash_password(&password, id))
        .await
        .map_err(|e| AppError::Internal(format!("Password hashing task failed: {}", e)))?
}

async fn verify_off_thread(password: &str, id: Uuid, stored_hash: String) -> AppResult<bool> {
    let password = password.to_string();
    tokio::task::spawn_blocking(move || verify_password(&password, id, &stored_hash))
        .await
        .map_err(|e| AppError::Internal(format!("Password check task failed: {}", e)))?
}

fn bad_credentials() -> AppError {
    AppError::unauthorized("Invalid username or password")
}

fn validate_credentials(username: &str, password: &str) -> AppResult<()> {
    if username.trim().is_empty() || username.chars().count() > MAX_USERNAME_LEN {
        return Err(AppError::InvalidOperation(format!(
            "Username must be 1-{} characters",
            MAX_USERNAME_LEN
        )));
    }
    if password.is_empty() {
        return Err(AppError::InvalidOperation("Password must not be empty".to_string()));
    }
    Ok(())
}

impl MessengerService {
    /// Register an account. Usernames are unique and case-sensitive.
    pub async fn create_account(
        &self,
        username: &str,
        password: &str,
        email: Option<String>,
    ) -> AppResult<Uuid> {
        self.register(username, password, email, false).await
    }

    /// Create the first admin account. Refused once any admin exists.
    pub async fn bootstrap_admin(&self, username: &str, password: &str) -> AppResult<Uuid> {
        self.register(username, password, None, true).await
    }

    async fn register(
        &self,
        username: &str,
        password: &str,
        email: Option<String>,
        is_admin: bool,
    ) -> AppResult<Uuid> {
        validate_credentials(username, password)?;

        // Hash outside the gate
        let id = Uuid::new_v4();
        let password_hash = hash_off_thread(password, id).await?;

        let _gate = self.gate.lock().await;

        // Only the very first admin can be bootstrapped
        if is_admin && !self.accounts.query(&|a: &Account| a.is_admin).await?.is_empty() {
            return Err(AppError::InvalidOperation(
                "An admin account already exists".to_string(),
            ));
        }

        if self.find_by_username(username).await?.is_some() {
            return Err(AppError::AlreadyExists(format!("Username {} is taken", username)));
        }

        let mut account = Account::new(id, username.to_string(), password_hash, email);
        account.is_admin = is_admin;
        self.accounts.create_new(account).await?;

        tracing::info!("Created account {} ({}, admin: {})", username, id, is_admin);
        Ok(id)
    }

    /// Whether `password` belongs to account `id`. Unknown ids and wrong
    /// passwords are indistinguishable.
    pub async fn login(&self, id: Uuid, password: &str) -> AppResult<bool> {
        let stored_hash = {
            let _gate = self.gate.lock().await;
            match self.accounts.get_by_id(id).await? {
                Some(account) => account.password_hash,
                None => {
                    tracing::debug!("Login attempt for unknown account {}", id);
                    return Ok(false);
                }
            }
        };

        verify_off_thread(password, id, stored_hash).await
    }

    /// Check a username and password, refuse locked accounts and record the
    /// login, as one step. Unknown usernames and wrong passwords fail alike.
    pub async fn login_by_username(
        &self,
        username: &str,
        password: &str,
    ) -> AppResult<(AccountView, StreakUpdate)> {
        // Snapshot the stored credentials
        let account = {
            let _gate = self.gate.lock().await;
            self.find_by_username(username).await?.ok_or_else(bad_credentials)?
        };

        // Verify without holding the gate
        if !verify_off_thread(password, account.id, account.password_hash.clone()).await? {
            tracing::warn!("Failed login for {}", username);
            return Err(bad_credentials());
        }

        let _gate = self.gate.lock().await;

        // Deleted or re-keyed while we were verifying
        let current = self
            .accounts
            .get_by_id(account.id)
            .await?
            .filter(|current| current.password_hash == account.password_hash)
            .ok_or_else(bad_credentials)?;

        if current.locked {
            return Err(AppError::unauthorized(format!("Account {} is locked", current.id)));
        }

        let (current, streak) = self.apply_login(current, Utc::now()).await?;
        Ok((AccountView::from(&current), streak))
    }

    /// Update the daily login streak and the last-login timestamp.
    pub async fn record_login(&self, id: Uuid) -> AppResult<StreakUpdate> {
        self.record_login_at(id, Utc::now()).await
    }

    async fn record_login_at(&self, id: Uuid, now: DateTime<Utc>) -> AppResult<StreakUpdate> {
        let _gate = self.gate.lock().await;

        let account = self.account(id).await?;
        let (_, update) = self.apply_login(account, now).await?;
        Ok(update)
    }

    /// Streak bookkeeping for a login at `now`. Gate held.
    async fn apply_login(
        &self,
        mut account: Account,
        now: DateTime<Utc>,
    ) -> AppResult<(Account, StreakUpdate)> {
        let today = now.date_naive();

        let update = match account.last_login.map(|t| t.date_naive()) {
            Some(day) if day >= today => StreakUpdate::Unchanged(account.login_streak),
            Some(day) if day.succ_opt() == Some(today) => {
                account.login_streak += 1;
                StreakUpdate::Increased(account.login_streak)
            }
            Some(_) => {
                let previous = account.login_streak;
                account.login_streak = 1;
                StreakUpdate::Lost { previous }
            }
            None => {
                account.login_streak = 1;
                StreakUpdate::Started
            }
        };

        account.last_login = Some(now);
        self.accounts.replace(account.id, account.clone()).await?;
        Ok((account, update))
    }

    /// Delete an account: its messages move to the deleted-user sentinel and
    /// it leaves every channel, which may delete channels left empty.
    pub async fn delete_account(&self, id: Uuid) -> AppResult<()> {
        if is_reserved_account(id) {
            return Err(AppError::InvalidOperation(format!(
                "Reserved account {} can't be deleted",
                id
            )));
        }

        let _gate = self.gate.lock().await;
        self.account(id).await?;

        // Hand authored messages to the deleted-user sentinel
        let authored = self.messages.query(&|m: &Message| m.author_id == id).await?;
        let reassigned = authored.len();
        for mut message in authored {
            message.author_id = DELETED_ID;
            self.messages.replace(message.id, message).await?;
        }

        // Leave every channel; empty ones go away with their messages
        let memberships = self
            .channels
            .query(&|c: &Channel| c.members.contains(&id))
            .await?;
        for channel in memberships {
            self.remove_member(channel, id).await?;
        }

        self.accounts.delete_item(id).await?;

        // One notification for the whole cascade
        self.hook.channels_changed();

        tracing::info!("Deleted account {} ({} messages reassigned)", id, reassigned);
        Ok(())
    }

    /// Fetch an account that edits may touch.
    async fn editable_account(&self, id: Uuid) -> AppResult<Account> {
        if is_reserved_account(id) {
            return Err(AppError::InvalidOperation(format!(
                "Reserved account {} can't be edited",
                id
            )));
        }
        self.account(id).await
    }

    pub async fn edit_account_admin(&self, id: Uuid, give_admin: bool, acting: Uuid) -> AppResult<()> {
        let _gate = self.gate.lock().await;

        let user = self.account(acting).await?;
        if !user.is_admin {
            return Err(AppError::unauthorized(
                "Only admins can change the admin status of other accounts",
            ));
        }

        let mut target = self.editable_account(id).await?;
        target.is_admin = give_admin;
        self.accounts.replace(id, target).await?;

        tracing::info!("Account {} admin status set to {} by {}", id, give_admin, acting);
        Ok(())
    }

    pub async fn edit_account_lock(&self, id: Uuid, locked: bool, acting: Uuid) -> AppResult<()> {
        let _gate = self.gate.lock().await;

        let user = self.account(acting).await?;
        if !user.is_admin {
            return Err(AppError::unauthorized("Only admins can lock or unlock accounts"));
        }

        let mut target = self.editable_account(id).await?;
        target.locked = locked;
        self.accounts.replace(id, target).await?;

        tracing::info!("Account {} locked set to {} by {}", id, locked, acting);
        Ok(())
    }

    pub async fn edit_account_email(
        &self,
        id: Uuid,
        email: Option<String>,
        acting: Uuid,
    ) -> AppResult<()> {
        let _gate = self.gate.lock().await;

        let user = self.account(acting).await?;
        if !(user.is_admin || user.id == id) {
            return Err(AppError::unauthorized(format!(
                "Only admins or the owner of account {} can change its email address",
                id
            )));
        }

        let mut target = self.editable_account(id).await?;
        target.email = email;
        self.accounts.replace(id, target).await
    }

    pub async fn change_password(&self, id: Uuid, acting: Uuid, new_password: &str) -> AppResult<()> {
        if new_password.is_empty() {
            return Err(AppError::InvalidOperation("Password must not be empty".to_string()));
        }

        // Hash outside the gate
        let password_hash = hash_off_thread(new_password, id).await?;

        let _gate = self.gate.lock().await;

        let user = self.account(acting).await?;
        if !(user.is_admin || user.id == id) {
            return Err(AppError::unauthorized(
                "Only the owner of an account or an admin can change its password",
            ));
        }

        let mut target = self.editable_account(id).await?;
        target.password_hash = password_hash;
        self.accounts.replace(id, target).await?;

        tracing::info!("Password of account {} changed by {}", id, acting);
        Ok(())
    }

    /// Apply the email address carried by an email verification token.
    /// Returns the account the address was confirmed for.
    pub async fn confirm_email(&self, tokens: &TokenAuthority, token: &str) -> AppResult<Uuid> {
        // Signature, kind and freshness
        let claims = tokens.open::<EmailVerifyClaims>(token)?;

        let _gate = self.gate.lock().await;

        let mut account = self.editable_account(claims.user_id).await?;
        account.email = Some(claims.email);
        self.accounts.replace(account.id, account).await?;

        tracing::info!("Email confirmed for account {}", claims.user_id);
        Ok(claims.user_id)
    }

    pub async fn get_account(&self, id: Uuid) -> AppResult<AccountView> {
        let _gate = self.gate.lock().await;
        Ok(AccountView::from(&self.account(id).await?))
    }

    pub async fn get_account_by_username(&self, username: &str) -> AppResult<Option<AccountView>> {
        let _gate = self.gate.lock().await;
        Ok(self.find_by_username(username).await?.as_ref().map(AccountView::from))
    }

    pub async fn get_all_accounts(&self) -> AppResult<Vec<AccountView>> {
        let _gate = self.gate.lock().await;

        let mut accounts: Vec<AccountView> = self
            .accounts
            .get_all()
            .await?
            .iter()
            .map(AccountView::from)
            .collect();
        accounts.sort_by(|a, b| a.username.cmp(&b.username));
        Ok(accounts)
    }
}
