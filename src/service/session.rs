//! Token-based sign-in and authentication on top of [`MessengerService`].

use serde::Serialize;

use crate::error::{AppError, AppResult};
use crate::service::{AccountView, MessengerService, StreakUpdate};
use crate::token::TokenAuthority;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignIn {
    pub account: AccountView,
    pub token: String,
    pub streak: StreakUpdate,
}

/// Extract the token from an `Authorization` header value ("Bearer <token>").
pub fn bearer_token(header: &str) -> AppResult<&str> {
    header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or_else(|| AppError::unauthorized("Invalid Authorization format"))
}

/// Resolve an authorization token to the account it was issued for.
pub async fn authenticate(
    tokens: &TokenAuthority,
    service: &MessengerService,
    token: &str,
) -> AppResult<AccountView> {
    let claims = tokens.authorize(token)?;

    let account = service.get_account(claims.user_id).await.map_err(|e| {
        if e.is_not_found() {
            AppError::unauthorized("Token refers to an unknown account")
        } else {
            e
        }
    })?;

    if account.locked {
        return Err(AppError::unauthorized(format!("Account {} is locked", account.id)));
    }

    Ok(account)
}

/// Check credentials, record the login and issue a fresh token.
pub async fn sign_in(
    tokens: &TokenAuthority,
    service: &MessengerService,
    username: &str,
    password: &str,
) -> AppResult<SignIn> {
    let (account, streak) = service.login_by_username(username, password).await?;
    let token = tokens.issue_authorization(account.id)?;

    tracing::info!("User {} signed in ({:?})", account.username, streak);
    Ok(SignIn {
        account,
        token,
        streak,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::TokenKeys;
    use crate::service::test_support::fixture;
    use chrono::Duration;

    fn tokens() -> TokenAuthority {
        TokenAuthority::new(TokenKeys::generate(), Duration::hours(1))
    }

    #[test]
    fn test_bearer_token() {
        assert_eq!(bearer_token("Bearer abc").unwrap(), "abc");
        assert!(bearer_token("abc").is_err());
        assert!(bearer_token("Bearer   ").is_err());
    }

    #[tokio::test]
    async fn test_sign_in_then_authenticate() {
        let f = fixture().await;
        let tokens = tokens();
        let alice = f.user("alice").await;

        let session = sign_in(&tokens, &f.service, "alice", "correct horse battery")
            .await
            .unwrap();
        assert_eq!(session.account.id, alice);
        assert_eq!(session.streak, StreakUpdate::Started);
        assert_eq!(session.account.login_streak, 1);

        let account = authenticate(&tokens, &f.service, &session.token).await.unwrap();
        assert_eq!(account.username, "alice");
    }

    #[tokio::test]
    async fn test_bad_credentials_look_the_same() {
        let f = fixture().await;
        let tokens = tokens();
        f.user("alice").await;

        let wrong_password = sign_in(&tokens, &f.service, "alice", "nope").await.unwrap_err();
        let unknown_user = sign_in(&tokens, &f.service, "nobody", "nope").await.unwrap_err();
        assert_eq!(wrong_password.to_string(), unknown_user.to_string());
    }

    #[tokio::test]
    async fn test_locked_account_cannot_authenticate() {
        let f = fixture().await;
        let tokens = tokens();
        let alice = f.user("alice").await;
        let admin = f.admin("root").await;
        let token = tokens.issue_authorization(alice).unwrap();

        f.service.edit_account_lock(alice, true, admin).await.unwrap();

        assert!(matches!(
            authenticate(&tokens, &f.service, &token).await,
            Err(AppError::Unauthorized(_))
        ));
        assert!(matches!(
            sign_in(&tokens, &f.service, "alice", "correct horse battery").await,
            Err(AppError::Unauthorized(_))
        ));
    }

    #[tokio::test]
    async fn test_deleted_account_token_rejected() {
        let f = fixture().await;
        let tokens = tokens();
        let alice = f.user("alice").await;
        let token = tokens.issue_authorization(alice).unwrap();

        f.service.delete_account(alice).await.unwrap();

        let err = authenticate(&tokens, &f.service, &token).await.unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));
    }
}
