use std::sync::Arc;

use crate::config::Config;
use crate::db::DocumentStore;
use crate::error::AppResult;
use crate::service::{BroadcastHook, MessengerService};
use crate::token::TokenAuthority;

/// Capacity of the service event channel; slow subscribers lag past this.
const EVENT_CAPACITY: usize = 256;

/// Everything a front end needs, cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<MessengerService>,
    pub tokens: Arc<TokenAuthority>,
    pub events: Arc<BroadcastHook>,
    pub config: Arc<Config>,
}

impl AppState {
    /// Load the signing keys, wire the service to an in-process store and
    /// seed the reserved records.
    pub async fn bootstrap(config: Config) -> AppResult<Self> {
        let tokens = TokenAuthority::from_config(&config)?;
        tracing::info!("Token keys ready in {}", config.keys_dir);

        let events = Arc::new(BroadcastHook::new(EVENT_CAPACITY));
        let store = DocumentStore::new();
        let service = MessengerService::in_memory(&store, events.clone())
            .with_global_channel_name(config.global_channel_name.clone());
        service.initialize().await?;

        Ok(AppState {
            service: Arc::new(service),
            tokens: Arc::new(tokens),
            events,
            config: Arc::new(config),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::GLOBAL_CHANNEL_ID;
    use crate::service::ServiceEvent;

    #[tokio::test]
    async fn test_bootstrap_wires_everything() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            keys_dir: dir.path().to_string_lossy().into_owned(),
            global_channel_name: "Lobby".to_string(),
            ..Config::default()
        };

        let state = AppState::bootstrap(config).await.unwrap();
        let mut rx = state.events.subscribe();

        let alice = state.service.create_account("alice", "pw", None).await.unwrap();
        let lobby = state.service.get_channel(GLOBAL_CHANNEL_ID, alice).await.unwrap();
        assert_eq!(lobby.name, "Lobby");

        state.service.create_channel([alice], alice, "mine").await.unwrap();
        assert_eq!(rx.recv().await.unwrap(), ServiceEvent::ChannelsChanged);

        let token = state.tokens.issue_authorization(alice).unwrap();
        assert!(state.tokens.verify(&token));
        assert!(dir.path().join("token.privkey").exists());
    }
}
