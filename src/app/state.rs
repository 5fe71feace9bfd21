//! Application state shared across routes and connections

use std::sync::Arc;
use std::time::Instant;

use crate::config::Config;
use crate::game::MatchDirectory;
use crate::lobby::LobbyDirectory;
use crate::matchmaking::MatchmakingService;
use crate::ws::hub::Hub;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub hub: Hub,
    pub matchmaking: Arc<MatchmakingService>,
    pub matches: Arc<MatchDirectory>,
    pub lobbies: Arc<LobbyDirectory>,
    /// When the services were built; reported as uptime
    pub started_at: Instant,
}

impl AppState {
    /// Build every service. Spawns the hub coordinator, so this must run
    /// inside a tokio runtime.
    pub fn new(config: Config) -> Self {
        let config = Arc::new(config);

        let hub = Hub::spawn(config.hub_command_buffer);
        let matches = Arc::new(MatchDirectory::new());
        let matchmaking = Arc::new(MatchmakingService::new(
            Arc::clone(&matches),
            config.tick_interval,
        ));
        let lobbies = Arc::new(LobbyDirectory::new());

        Self {
            config,
            hub,
            matchmaking,
            matches,
            lobbies,
            started_at: Instant::now(),
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::time::Duration;

    use super::*;

    pub fn test_config() -> Config {
        Config {
            server_addr: "127.0.0.1:0".parse().unwrap(),
            log_level: "debug".to_string(),
            log_json: false,
            auth_secret: "test-secret".to_string(),
            client_origin: "*".to_string(),
            tick_interval: Duration::from_millis(5),
            client_send_buffer: 256,
            hub_command_buffer: 64,
            input_rate_limit: 1000,
        }
    }

    pub fn test_state() -> AppState {
        AppState::new(test_config())
    }
}
