use std::{env, time::Duration};

use tracing::debug;

pub const DEFAULT_SERVER_URL: &str = "http://localhost:8080";
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_millis(5000);
pub const DEFAULT_HEARTBEAT: Duration = Duration::from_millis(4000);

/// Connection settings shared by the HTTP client and the realtime channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub server_url: String,
    /// Fixed pause between realtime reconnection attempts
    pub reconnect_delay: Duration,
    /// Heart-beat interval offered to the broker in both directions
    pub heartbeat: Duration,
}

impl ClientConfig {
    pub fn new(server_url: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into(),
            ..Self::default()
        }
    }

    /// Read settings from `MINESDUEL_*` environment variables, falling back
    /// to the defaults for anything missing or unparseable
    pub fn from_env() -> Self {
        let server_url =
            env::var("MINESDUEL_SERVER_URL").unwrap_or_else(|_| DEFAULT_SERVER_URL.to_string());

        let reconnect_delay_ms: u64 = env::var("MINESDUEL_RECONNECT_DELAY_MS")
            .unwrap_or_else(|_| "5000".to_string())
            .parse()
            .unwrap_or(5000);

        let heartbeat_ms: u64 = env::var("MINESDUEL_HEARTBEAT_MS")
            .unwrap_or_else(|_| "4000".to_string())
            .parse()
            .unwrap_or(4000);

        debug!(
            "Client config: server {}, reconnect delay {}ms, heart-beat {}ms",
            server_url, reconnect_delay_ms, heartbeat_ms
        );

        Self {
            server_url,
            reconnect_delay: Duration::from_millis(reconnect_delay_ms),
            heartbeat: Duration::from_millis(heartbeat_ms),
        }
    }

    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    /// A zero interval disables heart-beating
    pub fn with_heartbeat(mut self, interval: Duration) -> Self {
        self.heartbeat = interval;
        self
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            heartbeat: DEFAULT_HEARTBEAT,
        }
    }
}
