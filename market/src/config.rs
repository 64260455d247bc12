use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    pub base_url: String,
    pub timeout_ms: u64,
    pub max_connections: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealtimeConfig {
    pub ws_url: String,
    #[serde(default = "default_heartbeat_secs")]
    pub heartbeat_secs: u64,
    #[serde(default = "default_pong_timeout_secs")]
    pub pong_timeout_secs: u64,
    #[serde(default = "default_max_backoff_secs")]
    pub max_backoff_secs: u64,
}

fn default_heartbeat_secs() -> u64 {
    15
}

fn default_pong_timeout_secs() -> u64 {
    60
}

fn default_max_backoff_secs() -> u64 {
    30
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollConfig {
    pub balance_interval_ms: u64,
    pub payment_interval_ms: u64,
    pub auction_interval_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    pub http: HttpConfig,
    pub realtime: RealtimeConfig,
    pub poll: PollConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            http: HttpConfig {
                base_url: "https://api.sello.app/api".to_string(),
                timeout_ms: 10_000,
                max_connections: 20,
            },
            realtime: RealtimeConfig {
                ws_url: "wss://rt.sello.app/sync".to_string(),
                heartbeat_secs: default_heartbeat_secs(),
                pong_timeout_secs: default_pong_timeout_secs(),
                max_backoff_secs: default_max_backoff_secs(),
            },
            poll: PollConfig {
                balance_interval_ms: 5_000,
                payment_interval_ms: 5_000,
                auction_interval_ms: 5_000,
            },
        }
    }
}
