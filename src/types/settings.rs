use serde::{Deserialize, Serialize};

/// Top-level client settings container.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct ClientSettings {
    pub backend: BackendSettings,
    pub auth: AuthSettings,
    pub realtime: RealtimeSettings,
    pub logging: LoggingSettings,
}

/// Where the backend-as-a-service lives.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct BackendSettings {
    /// Project base URL, e.g. `https://abc.supabase.co`.
    pub url: String,
    /// Public anon key sent as `apikey` on every request.
    pub anon_key: String,
}

/// OAuth sign-in settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AuthSettings {
    pub provider: String,
    pub redirect_to: String,
    /// Refresh the access token when it expires within this many seconds.
    pub refresh_margin_secs: i64,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            provider: "google".to_string(),
            redirect_to: "http://127.0.0.1:54321/auth/callback".to_string(),
            refresh_margin_secs: 60,
        }
    }
}

/// Push-change feed settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RealtimeSettings {
    pub channel: String,
    pub schema: String,
    pub table: String,
    pub heartbeat_secs: u64,
    pub reconnect: ReconnectPolicy,
}

impl Default for RealtimeSettings {
    fn default() -> Self {
        Self {
            channel: "bookmarks-realtime".to_string(),
            schema: "public".to_string(),
            table: "bookmarks".to_string(),
            heartbeat_secs: 25,
            reconnect: ReconnectPolicy::default(),
        }
    }
}

/// Exponential backoff used when the change feed connection drops.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ReconnectPolicy {
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub multiplier: f64,
    /// Give up after this many consecutive failures. `None` retries forever.
    pub max_attempts: Option<u32>,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial_delay_ms: 1_000,
            max_delay_ms: 30_000,
            multiplier: 2.0,
            max_attempts: None,
        }
    }
}

impl ReconnectPolicy {
    /// Delay before reconnect attempt `attempt` (1-based), capped at `max_delay_ms`.
    pub fn delay_for(&self, attempt: u32) -> u64 {
        let exponent = attempt.saturating_sub(1).min(32) as i32;
        let delay = self.initial_delay_ms as f64 * self.multiplier.max(1.0).powi(exponent);
        if delay >= self.max_delay_ms as f64 {
            self.max_delay_ms
        } else {
            delay as u64
        }
    }

    /// Whether another attempt is allowed after `attempt` failures.
    pub fn allows(&self, attempt: u32) -> bool {
        self.max_attempts.map_or(true, |max| attempt <= max)
    }
}

/// Log output settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingSettings {
    /// `tracing_subscriber::EnvFilter` directive used when `RUST_LOG` is unset.
    pub filter: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
        }
    }
}
