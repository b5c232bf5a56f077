// ============================
// crates/backend-lib/src/config.rs
// ============================
//! Configuration management.
//!
//! Settings are layered: built-in defaults, then a TOML file, then
//! `CAMWATCH_`-prefixed environment variables (`__` separates nested keys,
//! e.g. `CAMWATCH_RATE_LIMIT__MAX_REQUESTS=10`).
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Default config file looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "camwatch.toml";

// tokio intervals panic when `now + period` overflows an Instant
const MAX_CLEANUP_SECS: u64 = 24 * 60 * 60;

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Application settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Server bind address
    pub bind_addr: SocketAddr,
    /// Root directory for stored images
    pub data_dir: PathBuf,
    /// Log level used when `RUST_LOG` is not set
    pub log_level: String,
    /// Emit JSON log lines instead of the human format
    pub log_json: bool,
    /// Allowed CORS origin for the browser front-end; any origin when unset
    pub frontend_origin: Option<String>,
    pub relay: RelaySettings,
    pub rate_limit: RateLimitSettings,
    pub mail: MailSettings,
    pub sweeper: SweeperSettings,
}

/// Who receives comment fan-out
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BroadcastScope {
    /// Only connections that joined the comment room
    Room,
    /// Every connected client except the sender
    All,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelaySettings {
    /// Capacity of each connection's outbound queue
    pub outbound_queue: usize,
    pub broadcast_scope: BroadcastScope,
}

/// Fixed-window limit applied to the alert endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitSettings {
    pub max_requests: u32,
    pub window_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MailSettings {
    pub from: String,
    pub to: String,
    pub subject: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SweeperSettings {
    pub interval_secs: u64,
    /// Images older than this are deleted
    pub max_age_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 3000)),
            data_dir: PathBuf::from("data"),
            log_level: "info".to_string(),
            log_json: false,
            frontend_origin: None,
            relay: RelaySettings::default(),
            rate_limit: RateLimitSettings::default(),
            mail: MailSettings::default(),
            sweeper: SweeperSettings::default(),
        }
    }
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            outbound_queue: 64,
            broadcast_scope: BroadcastScope::Room,
        }
    }
}

impl RateLimitSettings {
    /// How often idle windows are forgotten: every ten windows, at least daily
    pub fn cleanup_interval(&self) -> Duration {
        let secs = self.window_secs.max(1).saturating_mul(10);
        Duration::from_secs(secs.min(MAX_CLEANUP_SECS))
    }
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            max_requests: 3,
            window_secs: 60,
        }
    }
}

impl Default for MailSettings {
    fn default() -> Self {
        Self {
            from: "camwatch@localhost".to_string(),
            to: "owner@localhost".to_string(),
            subject: "Camera alert".to_string(),
        }
    }
}

impl Default for SweeperSettings {
    fn default() -> Self {
        Self {
            interval_secs: 60 * 60,
            max_age_secs: 60 * 60 * 24 * 7, // 7 days
        }
    }
}

impl Settings {
    /// Load settings from `camwatch.toml` (if present) and the environment
    pub fn load() -> Result<Self, AppError> {
        Self::load_from(DEFAULT_CONFIG_FILE)
    }

    /// Load settings from a specific TOML file (if present) and the environment
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, AppError> {
        let settings: Settings = Self::figment(path.as_ref()).extract()?;
        settings.validate()?;
        Ok(settings)
    }

    fn figment(path: &Path) -> Figment {
        Figment::from(Serialized::defaults(Settings::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed("CAMWATCH_").split("__"))
    }

    /// Reject values the server cannot run with
    pub fn validate(&self) -> Result<(), AppError> {
        if !LOG_LEVELS.contains(&self.log_level.to_lowercase().as_str()) {
            return Err(AppError::Config(format!(
                "log_level must be one of {LOG_LEVELS:?}, got {}",
                self.log_level
            )));
        }
        if self.relay.outbound_queue == 0 {
            return Err(AppError::Config("relay.outbound_queue must be > 0".to_string()));
        }
        if self.rate_limit.max_requests == 0 || self.rate_limit.window_secs == 0 {
            return Err(AppError::Config(
                "rate_limit.max_requests and rate_limit.window_secs must be > 0".to_string(),
            ));
        }
        if self.sweeper.interval_secs == 0 || self.sweeper.max_age_secs == 0 {
            return Err(AppError::Config(
                "sweeper.interval_secs and sweeper.max_age_secs must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}
