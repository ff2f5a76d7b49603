//! # Engine Configuration
//!
//! Configuration management for the todo sync engine.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     TODO_SYNC_USER_ID=alice                                            │
//! │     TODO_SYNC_MAX_RETRIES=5                                            │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/todosync/sync.toml (Linux)                               │
//! │     ~/Library/Application Support/dev.todosync.todosync/sync.toml      │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! │     guest user, 3 retries, fixed 1s delay                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! # sync.toml
//! [user]
//! id = "alice"
//!
//! [sync]
//! max_retries = 3
//! retry_strategy = "exponential"  # immediate | fixed | exponential
//! retry_delay_ms = 1000
//! max_retry_delay_ms = 30000
//! auto_sync_on_reconnect = true
//! sync_interval_secs = 0          # 0 disables periodic sync
//! rollback_on_abandon = true
//!
//! [storage]
//! database_path = "/var/lib/todos/todos.db"
//! persist_debounce_ms = 250
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::{SyncError, SyncResult};
use crate::retry::{RetryPolicy, RetryStrategy};
use todo_core::{DEFAULT_MAX_RETRIES, GUEST_USER_ID};

// =============================================================================
// Retry Strategy Kind
// =============================================================================

/// How long to wait between delivery attempts of a failed operation.
///
/// ```text
/// ┌─────────────────────────────────────────────────────────────────────────┐
/// │  IMMEDIATE     retry as soon as the previous attempt failed            │
/// │  FIXED         wait retry_delay_ms between every attempt (default)     │
/// │  EXPONENTIAL   retry_delay_ms, doubling, capped at max_retry_delay_ms  │
/// └─────────────────────────────────────────────────────────────────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryStrategyKind {
    Immediate,
    #[default]
    Fixed,
    Exponential,
}

impl std::fmt::Display for RetryStrategyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RetryStrategyKind::Immediate => write!(f, "immediate"),
            RetryStrategyKind::Fixed => write!(f, "fixed"),
            RetryStrategyKind::Exponential => write!(f, "exponential"),
        }
    }
}

impl std::str::FromStr for RetryStrategyKind {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "immediate" | "none" => Ok(RetryStrategyKind::Immediate),
            "fixed" | "constant" => Ok(RetryStrategyKind::Fixed),
            "exponential" | "backoff" => Ok(RetryStrategyKind::Exponential),
            other => Err(SyncError::InvalidConfig(format!(
                "Unknown retry strategy: '{}'. Valid options: immediate, fixed, exponential",
                other
            ))),
        }
    }
}

// =============================================================================
// User Configuration
// =============================================================================

/// Identity used when no auth context is supplied to the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserConfig {
    /// Stamped on created todos. Defaults to the guest id.
    #[serde(default = "default_user_id")]
    pub id: String,
}

fn default_user_id() -> String {
    GUEST_USER_ID.to_string()
}

impl Default for UserConfig {
    fn default() -> Self {
        UserConfig {
            id: default_user_id(),
        }
    }
}

// =============================================================================
// Sync Settings
// =============================================================================

/// Retry and reconciliation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncSettings {
    /// Failed attempts tolerated before an operation is abandoned.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default)]
    pub retry_strategy: RetryStrategyKind,

    /// Fixed delay, or the first delay of the exponential curve.
    #[serde(default = "default_retry_delay")]
    pub retry_delay_ms: u64,

    /// Cap for the exponential curve.
    #[serde(default = "default_max_retry_delay")]
    pub max_retry_delay_ms: u64,

    /// Run a sync pass when the connection comes back.
    #[serde(default = "default_true")]
    pub auto_sync_on_reconnect: bool,

    /// Periodic sync interval (seconds). 0 disables it.
    #[serde(default)]
    pub sync_interval_secs: u64,

    /// Restore the pre-mutation todo list when an operation is abandoned.
    #[serde(default = "default_true")]
    pub rollback_on_abandon: bool,
}

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}
fn default_retry_delay() -> u64 {
    1000
}
fn default_max_retry_delay() -> u64 {
    30_000
}
fn default_true() -> bool {
    true
}

impl Default for SyncSettings {
    fn default() -> Self {
        SyncSettings {
            max_retries: default_max_retries(),
            retry_strategy: RetryStrategyKind::default(),
            retry_delay_ms: default_retry_delay(),
            max_retry_delay_ms: default_max_retry_delay(),
            auto_sync_on_reconnect: true,
            sync_interval_secs: 0,
            rollback_on_abandon: true,
        }
    }
}

impl SyncSettings {
    /// Builds the retry policy these settings describe.
    pub fn retry_policy(&self) -> RetryPolicy {
        let strategy = match self.retry_strategy {
            RetryStrategyKind::Immediate => RetryStrategy::Immediate,
            RetryStrategyKind::Fixed => {
                RetryStrategy::Fixed(Duration::from_millis(self.retry_delay_ms))
            }
            RetryStrategyKind::Exponential => RetryStrategy::Exponential {
                initial: Duration::from_millis(self.retry_delay_ms),
                max: Duration::from_millis(self.max_retry_delay_ms),
            },
        };
        RetryPolicy::new(self.max_retries, strategy)
    }

    /// Periodic sync interval, if enabled.
    pub fn sync_interval(&self) -> Option<Duration> {
        (self.sync_interval_secs > 0).then(|| Duration::from_secs(self.sync_interval_secs))
    }
}

// =============================================================================
// Storage Settings
// =============================================================================

/// Local durable store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageSettings {
    /// SQLite file. `None` means `<data dir>/todos.db`.
    #[serde(default)]
    pub database_path: Option<PathBuf>,

    /// Quiet period before a burst of changes is written out (milliseconds).
    #[serde(default = "default_persist_debounce")]
    pub persist_debounce_ms: u64,
}

fn default_persist_debounce() -> u64 {
    250
}

impl Default for StorageSettings {
    fn default() -> Self {
        StorageSettings {
            database_path: None,
            persist_debounce_ms: default_persist_debounce(),
        }
    }
}

impl StorageSettings {
    /// The configured path, or the platform data directory.
    pub fn resolved_database_path(&self) -> Option<PathBuf> {
        self.database_path.clone().or_else(|| {
            project_dirs().map(|dirs| dirs.data_dir().join("todos.db"))
        })
    }

    pub fn persist_debounce(&self) -> Duration {
        Duration::from_millis(self.persist_debounce_ms)
    }
}

// =============================================================================
// Main Engine Configuration
// =============================================================================

/// Complete engine configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub user: UserConfig,

    #[serde(default)]
    pub sync: SyncSettings,

    #[serde(default)]
    pub storage: StorageSettings,
}

impl EngineConfig {
    /// Creates a config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (sync.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> SyncResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading engine config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Loads config or returns default if load fails.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load engine config: {}. Using defaults.", e);
            Self::default()
        })
    }

    /// Saves configuration to file.
    pub fn save(&self, config_path: Option<PathBuf>) -> SyncResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| SyncError::ConfigSaveFailed("No config path available".into()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| SyncError::ConfigSaveFailed(e.to_string()))?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents).map_err(|e| SyncError::ConfigSaveFailed(e.to_string()))?;

        info!(?path, "Engine config saved");
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> SyncResult<()> {
        if self.user.id.trim().is_empty() {
            return Err(SyncError::InvalidConfig("user.id must not be empty".into()));
        }

        if self.sync.retry_strategy != RetryStrategyKind::Immediate
            && self.sync.retry_delay_ms == 0
        {
            return Err(SyncError::InvalidConfig(format!(
                "retry_delay_ms must be greater than 0 for the {} strategy",
                self.sync.retry_strategy
            )));
        }

        if self.sync.retry_strategy == RetryStrategyKind::Exponential
            && self.sync.max_retry_delay_ms < self.sync.retry_delay_ms
        {
            return Err(SyncError::InvalidConfig(
                "max_retry_delay_ms must be at least retry_delay_ms".into(),
            ));
        }

        if let Some(ref path) = self.storage.database_path {
            if path.as_os_str().is_empty() {
                return Err(SyncError::InvalidConfig(
                    "storage.database_path must not be empty".into(),
                ));
            }
        }

        Ok(())
    }

    /// Applies environment variable overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(id) = std::env::var("TODO_SYNC_USER_ID") {
            debug!(user_id = %id, "Overriding user ID from environment");
            self.user.id = id;
        }

        if let Ok(retries) = std::env::var("TODO_SYNC_MAX_RETRIES") {
            match retries.parse::<u32>() {
                Ok(n) => self.sync.max_retries = n,
                Err(_) => warn!(value = %retries, "Ignoring invalid TODO_SYNC_MAX_RETRIES"),
            }
        }

        if let Ok(strategy) = std::env::var("TODO_SYNC_RETRY_STRATEGY") {
            match strategy.parse() {
                Ok(parsed) => {
                    debug!(strategy = %strategy, "Overriding retry strategy from environment");
                    self.sync.retry_strategy = parsed;
                }
                Err(_) => warn!(strategy = %strategy, "Unknown retry strategy in environment"),
            }
        }

        if let Ok(delay) = std::env::var("TODO_SYNC_RETRY_DELAY_MS") {
            if let Ok(ms) = delay.parse::<u64>() {
                self.sync.retry_delay_ms = ms;
            }
        }

        if let Ok(path) = std::env::var("TODO_SYNC_DB_PATH") {
            debug!(path = %path, "Overriding database path from environment");
            self.storage.database_path = Some(PathBuf::from(path));
        }

        if let Ok(auto) = std::env::var("TODO_SYNC_AUTO_SYNC") {
            match auto.to_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => self.sync.auto_sync_on_reconnect = true,
                "0" | "false" | "no" | "off" => self.sync.auto_sync_on_reconnect = false,
                _ => warn!(value = %auto, "Ignoring invalid TODO_SYNC_AUTO_SYNC"),
            }
        }
    }

    /// Returns the default config file path.
    pub fn default_config_path() -> Option<PathBuf> {
        project_dirs().map(|dirs| dirs.config_dir().join("sync.toml"))
    }

    // =========================================================================
    // Convenience Methods
    // =========================================================================

    pub fn user_id(&self) -> &str {
        &self.user.id
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.sync.retry_policy()
    }
}

fn project_dirs() -> Option<directories::ProjectDirs> {
    directories::ProjectDirs::from("dev", "todosync", "todosync")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_strategy_parsing() {
        assert_eq!(
            "immediate".parse::<RetryStrategyKind>().unwrap(),
            RetryStrategyKind::Immediate
        );
        assert_eq!(
            "FIXED".parse::<RetryStrategyKind>().unwrap(),
            RetryStrategyKind::Fixed
        );
        assert_eq!(
            "backoff".parse::<RetryStrategyKind>().unwrap(),
            RetryStrategyKind::Exponential
        );
        assert!("linear".parse::<RetryStrategyKind>().is_err());
    }

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.user_id(), GUEST_USER_ID);
        assert_eq!(config.sync.max_retries, 3);
        assert_eq!(config.sync.retry_strategy, RetryStrategyKind::Fixed);
        assert!(config.sync.auto_sync_on_reconnect);
        assert!(config.sync.sync_interval().is_none());
        assert_eq!(config.storage.persist_debounce(), Duration::from_millis(250));
    }

    #[test]
    fn test_config_validation() {
        let mut config = EngineConfig::default();
        assert!(config.validate().is_ok());

        config.user.id = "  ".into();
        assert!(config.validate().unwrap_err().is_config_error());

        config.user.id = "alice".into();
        config.sync.retry_delay_ms = 0;
        assert!(config.validate().is_err());

        // Immediate retries need no delay
        config.sync.retry_strategy = RetryStrategyKind::Immediate;
        assert!(config.validate().is_ok());

        config.sync.retry_strategy = RetryStrategyKind::Exponential;
        config.sync.retry_delay_ms = 5000;
        config.sync.max_retry_delay_ms = 1000;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: EngineConfig = toml::from_str(
            r#"
            [sync]
            max_retries = 5
            retry_strategy = "exponential"
            sync_interval_secs = 60
            "#,
        )
        .unwrap();

        assert_eq!(config.user_id(), GUEST_USER_ID);
        assert_eq!(config.sync.max_retries, 5);
        assert_eq!(config.sync.retry_delay_ms, 1000);
        assert_eq!(config.sync.sync_interval(), Some(Duration::from_secs(60)));
        assert!(config.sync.rollback_on_abandon);

        let policy = config.retry_policy();
        assert_eq!(policy.max_retries, 5);
        assert_eq!(
            policy.strategy,
            RetryStrategy::Exponential {
                initial: Duration::from_secs(1),
                max: Duration::from_secs(30),
            }
        );
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let path = std::env::temp_dir().join(format!("todo-sync-{}.toml", uuid::Uuid::new_v4()));

        let mut config = EngineConfig::default();
        config.user.id = "alice".into();
        config.storage.database_path = Some(PathBuf::from("/tmp/todos.db"));
        config.save(Some(path.clone())).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains("[user]"));
        assert!(contents.contains("[sync]"));

        let loaded: EngineConfig = toml::from_str(&contents).unwrap();
        assert_eq!(loaded.user_id(), "alice");
        assert_eq!(
            loaded.storage.database_path.as_deref(),
            Some(std::path::Path::new("/tmp/todos.db"))
        );

        std::fs::remove_file(path).ok();
    }

    #[test]
    fn test_load_or_default_with_broken_file() {
        let path = std::env::temp_dir().join(format!("todo-sync-{}.toml", uuid::Uuid::new_v4()));
        std::fs::write(&path, "[sync\nmax_retries = ").unwrap();

        let config = EngineConfig::load_or_default(Some(path.clone()));
        assert_eq!(config.sync.max_retries, DEFAULT_MAX_RETRIES);

        std::fs::remove_file(path).ok();
    }
}
