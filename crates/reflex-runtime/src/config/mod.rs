//! Runtime configuration.
//!
//! # Load Order
//!
//! 1. Default values (compile-time)
//! 2. TOML document supplied by the host ([`RuntimeConfig::from_toml_str`]
//!    or [`RuntimeConfig::load`])
//! 3. Environment variables (`REFLEX_*`, [`RuntimeConfig::with_env_overrides`])
//!
//! Each layer overrides the previous. Where the TOML lives is the host's
//! business.
//!
//! # Example
//!
//! ```
//! use reflex_runtime::RuntimeConfig;
//!
//! let config = RuntimeConfig::from_toml_str(
//!     r#"
//! tick_millis = 20
//! max_chain_steps = 10000
//! "#,
//! )?;
//! assert_eq!(config.tick_millis, 20);
//! assert_eq!(config.readiness_poll_millis, 100);
//! # Ok::<(), reflex_runtime::ConfigError>(())
//! ```

mod error;

pub use error::ConfigError;

use reflex_types::Priority;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

/// Helper macro for parsing boolean environment variables.
macro_rules! parse_env_bool {
    ($field:expr, $var:literal) => {
        if let Ok(val) = std::env::var($var) {
            $field = parse_bool(&val)
                .ok_or_else(|| ConfigError::invalid_env_var($var, "expected bool"))?;
        }
    };
}

/// Helper macro for parsing integer environment variables.
macro_rules! parse_env_u64 {
    ($field:expr, $var:literal) => {
        if let Ok(val) = std::env::var($var) {
            $field = val
                .trim()
                .parse::<u64>()
                .map_err(|e| ConfigError::invalid_env_var($var, e.to_string()))?;
        }
    };
}

/// Settings for one [`RuntimeCore`](crate::RuntimeCore).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Wall-clock length of one scheduler tick.
    pub tick_millis: u64,

    /// How often a due task re-checks host readiness.
    pub readiness_poll_millis: u64,

    /// Name of the scheduler's timer thread.
    pub scheduler_thread_name: String,

    /// Panic on thread-affinity violations instead of returning an error.
    pub strict_affinity: bool,

    /// Abort a trigger body after this many interpreter steps.
    pub max_chain_steps: Option<u64>,

    /// Priority for triggers that do not set one.
    pub default_priority: Priority,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            tick_millis: 50,
            readiness_poll_millis: 100,
            scheduler_thread_name: "reflex-scheduler".to_string(),
            strict_affinity: cfg!(debug_assertions),
            max_chain_steps: None,
            default_priority: Priority::Normal,
        }
    }
}

impl RuntimeConfig {
    /// Parses a TOML document; missing keys keep their defaults.
    ///
    /// # Errors
    ///
    /// [`ConfigError::ParseToml`] on malformed input.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Reads and parses a TOML file.
    ///
    /// # Errors
    ///
    /// [`ConfigError::ReadFile`] if the file cannot be read,
    /// [`ConfigError::ParseToml`] if it is malformed.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::read_file(path, e))?;
        let config = Self::from_toml_str(&content)?;
        debug!(path = %path.display(), "Loaded runtime config");
        Ok(config)
    }

    /// Serializes to TOML.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Serialize`] if serialization fails.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Applies `REFLEX_*` environment variable overrides.
    ///
    /// | Variable | Field |
    /// |----------|-------|
    /// | `REFLEX_TICK_MILLIS` | `tick_millis` |
    /// | `REFLEX_READINESS_POLL_MILLIS` | `readiness_poll_millis` |
    /// | `REFLEX_STRICT_AFFINITY` | `strict_affinity` |
    /// | `REFLEX_MAX_CHAIN_STEPS` | `max_chain_steps` (`0` disables) |
    ///
    /// # Errors
    ///
    /// [`ConfigError::InvalidEnvVar`] if a variable does not parse.
    pub fn with_env_overrides(mut self) -> Result<Self, ConfigError> {
        parse_env_u64!(self.tick_millis, "REFLEX_TICK_MILLIS");
        parse_env_u64!(self.readiness_poll_millis, "REFLEX_READINESS_POLL_MILLIS");
        parse_env_bool!(self.strict_affinity, "REFLEX_STRICT_AFFINITY");

        let mut max_steps = self.max_chain_steps.unwrap_or(0);
        parse_env_u64!(max_steps, "REFLEX_MAX_CHAIN_STEPS");
        self.max_chain_steps = (max_steps > 0).then_some(max_steps);

        Ok(self)
    }

    /// Checks value ranges.
    ///
    /// # Errors
    ///
    /// [`ConfigError::InvalidValue`] for a zero tick or poll interval, a
    /// zero step limit, or an empty thread name.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_millis == 0 {
            return Err(ConfigError::invalid_value("tick_millis", "must be positive"));
        }
        if self.readiness_poll_millis == 0 {
            return Err(ConfigError::invalid_value(
                "readiness_poll_millis",
                "must be positive",
            ));
        }
        if self.max_chain_steps == Some(0) {
            return Err(ConfigError::invalid_value(
                "max_chain_steps",
                "must be positive when set",
            ));
        }
        if self.scheduler_thread_name.trim().is_empty() {
            return Err(ConfigError::invalid_value(
                "scheduler_thread_name",
                "must not be empty",
            ));
        }
        Ok(())
    }

    /// Returns the tick length.
    #[must_use]
    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_millis)
    }

    /// Returns the readiness poll interval.
    #[must_use]
    pub fn readiness_poll(&self) -> Duration {
        Duration::from_millis(self.readiness_poll_millis)
    }
}

/// Parses a boolean from string.
///
/// Accepts: "true", "false", "1", "0", "yes", "no", "on", "off"
/// (case-insensitive).
fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}
