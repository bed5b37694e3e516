//! Runtime Configuration
//!
//! Configuration for the runtime's ambient behavior. Values can be set
//! programmatically or loaded from environment variables.
//!
//! # Environment Variables
//!
//! All environment variables use the `RECOIL_` prefix:
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `RECOIL_LOG` | Log level (off/error/warn/info/debug/trace) | warn |
//! | `RECOIL_TRACE_SCOPES` | Emit per-region trace events ("true"/"false"); requires the trace level | false |
//! | `RECOIL_LOG_STDOUT` | Send log output to stdout instead of stderr ("true"/"false") | false |
//!
//! Scope depth and guard pool capacity are compile-time constants
//! ([`crate::MAX_SCOPE_DEPTH`], [`crate::GUARD_POOL_CAPACITY`]) and are not
//! configurable at runtime.

use std::env;

use thiserror::Error;

use crate::log::LogLevel;

/// Configuration error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// An environment variable held a value that could not be interpreted.
    #[error("invalid value for {var}: {value:?} ({reason})")]
    InvalidEnv {
        /// The offending variable name.
        var: String,
        /// The value found.
        value: String,
        /// Why it was rejected.
        reason: String,
    },
    /// A configuration value conflicts with another setting.
    #[error("invalid value for {field}: {message}")]
    InvalidValue {
        /// The offending field.
        field: String,
        /// Why it was rejected.
        message: String,
    },
}

/// Runtime configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Minimum log level for the runtime's own events.
    pub log_level: LogLevel,
    /// Emit per-region trace events (enter, close, unwind). Only meaningful
    /// when `log_level` admits trace output; see [`RuntimeConfig::validate`].
    pub trace_scopes: bool,
    /// Send log output to stdout instead of stderr.
    pub log_to_stdout: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Warn,
            trace_scopes: false,
            log_to_stdout: false,
        }
    }
}

impl RuntimeConfig {
    /// Load configuration from `RECOIL_*` environment variables.
    ///
    /// Unset variables keep their defaults; a set variable with an
    /// unrecognized value is an error, as is a combination that fails
    /// [`RuntimeConfig::validate`].
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| env::var(var).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(value) = get("RECOIL_LOG") {
            config.log_level = LogLevel::parse(&value).ok_or_else(|| ConfigError::InvalidEnv {
                var: "RECOIL_LOG".into(),
                value: value.clone(),
                reason: "expected off, error, warn, info, debug, or trace".into(),
            })?;
        }

        if let Some(value) = get("RECOIL_TRACE_SCOPES") {
            config.trace_scopes = parse_bool("RECOIL_TRACE_SCOPES", value)?;
        }

        if let Some(value) = get("RECOIL_LOG_STDOUT") {
            config.log_to_stdout = parse_bool("RECOIL_LOG_STDOUT", value)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Check cross-field consistency.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.trace_scopes && self.log_level > LogLevel::Trace {
            return Err(ConfigError::InvalidValue {
                field: "trace_scopes".into(),
                message: "requires log_level trace".into(),
            });
        }
        Ok(())
    }

    /// Apply this configuration to the process-wide logging state.
    pub(crate) fn apply(&self) {
        crate::log::set_level(self.log_level);
        crate::log::set_use_stderr(!self.log_to_stdout);
    }
}

fn parse_bool(var: &str, value: String) -> Result<bool, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Ok(true),
        "0" | "false" | "no" => Ok(false),
        _ => Err(ConfigError::InvalidEnv {
            var: var.into(),
            value,
            reason: "expected a boolean".into(),
        }),
    }
}
