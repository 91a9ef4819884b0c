use std::env;
use thiserror::Error;

pub const DATABASE_ENV: &str = "DATABASE";
pub const DEBUG_ENV: &str = "DEBUG";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("environment variable {0} is required but was not set")]
    Missing(&'static str),
}

/// Settings every custom-resource Lambda reads from its environment at bootstrap.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HandlerSettings {
    /// Name of the bookkeeping table, from `DATABASE`.
    pub table_name: Option<String>,
    /// `DEBUG=true` turns on permission probes and debug logging.
    pub debug: bool,
}

impl HandlerSettings {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        HandlerSettings {
            table_name: lookup(DATABASE_ENV).filter(|name| !name.trim().is_empty()),
            debug: lookup(DEBUG_ENV)
                .map(|v| v.trim().eq_ignore_ascii_case("true"))
                .unwrap_or(false),
        }
    }

    pub fn require_table_name(&self) -> Result<&str, ConfigError> {
        self.table_name
            .as_deref()
            .ok_or(ConfigError::Missing(DATABASE_ENV))
    }

    pub fn log_level(&self) -> tracing::Level {
        if self.debug {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }
}
