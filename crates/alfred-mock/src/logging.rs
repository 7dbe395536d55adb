//! Tracing subscriber set-up and runtime log-level control.
//!
//! The filter sits behind a `reload` layer so `POST /logger` can swap it while
//! requests are in flight.

use crate::config::{LogFormat, LoggingConfig};
use parking_lot::RwLock;
use serde::Serialize;
use thiserror::Error;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, reload, EnvFilter, Registry};

/// Level names accepted by the config file and the logger endpoint
pub const LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Dependencies whose debug output drowns out request logs
const QUIET_TARGETS: &str = "hyper=info,hyper_util=info,reqwest=info,rustls=info,boa_engine=warn";

pub fn is_valid_level(level: &str) -> bool {
    LEVELS.contains(&level.to_ascii_lowercase().as_str())
}

#[derive(Error, Debug)]
pub enum LoggingError {
    #[error("Unknown log level '{0}', expected one of: trace, debug, info, warn, error")]
    UnknownLevel(String),

    #[error("Failed to apply log level: {0}")]
    Reload(String),
}

/// Body of a successful level change
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LevelChange {
    pub previous_level: String,
    pub configured_level: String,
    pub effective_level: String,
}

/// Handle over the process log level
pub struct LogLevelHandle {
    reload: Option<reload::Handle<EnvFilter, Registry>>,
    current: RwLock<String>,
}

impl LogLevelHandle {
    /// A handle that tracks the level without a subscriber behind it.
    pub fn detached(level: &str) -> Self {
        Self {
            reload: None,
            current: RwLock::new(level.to_ascii_lowercase()),
        }
    }

    pub fn level(&self) -> String {
        self.current.read().clone()
    }

    /// Switch to a new level, returning the before/after pair
    pub fn set_level(&self, level: &str) -> Result<LevelChange, LoggingError> {
        let configured = level.to_ascii_lowercase();
        if !is_valid_level(&configured) {
            return Err(LoggingError::UnknownLevel(level.to_string()));
        }

        let mut current = self.current.write();
        if let Some(handle) = &self.reload {
            handle
                .reload(build_filter(&configured))
                .map_err(|e| LoggingError::Reload(e.to_string()))?;
        }

        let previous = std::mem::replace(&mut *current, configured.clone());
        tracing::info!("Log level changed from {} to {}", previous, configured);

        Ok(LevelChange {
            previous_level: previous,
            configured_level: configured.clone(),
            effective_level: configured,
        })
    }
}

fn build_filter(level: &str) -> EnvFilter {
    EnvFilter::new(format!("{level},{QUIET_TARGETS}"))
}

/// `RUST_LOG` wins over the configured level at start-up
fn initial_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| build_filter(level))
}

/// Install the global subscriber.
pub fn init(config: &LoggingConfig) -> anyhow::Result<LogLevelHandle> {
    let level = config.level.to_ascii_lowercase();
    let (filter_layer, handle) = reload::Layer::new(initial_filter(&level));

    let registry = tracing_subscriber::registry().with(filter_layer);
    match config.format {
        LogFormat::Text => registry.with(fmt::layer()).try_init()?,
        LogFormat::Json => registry.with(fmt::layer().json()).try_init()?,
    }

    Ok(LogLevelHandle {
        reload: Some(handle),
        current: RwLock::new(level),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_is_valid_level() {
        assert!(is_valid_level("debug"));
        assert!(is_valid_level("ERROR"));
        assert!(!is_valid_level("verbose"));
        assert!(!is_valid_level(""));
    }

    #[test]
    fn test_detached_set_level() {
        let handle = LogLevelHandle::detached("info");
        let change = handle.set_level("error").unwrap();

        assert_eq!(
            change,
            LevelChange {
                previous_level: "info".to_string(),
                configured_level: "error".to_string(),
                effective_level: "error".to_string(),
            }
        );
        assert_eq!(handle.level(), "error");
    }

    #[test]
    fn test_unknown_level_keeps_previous() {
        let handle = LogLevelHandle::detached("debug");
        let err = handle.set_level("chatty").unwrap_err();

        assert!(matches!(err, LoggingError::UnknownLevel(_)));
        assert_eq!(handle.level(), "debug");
    }

    #[test]
    fn test_level_change_serializes_camel_case() {
        let change = LevelChange {
            previous_level: "info".to_string(),
            configured_level: "debug".to_string(),
            effective_level: "debug".to_string(),
        };
        let json = serde_json::to_value(&change).unwrap();
        assert_eq!(json["previousLevel"], "info");
        assert_eq!(json["effectiveLevel"], "debug");
    }

    #[test]
    #[serial]
    fn test_rust_log_wins_at_startup() {
        std::env::set_var("RUST_LOG", "warn");
        let from_env = initial_filter("debug").to_string().to_lowercase();
        std::env::remove_var("RUST_LOG");
        assert_eq!(from_env, "warn");

        let configured = initial_filter("debug").to_string().to_lowercase();
        assert!(configured.contains("debug"));
        assert!(configured.contains("boa_engine=warn"));
    }
}
