//! Configuration types for the mock server.

mod listen;
mod scripting;

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

pub use listen::{AdminConfig, ListenConfig, NotFoundConfig};
pub use scripting::{ActionsConfig, ScriptingConfig, StoreConfig};

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub listen: ListenConfig,
    #[serde(default)]
    pub core: CoreConfig,
    #[serde(default)]
    pub scripting: ScriptingConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub admin: AdminConfig,
    #[serde(default)]
    pub not_found: NotFoundConfig,
    #[serde(default)]
    pub actions: ActionsConfig,
}

/// Where mock, script and body files live
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CoreConfig {
    #[serde(default = "default_mocks_dir")]
    pub mocks_dir: PathBuf,
    #[serde(default = "default_functions_dir")]
    pub functions_dir: PathBuf,
    #[serde(default = "default_bodies_dir")]
    pub bodies_dir: PathBuf,
}

fn default_mocks_dir() -> PathBuf {
    PathBuf::from("user-files/mocks")
}

fn default_functions_dir() -> PathBuf {
    PathBuf::from("user-files/functions")
}

fn default_bodies_dir() -> PathBuf {
    PathBuf::from("user-files/body-files")
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            mocks_dir: default_mocks_dir(),
            functions_dir: default_functions_dir(),
            bodies_dir: default_bodies_dir(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, anyhow::Error> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if !crate::logging::is_valid_level(&self.logging.level) {
            anyhow::bail!(
                "Unknown log level '{}'. Expected one of: {}",
                self.logging.level,
                crate::logging::LEVELS.join(", ")
            );
        }

        if !(100..=999).contains(&self.not_found.status) {
            anyhow::bail!(
                "not_found.status must be a valid HTTP status code, got {}",
                self.not_found.status
            );
        }

        if self.scripting.timeout_ms == 0 {
            anyhow::bail!("scripting.timeout_ms must be greater than zero");
        }

        if self.scripting.queue_size == 0 {
            anyhow::bail!("scripting.queue_size must be greater than zero");
        }

        if self.scripting.loop_iteration_limit == 0 {
            anyhow::bail!("scripting.loop_iteration_limit must be greater than zero");
        }

        if self.actions.default_timeout_ms == 0 {
            anyhow::bail!("actions.default_timeout_ms must be greater than zero");
        }

        Ok(())
    }
}
