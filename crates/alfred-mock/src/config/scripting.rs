//! Script pool, store and async action configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Script pool configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ScriptingConfig {
    /// Number of worker threads (0 = auto-detect: num_cpus/2, min 2, max 16)
    #[serde(default = "default_script_workers")]
    pub workers: usize,
    /// Maximum queue size for pending script invocations
    #[serde(default = "default_script_queue_size")]
    pub queue_size: usize,
    /// Time budget in milliseconds for one hook invocation
    #[serde(default = "default_script_timeout_ms")]
    pub timeout_ms: u64,
    /// Iteration cap applied to every JavaScript loop
    #[serde(default = "default_loop_iteration_limit")]
    pub loop_iteration_limit: u64,
}

fn default_script_workers() -> usize {
    0
} // 0 = auto-detect

fn default_script_queue_size() -> usize {
    1000
}

fn default_script_timeout_ms() -> u64 {
    1000
}

fn default_loop_iteration_limit() -> u64 {
    10_000_000
}

impl Default for ScriptingConfig {
    fn default() -> Self {
        Self {
            workers: default_script_workers(),
            queue_size: default_script_queue_size(),
            timeout_ms: default_script_timeout_ms(),
            loop_iteration_limit: default_loop_iteration_limit(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct StoreConfig {
    /// JSON object file bulk-loaded into the store at start-up
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ActionsConfig {
    /// Timeout applied to actions that do not declare one
    #[serde(default = "default_action_timeout_ms")]
    pub default_timeout_ms: u64,
}

fn default_action_timeout_ms() -> u64 {
    10_000
}

impl Default for ActionsConfig {
    fn default() -> Self {
        Self {
            default_timeout_ms: default_action_timeout_ms(),
        }
    }
}
