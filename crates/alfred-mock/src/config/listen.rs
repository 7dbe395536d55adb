//! Listener and admin endpoint configuration.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ListenConfig {
    #[serde(default = "default_listen_host")]
    pub host: String,
    #[serde(default = "default_listen_port")]
    pub port: u16,
}

fn default_listen_host() -> String {
    "0.0.0.0".to_string()
}

fn default_listen_port() -> u16 {
    8080
}

impl Default for ListenConfig {
    fn default() -> Self {
        Self {
            host: default_listen_host(),
            port: default_listen_port(),
        }
    }
}

impl ListenConfig {
    /// `host:port` string suitable for binding
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AdminConfig {
    /// Serve `/logger` and `/alfred/*` on the mock listener
    #[serde(default = "default_admin_enabled")]
    pub enabled: bool,
}

fn default_admin_enabled() -> bool {
    true
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: default_admin_enabled(),
        }
    }
}

/// Response returned when no mock matches
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NotFoundConfig {
    #[serde(default = "default_not_found_status")]
    pub status: u16,
    #[serde(default = "default_not_found_body")]
    pub body: String,
}

fn default_not_found_status() -> u16 {
    404
}

fn default_not_found_body() -> String {
    r#"{"error": "no mock matches this request"}"#.to_string()
}

impl Default for NotFoundConfig {
    fn default() -> Self {
        Self {
            status: default_not_found_status(),
            body: default_not_found_body(),
        }
    }
}
