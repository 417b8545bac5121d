// ============================================================
// Layer 1 — Server Configuration
// ============================================================
// Every field has a serde default so a partial JSON/TOML
// document (or none at all) yields a working config.

use serde::{Deserialize, Serialize};

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Maximum request body size in bytes
    #[serde(default = "default_max_body_size")]
    pub max_body_size: usize,

    /// Allow any origin, method and header
    #[serde(default = "default_true")]
    pub cors_enabled: bool,

    /// Page served at GET /
    #[serde(default = "default_index_file")]
    pub index_file: String,

    /// Directory served under /assets
    #[serde(default = "default_assets_dir")]
    pub assets_dir: String,

    /// Directory served under /static
    #[serde(default = "default_static_dir")]
    pub static_dir: String,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_max_body_size() -> usize {
    20 * 1024 * 1024 // 20 MiB, enough for an uncompressed DICOM slice
}

fn default_true() -> bool {
    true
}

fn default_index_file() -> String {
    "index.html".to_string()
}

fn default_assets_dir() -> String {
    "assets".to_string()
}

fn default_static_dir() -> String {
    ".".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host:          default_host(),
            port:          default_port(),
            max_body_size: default_max_body_size(),
            cors_enabled:  true,
            index_file:    default_index_file(),
            assets_dir:    default_assets_dir(),
            static_dir:    default_static_dir(),
        }
    }
}

impl ServerConfig {
    /// Get the socket address string
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
