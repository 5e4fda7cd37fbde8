//! Raw TOML deserialization types.
//!
//! These structs mirror the TOML file shape and use `serde` defaults.
//! The `load` module converts them into the public `types` structs.

use serde::Deserialize;

/// Raw TOML shape — serde target before resolution.
#[derive(Deserialize)]
pub(super) struct RawConfig {
    pub service: RawService,
    #[serde(default)]
    pub server: RawServer,
    #[serde(default)]
    pub store: RawStore,
}

#[derive(Deserialize)]
pub(super) struct RawService {
    pub name: String,
    pub log_level: String,
    #[serde(default)]
    pub log_file: Option<String>,
}

#[derive(Deserialize)]
pub(super) struct RawServer {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for RawServer {
    fn default() -> Self {
        Self { bind: default_bind() }
    }
}

#[derive(Deserialize)]
pub(super) struct RawStore {
    #[serde(default = "default_backend")]
    pub backend: String,
    #[serde(default = "default_store_path")]
    pub path: String,
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

impl Default for RawStore {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            path: default_store_path(),
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }
}

pub(super) fn default_bind() -> String {
    "0.0.0.0:3000".to_string()
}

pub(super) fn default_backend() -> String {
    "sqlite".to_string()
}

pub(super) fn default_store_path() -> String {
    "~/.contact-identity/contacts.db".to_string()
}

pub(super) fn default_busy_timeout_ms() -> u64 {
    5000
}
