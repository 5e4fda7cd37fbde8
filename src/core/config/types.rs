//! Public configuration types.
//!
//! These are the resolved, ready-to-use structs the service consumes.
//! Raw TOML deserialization types live in `raw.rs`.

use std::fmt;
use std::path::PathBuf;

// ── Server ──────────────────────────────────────────────────────────────────

/// HTTP listener configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Socket address the identify endpoint binds to.
    pub bind: String,
}

// ── Store ───────────────────────────────────────────────────────────────────

/// Which contact store implementation backs the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    /// Durable SQLite file (requires the `isqlite` feature).
    Sqlite,
    /// Process-local table, lost on exit.
    Memory,
}

impl StoreBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreBackend::Sqlite => "sqlite",
            StoreBackend::Memory => "memory",
        }
    }
}

impl fmt::Display for StoreBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Contact store configuration.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    /// Database file (already expanded, no `~`). Ignored by the memory backend.
    pub path: PathBuf,
    /// How long a transaction waits for the database write lock.
    pub busy_timeout_ms: u64,
}

// ── Top-level ───────────────────────────────────────────────────────────────

/// Fully-resolved service configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub service_name: String,
    pub log_level: String,
    /// Append logs here instead of stderr.
    pub log_file: Option<PathBuf>,
    pub server: ServerConfig,
    pub store: StoreConfig,
}
