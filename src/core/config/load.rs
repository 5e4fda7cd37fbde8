//! Configuration loading with env-var overrides.
//!
//! Reads a TOML file, resolves it into [`Config`], then applies
//! `PORT`, `CONTACT_IDENTITY_DB` and `CONTACT_IDENTITY_LOG_LEVEL` overrides.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::AppError;

use super::raw::{self, RawConfig};
use super::types::*;

const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Values that take precedence over the config file.
///
/// Collected from the environment by [`Overrides::from_env`]; tests build
/// them directly instead of mutating process env.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    /// Listen port; replaces the port part of `server.bind`.
    pub port: Option<String>,
    pub store_path: Option<String>,
    pub log_level: Option<String>,
}

impl Overrides {
    pub fn from_env() -> Self {
        Self {
            port: env::var("PORT").ok().filter(|v| !v.trim().is_empty()),
            store_path: env::var("CONTACT_IDENTITY_DB").ok(),
            log_level: env::var("CONTACT_IDENTITY_LOG_LEVEL").ok(),
        }
    }
}

/// Resolve the service config: an explicit `config_path`, else `config/default.toml`,
/// else built-in defaults. Environment overrides are applied last.
pub fn load(config_path: Option<&str>) -> Result<Config, AppError> {
    let overrides = Overrides::from_env();

    if let Some(path) = config_path {
        return load_from(Path::new(path), &overrides);
    }

    let default_path = Path::new(DEFAULT_CONFIG_PATH);
    if default_path.exists() {
        load_from(default_path, &overrides)
    } else {
        resolve(builtin_default(), &overrides)
    }
}

/// Load an explicit config file and apply `overrides`.
pub fn load_from(path: &Path, overrides: &Overrides) -> Result<Config, AppError> {
    let text = fs::read_to_string(path)
        .map_err(|e| AppError::Config(format!("cannot read {}: {e}", path.display())))?;

    let parsed: RawConfig = toml::from_str(&text)
        .map_err(|e| AppError::Config(format!("parse error in {}: {e}", path.display())))?;

    resolve(parsed, overrides)
}

fn builtin_default() -> RawConfig {
    RawConfig {
        service: raw::RawService {
            name: "contact-identity".to_string(),
            log_level: "info".to_string(),
            log_file: None,
        },
        server: raw::RawServer::default(),
        store: raw::RawStore::default(),
    }
}

fn resolve(parsed: RawConfig, overrides: &Overrides) -> Result<Config, AppError> {
    let backend = match parsed.store.backend.as_str() {
        "sqlite" => StoreBackend::Sqlite,
        "memory" => StoreBackend::Memory,
        other => {
            return Err(AppError::Config(format!(
                "unknown store backend '{other}' (expected \"sqlite\" or \"memory\")"
            )));
        }
    };

    let bind = match overrides.port.as_deref() {
        Some(port) => with_port(&parsed.server.bind, port)?,
        None => parsed.server.bind,
    };

    let store_path = overrides
        .store_path
        .as_deref()
        .unwrap_or(&parsed.store.path);

    Ok(Config {
        service_name: parsed.service.name,
        log_level: overrides
            .log_level
            .clone()
            .unwrap_or(parsed.service.log_level),
        log_file: parsed.service.log_file.as_deref().map(expand_home),
        server: ServerConfig { bind },
        store: StoreConfig {
            backend,
            path: expand_home(store_path),
            busy_timeout_ms: parsed.store.busy_timeout_ms,
        },
    })
}

/// Replace the port of a `host:port` bind address.
fn with_port(bind: &str, port: &str) -> Result<String, AppError> {
    let port: u16 = port
        .trim()
        .parse()
        .map_err(|_| AppError::Config(format!("PORT must be a number in 0-65535, got '{port}'")))?;
    let host = bind.rsplit_once(':').map(|(host, _)| host).unwrap_or(bind);
    Ok(format!("{host}:{port}"))
}

/// Expand a leading `~` to the user's home directory.
/// Absolute or relative paths without `~` are returned unchanged.
pub fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    if path == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    }
    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn port_replaces_bind_port() {
        assert_eq!(with_port("0.0.0.0:3000", "8080").unwrap(), "0.0.0.0:8080");
        assert_eq!(with_port("[::1]:3000", "9000").unwrap(), "[::1]:9000");
    }

    #[test]
    fn bad_port_is_config_error() {
        let err = with_port("0.0.0.0:3000", "http").unwrap_err();
        assert!(err.to_string().contains("config error"));
        assert!(with_port("0.0.0.0:3000", "70000").is_err());
    }

    #[test]
    fn builtin_default_resolves() {
        let cfg = resolve(builtin_default(), &Overrides::default()).unwrap();
        assert_eq!(cfg.server.bind, "0.0.0.0:3000");
        assert_eq!(cfg.store.backend, StoreBackend::Sqlite);
        assert!(cfg.store.path.ends_with("contacts.db"));
    }
}
