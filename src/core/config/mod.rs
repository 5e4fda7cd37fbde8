//! Service configuration.
//!
//! # Module layout
//!
//! - **types** — Public configuration structs (`Config`, `ServerConfig`,
//!   `StoreConfig`).
//! - **raw** — Raw TOML deserialization types. These mirror the file shape
//!   and use serde defaults; kept private.
//! - **load** — Loading logic: `load`, `load_from`, env [`Overrides`],
//!   `expand_home`.

mod load;
mod raw;
mod types;

pub use load::{Overrides, expand_home, load, load_from};
pub use types::*;

impl Config {
    /// Safe `Config` for tests — in-memory store, loopback listener on an ephemeral port.
    pub fn test_default() -> Self {
        Self {
            service_name: "test".into(),
            log_level: "info".into(),
            log_file: None,
            server: ServerConfig {
                bind: "127.0.0.1:0".into(),
            },
            store: StoreConfig {
                backend: StoreBackend::Memory,
                path: std::path::PathBuf::from(":memory:"),
                busy_timeout_ms: raw::default_busy_timeout_ms(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::path::{Path, PathBuf};
    use tempfile::NamedTempFile;

    const MINIMAL_TOML: &str = r#"
[service]
name = "test-identity"
log_level = "info"
"#;

    fn write_toml(content: &str) -> NamedTempFile {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(content.as_bytes()).unwrap();
        f
    }

    #[test]
    fn parse_minimal_config_uses_defaults() {
        let f = write_toml(MINIMAL_TOML);
        let cfg = load_from(f.path(), &Overrides::default()).unwrap();
        assert_eq!(cfg.service_name, "test-identity");
        assert_eq!(cfg.log_level, "info");
        assert_eq!(cfg.server.bind, "0.0.0.0:3000");
        assert_eq!(cfg.store.backend, StoreBackend::Sqlite);
        assert_eq!(cfg.store.busy_timeout_ms, 5000);
        assert!(cfg.log_file.is_none());
    }

    #[test]
    fn parse_full_config() {
        let f = write_toml(
            r#"
[service]
name = "ids"
log_level = "debug"
log_file = "/tmp/ids.log"

[server]
bind = "127.0.0.1:4000"

[store]
backend = "memory"
path = "/var/lib/ids/contacts.db"
busy_timeout_ms = 250
"#,
        );
        let cfg = load_from(f.path(), &Overrides::default()).unwrap();
        assert_eq!(cfg.server.bind, "127.0.0.1:4000");
        assert_eq!(cfg.store.backend, StoreBackend::Memory);
        assert_eq!(cfg.store.path, PathBuf::from("/var/lib/ids/contacts.db"));
        assert_eq!(cfg.store.busy_timeout_ms, 250);
        assert_eq!(cfg.log_file, Some(PathBuf::from("/tmp/ids.log")));
    }

    #[test]
    fn unknown_backend_errors() {
        let f = write_toml(
            r#"
[service]
name = "ids"
log_level = "info"

[store]
backend = "postgres"
"#,
        );
        let msg = load_from(f.path(), &Overrides::default())
            .unwrap_err()
            .to_string();
        assert!(msg.contains("unknown store backend 'postgres'"));
    }

    #[test]
    fn missing_file_errors() {
        let result = load_from(Path::new("/nonexistent/config.toml"), &Overrides::default());
        let msg = result.unwrap_err().to_string();
        assert!(msg.contains("config error"));
    }

    #[test]
    fn env_overrides_take_precedence() {
        let f = write_toml(MINIMAL_TOML);
        let overrides = Overrides {
            port: Some("8088".into()),
            store_path: Some("/tmp/override.db".into()),
            log_level: Some("debug".into()),
        };
        let cfg = load_from(f.path(), &overrides).unwrap();
        assert_eq!(cfg.server.bind, "0.0.0.0:8088");
        assert_eq!(cfg.store.path, PathBuf::from("/tmp/override.db"));
        assert_eq!(cfg.log_level, "debug");
    }

    #[test]
    fn tilde_expands_to_home() {
        let home = dirs::home_dir().expect("home dir must exist in test env");
        let expanded = expand_home("~/.contact-identity");
        assert!(expanded.starts_with(&home));
        assert!(expanded.ends_with(".contact-identity"));
    }

    #[test]
    fn absolute_path_unchanged() {
        assert_eq!(expand_home("/absolute/path"), PathBuf::from("/absolute/path"));
    }
}
