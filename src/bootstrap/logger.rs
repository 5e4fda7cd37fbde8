//! Logging initialisation via tracing-subscriber.
//!
//! Call [`init`] once at startup, after the effective level is known.

use std::fs::OpenOptions;
use std::path::Path;

use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::BoxMakeWriter;

use crate::error::AppError;

/// Where the filter directive comes from when both `level` and `RUST_LOG` exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LevelSource {
    /// An explicit CLI flag: `level` wins, `RUST_LOG` is the fallback.
    Cli,
    /// Config file or env override: `RUST_LOG` wins, `level` is the fallback.
    Config,
}

/// Initialise the global tracing subscriber.
///
/// `level` accepts anything [`EnvFilter`] understands, from a bare
/// `"debug"` to `"contact_identity=trace,axum=info"`. Output goes to stderr
/// unless `log_file` is set, in which case lines are appended to that file.
pub fn init(level: &str, source: LevelSource, log_file: Option<&Path>) -> Result<(), AppError> {
    let filter = build_filter(level, source)?;

    let writer = match log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| {
                    AppError::Logger(format!("failed to open log file '{}': {e}", path.display()))
                })?;
            BoxMakeWriter::new(file)
        }
        None => BoxMakeWriter::new(std::io::stderr),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(log_file.is_none())
        .try_init()
        .map_err(|e| AppError::Logger(format!("failed to set subscriber: {e}")))
}

fn build_filter(level: &str, source: LevelSource) -> Result<EnvFilter, AppError> {
    match source {
        LevelSource::Cli => EnvFilter::try_new(level).or_else(|level_err| {
            EnvFilter::try_from_default_env().map_err(|env_err| {
                AppError::Logger(format!(
                    "invalid log level '{level}': {level_err}; RUST_LOG parse failed: {env_err}"
                ))
            })
        }),
        LevelSource::Config => EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(level))
            .map_err(|e| AppError::Logger(format!("invalid log level '{level}': {e}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_levels_build() {
        for l in &["error", "warn", "info", "debug", "trace", "off"] {
            assert!(build_filter(l, LevelSource::Cli).is_ok(), "expected '{l}' to be valid");
        }
    }

    #[test]
    fn malformed_directive_errors_under_config_source() {
        // RUST_LOG is unset in the test environment, so the level is the only candidate.
        if std::env::var_os("RUST_LOG").is_none() {
            assert!(build_filter("contact_identity=verbose", LevelSource::Config).is_err());
        }
    }

    #[test]
    fn cli_filter_accepts_directives() {
        assert!(build_filter("contact_identity=debug,axum=warn", LevelSource::Cli).is_ok());
    }

    #[test]
    fn init_succeeds_or_already_init() {
        // Another test in this process may have installed a subscriber first.
        match init("info", LevelSource::Config, None) {
            Ok(()) => {}
            Err(AppError::Logger(msg)) if msg.contains("set subscriber") => {}
            Err(e) => panic!("unexpected error: {e}"),
        }
    }
}
