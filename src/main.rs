//! Contact identity service — entry point.
//!
//! Startup sequence:
//!   1. Load .env (if present)
//!   2. Load config (file, then env overrides)
//!   3. Resolve effective log level (CLI `-v` flags > RUST_LOG > config)
//!   4. Init logger once
//!   5. Open the contact store
//!   6. Spawn Ctrl-C → shutdown signal watcher
//!   7. Serve HTTP until shutdown

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::info;

use contact_identity::bootstrap::logger::{self, LevelSource};
use contact_identity::config;
use contact_identity::error::AppError;
use contact_identity::subsystems::comms;
use contact_identity::subsystems::identity::ConsolidationEngine;
use contact_identity::subsystems::store::AnyStore;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), AppError> {
    // .env is optional.
    let _ = dotenvy::dotenv();

    let args = parse_cli_args();

    let config = config::load(args.config_path.as_deref())?;

    let (effective_log_level, source) = match args.log_level {
        Some(level) => (level, LevelSource::Cli),
        None => (config.log_level.as_str(), LevelSource::Config),
    };
    logger::init(effective_log_level, source, config.log_file.as_deref())?;

    info!(
        service = %config.service_name,
        bind = %config.server.bind,
        backend = %config.store.backend,
        configured_log_level = %config.log_level,
        effective_log_level = %effective_log_level,
        "config loaded"
    );

    let store = AnyStore::open(&config.store)?;
    let engine = Arc::new(ConsolidationEngine::new(store));

    let shutdown = CancellationToken::new();

    let ctrlc_token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("ctrl-c received — initiating shutdown");
            ctrlc_token.cancel();
        }
    });

    comms::serve(&config.server.bind, engine, shutdown).await
}

struct CliArgs {
    /// Level forced by `-v` flags; `None` defers to RUST_LOG / config.
    log_level: Option<&'static str>,
    config_path: Option<String>,
}

fn parse_cli_args() -> CliArgs {
    let mut verbosity = 0u8;
    let mut args = CliArgs {
        log_level: None,
        config_path: None,
    };

    let mut argv = std::env::args().skip(1);
    while let Some(arg) = argv.next() {
        match arg.as_str() {
            "--" => break,
            "-h" | "--help" => {
                print_usage();
                std::process::exit(0);
            }
            "-f" | "--config" => match argv.next() {
                Some(path) => args.config_path = Some(path),
                None => {
                    eprintln!("error: {arg} needs a path");
                    std::process::exit(1);
                }
            },
            "--verbose" => verbosity = verbosity.saturating_add(1),
            flag => {
                let vs = flag
                    .strip_prefix('-')
                    .filter(|v| !v.is_empty() && v.bytes().all(|b| b == b'v'));
                if let Some(vs) = vs {
                    verbosity = verbosity.saturating_add(vs.len().min(u8::MAX as usize) as u8);
                }
            }
        }
    }

    //   -v      → warn
    //   -vv     → info
    //   -vvv    → debug  (closure sizes, relinks)
    //   -vvvv+  → trace
    args.log_level = match verbosity {
        0 => None,
        1 => Some("warn"),
        2 => Some("info"),
        3 => Some("debug"),
        _ => Some("trace"),
    };
    args
}

fn print_usage() {
    println!("Usage: contact-identity [OPTIONS]");
    println!();
    println!("Options:");
    println!("  -f, --config <PATH>   TOML config (default: config/default.toml)");
    println!("  -v ... -vvvv          Raise log verbosity (warn, info, debug, trace)");
    println!("  -h, --help            Show this help");
    println!();
    println!("Environment: PORT, CONTACT_IDENTITY_DB, CONTACT_IDENTITY_LOG_LEVEL, RUST_LOG");
}
