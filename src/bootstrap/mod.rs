//! Bootstrap layer — runs before the store and server start.
//!
//! - **logger** — tracing-subscriber initialisation.

pub mod logger;
