// Library root — the binary in src/main.rs and the integration tests build on it.

pub mod bootstrap;
pub mod core;
pub mod subsystems;

pub use crate::core::{config, error};
