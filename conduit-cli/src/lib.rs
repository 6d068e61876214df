//! The binary's supporting modules, split out so they're unit-testable
//! without spawning the real listeners.

pub mod config;
pub mod logging;

pub use config::{CliArgs, Config};
