//! Library entry point for coach-cli components.
//!
//! Exposes configuration, logging and the watch loop so integration tests can
//! drive them without going through the binary entry point.

pub mod config;
pub mod error;
pub mod logging;
pub mod watch;

pub use config::CLIConfiguration;
pub use error::{CLIError, Result};
pub use logging::{init_logging, LogFormat};
pub use watch::{run_watch, ClientSettings, EventPrinter, Overrides, WatchLine};
