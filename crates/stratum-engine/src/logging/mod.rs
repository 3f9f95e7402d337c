//! Logging setup.
//!
//! The crate logs through the `log` facade; binaries call [`init_logging`]
//! once to install `env_logger`.

mod init;

pub use init::{DEFAULT_FILTER, LoggingConfig, init_logging};
