//! Logging utilities.
//!
//! Centralizes logger initialization. Library code only talks to the `log`
//! facade; binaries call [`init_logging`] once early in `main`.

mod init;

pub use init::{init_logging, LoggingConfig, DEFAULT_FILTER};
