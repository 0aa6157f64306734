//! Conditional logging macros gated by a module-level `ENABLE_LOGS` flag.
//!
//! Every record is tagged with the calling module's `LOG_TARGET`, so
//! `RUST_LOG=capture=debug` style filters work per subsystem.
//!
//! Usage:
//! ```ignore
//! const ENABLE_LOGS: bool = true;
//! const LOG_TARGET: &str = "capture";
//!
//! use crate::{log_info, log_warn, log_error};
//!
//! log_info!("segment {} recorded", 3);
//! ```

/// Conditional info logging under the module's `LOG_TARGET`.
#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::info!(target: LOG_TARGET, $($arg)*);
        }
    };
}

/// Conditional warn logging under the module's `LOG_TARGET`.
#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::warn!(target: LOG_TARGET, $($arg)*);
        }
    };
}

/// Conditional error logging under the module's `LOG_TARGET`.
///
/// Errors are never muted: `ENABLE_LOGS = false` only silences info and warn.
#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => {
        log::error!(target: LOG_TARGET, $($arg)*);
    };
}

/// Conditional debug logging under the module's `LOG_TARGET`.
#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::debug!(target: LOG_TARGET, $($arg)*);
        }
    };
}

/// Initialise the global logger. Reads `RUST_LOG`, defaulting to `info`,
/// and turns on `debug` when `debug` is set (see `DEEPLIE_DEBUG`).
pub fn init(debug: bool) {
    let default_level = if debug {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };

    let _ = env_logger::Builder::new()
        .filter_level(default_level)
        .parse_default_env()
        .format_timestamp_millis()
        .try_init();
}
