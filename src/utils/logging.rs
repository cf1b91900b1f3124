//! Logger bootstrap plus conditional logging macros gated on a module-level
//! `ENABLE_LOGS` flag.
//!
//! Usage:
//! ```ignore
//! // In your module, define the flag first:
//! const ENABLE_LOGS: bool = true;
//!
//! // Then use the macros (they're exported at the crate root):
//! use crate::{log_debug, log_info, log_warn};
//!
//! log_warn!("topic label {label:?} collides with {kept:?}");
//! ```

use log::LevelFilter;

/// Install `env_logger` as the `log` backend.
///
/// Reads `RUST_LOG`, falls back to `Info`. Calling it more than once (tests,
/// embedding hosts that already installed a logger) is harmless.
pub fn init() {
    // Directives from `RUST_LOG` are parsed after the default so they win.
    let result = env_logger::Builder::new()
        .filter_level(LevelFilter::Info)
        .parse_default_env()
        .try_init();

    if result.is_ok() {
        log::info!("abcd-engine logging initialised");
    }
}

/// Conditional debug logging, checks `ENABLE_LOGS` in the calling module.
#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::debug!($($arg)*);
        }
    };
}

/// Conditional info logging, checks `ENABLE_LOGS` in the calling module.
#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::info!($($arg)*);
        }
    };
}

/// Conditional warn logging. Data-quality warnings go through here.
#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::warn!($($arg)*);
        }
    };
}

/// Conditional error logging, checks `ENABLE_LOGS` in the calling module.
#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::error!($($arg)*);
        }
    };
}
