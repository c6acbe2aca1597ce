//! Logging setup
//!
//! The engine logs through the `log` facade; binaries pick the sink.

pub use log::{debug, error, info, trace, warn, LevelFilter};

/// Initialize `env_logger`, honouring `RUST_LOG`
pub fn init() {
    env_logger::init();
}

/// Initialize `env_logger` with a default level that `RUST_LOG` can override
///
/// Safe to call more than once; later calls are ignored.
pub fn init_with_level(level: LevelFilter) {
    let _ = env_logger::Builder::from_default_env()
        .filter_level(level)
        .parse_default_env()
        .try_init();
}

/// Logger for unit tests, captured by the test harness
#[cfg(test)]
pub(crate) fn init_test_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}
