//! Logging setup
//!
//! The crate only talks to the `log` facade. Binaries and tests that want
//! output call `init_logging` once; repeated calls are harmless.

use log::LevelFilter;

/// Initialise env_logger. `RUST_LOG` wins over `default_filter` when set.
pub fn init_logging(default_filter: Option<&str>) {
    let mut builder = env_logger::Builder::new();
    builder.filter_level(LevelFilter::Info);

    if let Some(filter) = default_filter {
        builder.parse_filters(filter);
    }
    if let Ok(env_filter) = std::env::var("RUST_LOG") {
        builder.parse_filters(&env_filter);
    }

    if builder.try_init().is_err() {
        log::debug!("[logging::init_logging] Logger already initialised");
    }
}

/// Logger for unit tests: captured by the test harness, warnings and above
pub fn init_test_logging() {
    let _ = env_logger::builder()
        .is_test(true)
        .filter_level(LevelFilter::Warn)
        .try_init();
}
