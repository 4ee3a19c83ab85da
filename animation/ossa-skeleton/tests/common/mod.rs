//! Helpers shared by the integration tests

/// Route the crate's `log` output through the test harness. Safe to call
/// from every test; only the first call installs the logger.
pub fn init_logging() {
    let _ = env_logger::builder()
        .is_test(true)
        .filter_level(log::LevelFilter::Debug)
        .try_init();
}
