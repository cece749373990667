use env_logger::Env;

/// Initializes the global logger.
///
/// `RUST_LOG` wins over `default_level` when set. Calling this twice is harmless;
/// the second call is ignored.
pub fn init_logger(default_level: &str) {
    let _ = env_logger::Builder::from_env(Env::default().default_filter_or(default_level))
        .format_timestamp_millis()
        .try_init();
}
