//! Logging bootstrap.
//!
//! The engine itself only uses the `log` facade. Embedders and tests call
//! [`init_logger`] once to route records through `env_logger`.

use log::LevelFilter;

/// Initializes `env_logger`.
///
/// With `Some(level)` the level is forced; with `None` the `RUST_LOG`
/// environment variable decides, defaulting to `warn`. Calling this more than
/// once is harmless.
pub fn init_logger(level: Option<LevelFilter>) {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"));
    if let Some(level) = level {
        builder.filter_level(level);
    }
    builder.format_timestamp_millis();
    let _ = builder.is_test(cfg!(test)).try_init();
}
