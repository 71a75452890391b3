//! Logging setup using `tracing` + `tracing-subscriber`.
//!
//! `RUNE_WATCHDOG_LOG` takes precedence when set (any `EnvFilter`
//! directive, e.g. `rune_watchdog=debug`). Otherwise the `--debug` flag
//! selects between `debug` and `info`.

use tracing_subscriber::EnvFilter;

/// Environment variable holding a log filter directive
pub const LOG_ENV: &str = "RUNE_WATCHDOG_LOG";

/// Build the filter used by [`init_logging`]
pub fn env_filter(debug: bool) -> EnvFilter {
    match std::env::var(LOG_ENV) {
        Ok(directive) if !directive.trim().is_empty() => EnvFilter::new(directive),
        _ if debug => EnvFilter::new("debug"),
        _ => EnvFilter::new("info"),
    }
}

/// Install the global subscriber. Logs go to stderr so stdout stays
/// usable for command output.
pub fn init_logging(debug: bool) {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter(debug))
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}
