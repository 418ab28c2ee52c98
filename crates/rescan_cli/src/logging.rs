//! Tracing subscriber setup for the `rescan` binary.

use std::io;

use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::GlobalArgs;

/// Environment variable holding a filter directive that overrides everything else.
pub const LOG_ENV: &str = "RESCAN_LOG";

/// Picks the filter directive: `RESCAN_LOG`, then `--verbose`/`--quiet`,
/// then the `[log] level` from `rescan.toml`.
pub fn filter_directive(global: &GlobalArgs, config_level: &str, env: Option<String>) -> String {
    if let Some(env) = env.map(|v| v.trim().to_string()).filter(|v| !v.is_empty()) {
        return env;
    }
    if global.verbose {
        "debug".to_string()
    } else if global.quiet {
        "error".to_string()
    } else {
        config_level.to_string()
    }
}

/// Installs a stderr fmt subscriber. A bad directive falls back to `warn`.
pub fn init(global: &GlobalArgs, config_level: &str) {
    let directive = filter_directive(global, config_level, std::env::var(LOG_ENV).ok());
    let filter = EnvFilter::try_new(&directive).unwrap_or_else(|_| EnvFilter::new("warn"));

    let layer = tracing_subscriber::fmt::layer()
        .with_writer(io::stderr)
        .with_ansi(global.color)
        .with_target(true);

    // A subscriber may already be set when running under a test harness.
    let _ = tracing_subscriber::registry().with(filter).with(layer).try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn global(quiet: bool, verbose: bool) -> GlobalArgs {
        GlobalArgs {
            quiet,
            verbose,
            color: false,
            config: None,
        }
    }

    #[test]
    fn env_wins() {
        let directive = filter_directive(
            &global(true, true),
            "warn",
            Some("rescan.cache=trace".into()),
        );
        assert_eq!(directive, "rescan.cache=trace");
    }

    #[test]
    fn blank_env_is_ignored() {
        assert_eq!(
            filter_directive(&global(false, false), "info", Some("  ".into())),
            "info"
        );
    }

    #[test]
    fn flags_beat_config() {
        assert_eq!(filter_directive(&global(false, true), "warn", None), "debug");
        assert_eq!(filter_directive(&global(true, false), "warn", None), "error");
    }

    #[test]
    fn config_level_is_the_fallback() {
        assert_eq!(
            filter_directive(&global(false, false), "rescan=info", None),
            "rescan=info"
        );
    }
}
