//! Log output for `civibuild-check` runs.
//!
//! Logs go to stderr so stdout stays free for the `PASS` line and the
//! `--report-json` report. The `check.*` and `instance.*` events from
//! [`crate::obs`] come out as plain text, or as one JSON object per line
//! for CI log collectors.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Route check events to stderr.
///
/// `RUST_LOG` wins over `level` when set. Only the first call in a process
/// takes effect, so the acceptance test and the binary can both call it.
pub fn init_tracing(json: bool, level: Level) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));

    if json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr).json())
            .try_init()
            .ok();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .try_init()
            .ok();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_tracing_twice_is_harmless() {
        init_tracing(false, Level::WARN);
        init_tracing(true, Level::DEBUG);
    }
}
