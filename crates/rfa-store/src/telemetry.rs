//! Tracing setup for hosts and tests.
//!
//! The crate only emits `tracing` events; nothing is printed until a host
//! installs a subscriber, e.g. with [`init_tracing`].

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Install a global subscriber filtered by `RUST_LOG`, else `level`.
///
/// `json` switches to newline-delimited JSON, which keeps the `event` fields
/// from [`crate::obs`] machine-readable. Only the first call takes effect.
pub fn init_tracing(json: bool, level: Level) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));

    let registry = tracing_subscriber::registry().with(env_filter);
    let installed = if json {
        registry.with(fmt::layer().with_target(false).json()).try_init()
    } else {
        registry.with(fmt::layer().with_target(false)).try_init()
    };
    installed.ok();
}

/// `RFA_LOG_JSON=1` selects JSON output; the level defaults to `info`.
pub fn init_tracing_from_env() {
    let json = std::env::var("RFA_LOG_JSON")
        .map(|v| matches!(v.as_str(), "1" | "true"))
        .unwrap_or(false);
    init_tracing(json, Level::INFO);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_init_is_ignored() {
        init_tracing(false, Level::WARN);
        init_tracing(true, Level::DEBUG);
        tracing::warn!("still logging after a repeated init");
    }
}
