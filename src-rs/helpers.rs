use std::env;
use std::time::Duration;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::ClientConfig;

pub const ENV_BASE_URL: &str = "TRADING_TASKS_URL";
pub const ENV_POLL_SECS: &str = "TRADING_TASKS_POLL_SECS";
pub const ENV_TIMEOUT_SECS: &str = "TRADING_TASKS_TIMEOUT_SECS";

/// Reads `TRADING_TASKS_*` variables on top of the defaults.
pub fn load_client_config() -> ClientConfig {
    config_from_lookup(|key| env::var(key).ok())
}

pub fn config_from_lookup<F>(lookup: F) -> ClientConfig
where
    F: Fn(&str) -> Option<String>,
{
    let defaults = ClientConfig::default();
    let value = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

    ClientConfig {
        base_url: value(ENV_BASE_URL).unwrap_or(defaults.base_url),
        poll_interval: value(ENV_POLL_SECS)
            .and_then(|raw| parse_secs(&raw))
            .unwrap_or(defaults.poll_interval),
        request_timeout: value(ENV_TIMEOUT_SECS)
            .and_then(|raw| parse_secs(&raw))
            .unwrap_or(defaults.request_timeout),
    }
}

fn parse_secs(raw: &str) -> Option<Duration> {
    match raw.parse::<u64>() {
        Ok(0) | Err(_) => None,
        Ok(secs) => Some(Duration::from_secs(secs)),
    }
}

/// Installs the global subscriber. `RUST_LOG` wins over `default_filter`.
/// Output goes to stderr so it never mixes with rendered results.
pub fn init_tracing(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into());
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init();
}
