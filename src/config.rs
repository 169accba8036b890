// Runtime configuration loaded from the environment (and `.env`, if present).

use crate::core::rate_limit::{RateLimitConfig, RateLimitPolicies, ADMIN_ACTION, CONTENT_SUBMISSION};
use std::net::SocketAddr;

const DEFAULT_DATABASE_URL: &str = "data/moderation.db";
const DEFAULT_BIND_ADDR: &str = "127.0.0.1:3000";
const DEFAULT_CLEANUP_SECS: u64 = 300;

/// Env vars holding per-action rate limits, formatted `max/window_secs[/fixed|sliding][/open|closed]`.
const RATE_LIMIT_VARS: [(&str, &str); 2] = [
    ("RATE_LIMIT_ADMIN_ACTION", ADMIN_ACTION),
    ("RATE_LIMIT_CONTENT_SUBMISSION", CONTENT_SUBMISSION),
];

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub bind_addr: SocketAddr,
    pub cleanup_interval_secs: u64,
    pub rate_limits: RateLimitPolicies,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from any key lookup, so tests don't have to touch the process env.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let database_url =
            lookup("DATABASE_URL").unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string());

        let bind_addr = lookup("BIND_ADDR")
            .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string())
            .parse::<SocketAddr>()
            .map_err(|e| anyhow::anyhow!("Invalid BIND_ADDR: {}", e))?;

        let cleanup_interval_secs = lookup("RATE_LIMIT_CLEANUP_SECS")
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|secs| *secs > 0)
            .unwrap_or(DEFAULT_CLEANUP_SECS);

        let mut rate_limits = RateLimitPolicies::default();
        if let Some(config) = parse_rate_limit(&lookup, "RATE_LIMIT_DEFAULT") {
            rate_limits.default = config;
        }
        for (var, action) in RATE_LIMIT_VARS {
            if let Some(config) = parse_rate_limit(&lookup, var) {
                rate_limits.per_action.insert(action.to_string(), config);
            }
        }

        Ok(Self {
            database_url,
            bind_addr,
            cleanup_interval_secs,
            rate_limits,
        })
    }
}

/// Invalid values are logged and ignored so the built-in default stays in effect.
fn parse_rate_limit(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &str,
) -> Option<RateLimitConfig> {
    let raw = lookup(var)?;
    match raw.parse::<RateLimitConfig>() {
        Ok(config) => Some(config),
        Err(e) => {
            tracing::warn!("Ignoring {}: {}", var, e);
            None
        }
    }
}
