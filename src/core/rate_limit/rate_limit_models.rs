// Rate limit domain models - per-action policies, counters and decisions.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Action categories the platform throttles.
pub const ADMIN_ACTION: &str = "admin_action";
pub const CONTENT_SUBMISSION: &str = "content_submission";

/// Longest window a policy may use (one year).
pub const MAX_WINDOW_SECS: u64 = 365 * 24 * 60 * 60;

/// How actions are counted over time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WindowKind {
    /// Counter resets at epoch-aligned window boundaries
    Fixed,
    /// Counts every action in the trailing window
    Sliding,
}

/// What to do when the counter store can't be reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreFailurePolicy {
    FailOpen,
    FailClosed,
}

/// Throttling policy for one action category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Actions allowed per window
    pub max_actions: u32,
    /// Window length in seconds, clamped to `1..=MAX_WINDOW_SECS`
    pub window_secs: u64,
    pub window: WindowKind,
    pub on_store_failure: StoreFailurePolicy,
}

impl RateLimitConfig {
    pub fn new(max_actions: u32, window_secs: u64) -> Self {
        Self {
            max_actions,
            window_secs,
            window: WindowKind::Fixed,
            on_store_failure: StoreFailurePolicy::FailOpen,
        }
    }

    pub fn sliding(mut self) -> Self {
        self.window = WindowKind::Sliding;
        self
    }

    pub fn fail_closed(mut self) -> Self {
        self.on_store_failure = StoreFailurePolicy::FailClosed;
        self
    }

    pub fn window_duration(&self) -> Duration {
        Duration::seconds(self.window_secs.clamp(1, MAX_WINDOW_SECS) as i64)
    }

    /// Start of the fixed window containing `now`, aligned to the Unix epoch.
    pub fn window_start(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let window_ms = self.window_duration().num_milliseconds();
        let start_ms = now.timestamp_millis().div_euclid(window_ms) * window_ms;
        DateTime::from_timestamp_millis(start_ms).unwrap_or(now)
    }
}

#[derive(Debug, thiserror::Error, PartialEq)]
#[error("invalid rate limit '{0}', expected max/window_secs[/fixed|sliding][/open|closed]")]
pub struct ParseRateLimitError(String);

/// Parses `max/window_secs[/fixed|sliding][/open|closed]`, e.g. `30/60/fixed/closed`.
impl FromStr for RateLimitConfig {
    type Err = ParseRateLimitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseRateLimitError(s.to_string());
        let mut parts = s.split('/').map(str::trim);

        let max_actions = parts
            .next()
            .and_then(|p| p.parse::<u32>().ok())
            .ok_or_else(err)?;
        let window_secs = parts
            .next()
            .and_then(|p| p.parse::<u64>().ok())
            .filter(|secs| (1..=MAX_WINDOW_SECS).contains(secs))
            .ok_or_else(err)?;

        let mut config = RateLimitConfig::new(max_actions, window_secs);
        for part in parts {
            match part.to_ascii_lowercase().as_str() {
                "fixed" => config.window = WindowKind::Fixed,
                "sliding" => config.window = WindowKind::Sliding,
                "open" => config.on_store_failure = StoreFailurePolicy::FailOpen,
                "closed" => config.on_store_failure = StoreFailurePolicy::FailClosed,
                _ => return Err(err()),
            }
        }

        Ok(config)
    }
}

/// Rate limit policies keyed by action category.
#[derive(Debug, Clone, PartialEq)]
pub struct RateLimitPolicies {
    /// Used for any action without its own entry
    pub default: RateLimitConfig,
    pub per_action: HashMap<String, RateLimitConfig>,
}

impl RateLimitPolicies {
    pub fn new(default: RateLimitConfig) -> Self {
        Self {
            default,
            per_action: HashMap::new(),
        }
    }

    pub fn with_action(mut self, action: impl Into<String>, config: RateLimitConfig) -> Self {
        self.per_action.insert(action.into(), config);
        self
    }

    pub fn for_action(&self, action: &str) -> &RateLimitConfig {
        self.per_action.get(action).unwrap_or(&self.default)
    }

    /// Longest window across all policies, used for record cleanup.
    pub fn longest_window(&self) -> Duration {
        self.per_action
            .values()
            .map(RateLimitConfig::window_duration)
            .fold(self.default.window_duration(), |a, b| a.max(b))
    }
}

impl Default for RateLimitPolicies {
    fn default() -> Self {
        RateLimitPolicies::new(RateLimitConfig::new(60, 60))
            .with_action(ADMIN_ACTION, RateLimitConfig::new(30, 60).fail_closed())
            .with_action(CONTENT_SUBMISSION, RateLimitConfig::new(10, 60).sliding())
    }
}

/// A (user, action) counter for the current fixed window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateLimitRecord {
    pub user_id: String,
    pub action: String,
    pub window_start: DateTime<Utc>,
    pub count: u32,
}

impl RateLimitRecord {
    pub fn reset_time(&self, window: Duration) -> DateTime<Utc> {
        self.window_start + window
    }
}

/// Outcome of an atomic sliding-window admission attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct SlidingAdmission {
    /// Whether the hit was recorded
    pub allowed: bool,
    /// Hits inside the window after the attempt, oldest first
    pub hits: Vec<DateTime<Utc>>,
}

/// Outcome of a rate limit check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub reset_time: DateTime<Utc>,
    pub limit: u32,
    pub remaining: u32,
}

impl RateLimitDecision {
    /// Whole seconds until `reset_time`, rounded up and never below 1.
    pub fn retry_after_secs(&self, now: DateTime<Utc>) -> u64 {
        let millis = (self.reset_time - now).num_milliseconds().max(0) as u64;
        millis.div_ceil(1000).max(1)
    }
}

impl fmt::Display for RateLimitDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}/{} remaining, resets {})",
            if self.allowed { "allowed" } else { "denied" },
            self.remaining,
            self.limit,
            self.reset_time.to_rfc3339()
        )
    }
}
