// Rate limiter - core business logic for per-user action throttling.
//
// Supports fixed windows (atomic counter upsert in the store) and sliding
// windows (conditional hit insert in the store). Store failures resolve through the policy's
// explicit fail-open / fail-closed setting.

use super::rate_limit_models::{
    RateLimitConfig, RateLimitDecision, RateLimitPolicies, RateLimitRecord, SlidingAdmission,
    StoreFailurePolicy, WindowKind,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, Error)]
pub enum RateLimitError {
    #[error("Storage error: {0}")]
    StorageError(String),
}

// ============================================================================
// STORAGE TRAIT (PORT)
// ============================================================================

/// Trait for persisting rate limit counters.
///
/// `increment_fixed_window` and `try_record_hit` must be atomic: concurrent
/// callers for the same key must never push a window past its limit.
#[async_trait]
pub trait RateLimitStore: Send + Sync {
    /// Bump the (user, action) counter for the window starting at
    /// `window_start`, resetting it to 1 when the stored window is older.
    async fn increment_fixed_window(
        &self,
        user_id: &str,
        action: &str,
        window_start: DateTime<Utc>,
    ) -> Result<RateLimitRecord, RateLimitError>;

    /// Record a hit at `at` only if fewer than `max_hits` hits land strictly
    /// after `since`. The count and the insert are one step.
    async fn try_record_hit(
        &self,
        user_id: &str,
        action: &str,
        since: DateTime<Utc>,
        max_hits: u32,
        at: DateTime<Utc>,
    ) -> Result<SlidingAdmission, RateLimitError>;

    /// Forget all counters and hits for (user, action).
    async fn reset(&self, user_id: &str, action: &str) -> Result<(), RateLimitError>;

    /// Delete stale records. Returns the number removed.
    async fn cleanup_old_records(&self, older_than: DateTime<Utc>) -> Result<u64, RateLimitError>;
}

// ============================================================================
// CORE SERVICE
// ============================================================================

pub struct RateLimiter<S: RateLimitStore> {
    store: S,
    policies: RateLimitPolicies,
}

impl<S: RateLimitStore> RateLimiter<S> {
    pub fn new(store: S, policies: RateLimitPolicies) -> Self {
        Self { store, policies }
    }

    /// Check (and count) an action for a user right now.
    pub async fn check_rate_limit(&self, user_id: &str, action: &str) -> RateLimitDecision {
        self.check_rate_limit_at(user_id, action, Utc::now()).await
    }

    /// Check (and count) an action for a user at a given instant.
    pub async fn check_rate_limit_at(
        &self,
        user_id: &str,
        action: &str,
        now: DateTime<Utc>,
    ) -> RateLimitDecision {
        let config = self.policies.for_action(action);

        let outcome = match config.window {
            WindowKind::Fixed => self.check_fixed(user_id, action, config, now).await,
            WindowKind::Sliding => self.check_sliding(user_id, action, config, now).await,
        };

        let decision = match outcome {
            Ok(decision) => decision,
            Err(e) => Self::store_unavailable(user_id, action, config, now, &e),
        };

        if !decision.allowed {
            tracing::info!(user_id, action, reset_time = %decision.reset_time, "Rate limit exceeded");
        }

        decision
    }

    async fn check_fixed(
        &self,
        user_id: &str,
        action: &str,
        config: &RateLimitConfig,
        now: DateTime<Utc>,
    ) -> Result<RateLimitDecision, RateLimitError> {
        let window_start = config.window_start(now);
        let record = self
            .store
            .increment_fixed_window(user_id, action, window_start)
            .await?;

        Ok(RateLimitDecision {
            allowed: record.count <= config.max_actions,
            reset_time: record.reset_time(config.window_duration()),
            limit: config.max_actions,
            remaining: config.max_actions.saturating_sub(record.count),
        })
    }

    async fn check_sliding(
        &self,
        user_id: &str,
        action: &str,
        config: &RateLimitConfig,
        now: DateTime<Utc>,
    ) -> Result<RateLimitDecision, RateLimitError> {
        let window = config.window_duration();
        let admission = self
            .store
            .try_record_hit(user_id, action, now - window, config.max_actions, now)
            .await?;
        let count = u32::try_from(admission.hits.len()).unwrap_or(u32::MAX);

        // The window frees a slot once the oldest counted hit ages out
        let oldest = admission.hits.first().copied().unwrap_or(now);

        Ok(RateLimitDecision {
            allowed: admission.allowed,
            reset_time: oldest + window,
            limit: config.max_actions,
            remaining: config.max_actions.saturating_sub(count),
        })
    }

    fn store_unavailable(
        user_id: &str,
        action: &str,
        config: &RateLimitConfig,
        now: DateTime<Utc>,
        error: &RateLimitError,
    ) -> RateLimitDecision {
        let allowed = match config.on_store_failure {
            StoreFailurePolicy::FailOpen => {
                tracing::warn!(user_id, action, error = %error, "Rate limit store unavailable, failing open");
                true
            }
            StoreFailurePolicy::FailClosed => {
                tracing::error!(user_id, action, error = %error, "Rate limit store unavailable, failing closed");
                false
            }
        };

        RateLimitDecision {
            allowed,
            reset_time: now + config.window_duration(),
            limit: config.max_actions,
            remaining: 0,
        }
    }

    /// Clear a user's counter for an action (admin override).
    pub async fn reset(&self, user_id: &str, action: &str) -> Result<(), RateLimitError> {
        self.store.reset(user_id, action).await?;
        tracing::info!(user_id, action, "Rate limit reset");
        Ok(())
    }

    /// Drop records older than the longest configured window.
    pub async fn cleanup(&self, now: DateTime<Utc>) -> Result<u64, RateLimitError> {
        let older_than = now - self.policies.longest_window();
        self.store.cleanup_old_records(older_than).await
    }
}

// ============================================================================
// TESTS
// ============================================================================
