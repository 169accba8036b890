// SQLite persistence for rate limit counters.

pub mod sqlite_rate_limit_store;

pub use sqlite_rate_limit_store::SqliteRateLimitStore;
