// The infra module contains implementations of core traits.
// Each feature implementation goes in its own submodule.

#[path = "database.rs"]
pub mod database;

#[path = "moderation/mod.rs"]
pub mod moderation;

#[path = "rate_limit/mod.rs"]
pub mod rate_limit;
