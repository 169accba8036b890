// Core rate limiting module - per-user, per-action throttling.

pub mod rate_limit_models;
pub mod rate_limit_service;

pub use rate_limit_models::*;
pub use rate_limit_service::*;
