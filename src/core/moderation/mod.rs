// Core moderation module - keyword/regex rule matching and the review queue.
// Following the same pattern as the rate_limit module.

pub mod moderation_models;
pub mod moderation_service;
pub mod rule_matcher;

pub use moderation_models::*;
pub use moderation_service::*;
pub use rule_matcher::{evaluate, RuleMatcher};
