// SQLite persistence for moderation rules and the review queue.

pub mod sqlite_moderation_store;

pub use sqlite_moderation_store::SqliteModerationStore;
