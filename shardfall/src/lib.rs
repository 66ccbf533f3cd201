pub mod auth;
pub mod loot;
pub mod token;

/// Error type surfaced by storage backends to the core engines.
pub type StoreError = Box<dyn std::error::Error + Send + Sync>;
