//! Shardfall backend: REST gateway, SQLite persistence and the store
//! implementations behind the core loot/join-token engines.

pub mod config;
pub mod db;
pub mod handlers;
pub mod store;
pub mod tls;
