pub mod init;
pub mod models;
pub mod queries;
pub mod schema;

pub use init::{DbError, DbPool};
pub use models::*;
pub use queries::*;
