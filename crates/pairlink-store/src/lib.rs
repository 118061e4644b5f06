pub mod connections;
pub mod database;
pub mod error;
pub mod row_helpers;
pub mod schema;

pub use connections::{ConnectionRepo, ConnectionRow};
pub use database::Database;
pub use error::StoreError;
