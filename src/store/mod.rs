//! Persistence layer: libSQL-backed storage for users and organizer entities.

pub mod libsql_backend;
pub mod migrations;
pub mod organizer;
pub mod traits;

pub use libsql_backend::LibSqlBackend;
pub use traits::{Catalog, Database};
