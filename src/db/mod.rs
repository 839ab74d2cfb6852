//! PostgreSQL access for the data modeler
//!
//! Pool setup and the `table_metadata` lookup that supplies logical
//! (human-entered) table names.

pub mod connection;
pub mod table_metadata;

pub use connection::{init_pool, DbPool};
pub use table_metadata::{LogicalNameStore, NoLogicalNames, TableMetadataRepository};
