pub mod cache;
pub mod collector;
pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod junction;
pub mod llm;
pub mod matcher;
pub mod merge;
pub mod naming;
pub mod schema;
pub mod semantic;
pub mod service;
pub mod suggestion;
pub mod types;

pub use collector::{DataSource, SchemaCollector};
pub use engine::{InferenceOptions, JoinInferenceEngine};
pub use error::{ModelerError, Result};
pub use schema::{ColumnSchema, ForeignKeySchema, TableSchema};
pub use service::InferenceService;
pub use suggestion::{ConfidenceLevel, InferredJoin, JoinType};
