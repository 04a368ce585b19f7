//! recordsmith core types
//!
//! This crate contains pure types and logic with no I/O: the in-memory
//! record table, its schema check, the runner policy check and the
//! immutable run configuration handed to pipeline builders.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod id;
pub mod policy;
pub mod schema;
pub mod table;

// Re-exports
pub use config::{Compression, ConfigError, HeaderSpec, RunConfig, Runner, DEFAULT_JOB_LABEL};
pub use id::RunId;
pub use policy::{PolicyError, REMOTE_SCHEME};
pub use schema::{SchemaError, IMAGE_CSV_COLUMNS, IMAGE_URI_KEY, LABEL_KEY, SPLIT_KEY};
pub use table::{DType, ImageRecord, Table, TableError, Value};
