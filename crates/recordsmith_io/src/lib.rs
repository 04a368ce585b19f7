//! recordsmith I/O
//!
//! Turns the different input shapes into one record table, and reads and
//! writes bytes at local paths and remote object store URIs alike.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod delimited;
pub mod location;
pub mod normalize;
pub mod storage;

pub use delimited::{parse_delimited, CsvError};
pub use location::Location;
pub use normalize::{read_csv, to_table, InputData, NormalizeError};
pub use storage::{ObjectWriter, Storage, StorageError};
