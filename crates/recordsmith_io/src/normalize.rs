//! Input normalization.
//!
//! Every input shape ends up as one `Table`: in-memory tables pass through
//! (optionally projected), delimited files are read through storage and
//! parsed, directories are reserved for image discovery.

use crate::delimited::{parse_delimited, CsvError};
use crate::location::Location;
use crate::storage::{Storage, StorageError};
use recordsmith_core::{HeaderSpec, Table, TableError};
use std::path::PathBuf;

/// Normalization errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NormalizeError {
    /// Input is not a table, a delimited file or a directory
    #[error("Unsupported input data: {kind} `{value}`")]
    UnsupportedInput {
        /// Input shape, see [`InputData::kind`]
        kind: &'static str,
        /// The input as given
        value: String,
    },

    /// Input shape that is planned but not built yet
    #[error("Not implemented: {feature} ({value})")]
    NotImplemented {
        /// Missing capability
        feature: &'static str,
        /// The input as given
        value: String,
    },

    /// Projection named an unknown column
    #[error(transparent)]
    Table(#[from] TableError),

    /// Delimited file could not be parsed
    #[error("Failed to parse {path}: {source}")]
    Csv {
        /// File being parsed
        path: String,
        /// Parse failure
        source: CsvError,
    },

    /// Delimited file could not be read
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Input accepted by [`to_table`]
#[derive(Debug, Clone, PartialEq)]
pub enum InputData {
    /// In-memory table
    Table(Table),
    /// Path or URI of a delimited file or an image directory
    Path(String),
}

impl InputData {
    /// Short name of the input shape
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Table(_) => "table",
            Self::Path(_) => "path",
        }
    }
}

impl From<Table> for InputData {
    fn from(table: Table) -> Self {
        Self::Table(table)
    }
}

impl From<&str> for InputData {
    fn from(path: &str) -> Self {
        Self::Path(path.to_string())
    }
}

impl From<String> for InputData {
    fn from(path: String) -> Self {
        Self::Path(path)
    }
}

impl From<PathBuf> for InputData {
    fn from(path: PathBuf) -> Self {
        Self::Path(path.display().to_string())
    }
}

/// Field delimiter for a recognized delimited file name
fn delimiter_for(path: &str) -> Option<u8> {
    let lower = path.to_ascii_lowercase();
    if lower.ends_with(".csv") {
        Some(b',')
    } else if lower.ends_with(".tsv") {
        Some(b'\t')
    } else {
        None
    }
}

/// Read a delimited file at a local path or object store URI.
///
/// `.tsv` files are tab separated, everything else comma separated.
///
/// # Errors
///
/// Returns error if the file cannot be read or parsed
pub fn read_csv(path: &str, header: &HeaderSpec) -> Result<Table, NormalizeError> {
    let location = Location::parse(path)?;
    tracing::debug!("Reading delimited file {} with header {:?}", location, header);

    let data = Storage::new()?.read(&location)?;
    let delimiter = delimiter_for(path).unwrap_or(b',');
    parse_delimited(&data, delimiter, header).map_err(|source| NormalizeError::Csv {
        path: path.to_string(),
        source,
    })
}

/// Convert `input` to a record table.
///
/// # Errors
///
/// Returns error if the input shape is unsupported or not implemented yet,
/// or if reading it fails
pub fn to_table(input: InputData, header: &HeaderSpec) -> Result<Table, NormalizeError> {
    let kind = input.kind();
    match input {
        InputData::Table(table) => match header {
            HeaderSpec::Names(names) => Ok(table.select(names)?),
            _ => Ok(table),
        },
        InputData::Path(path) if delimiter_for(&path).is_some() => read_csv(&path, header),
        InputData::Path(path) => {
            let is_directory = Location::parse(&path).is_ok_and(|l| l.is_directory());
            if is_directory {
                Err(NormalizeError::NotImplemented {
                    feature: "image directory input",
                    value: path,
                })
            } else {
                Err(NormalizeError::UnsupportedInput { kind, value: path })
            }
        }
    }
}
