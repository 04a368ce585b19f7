//! Run configuration and the closed selectors it is built from.

use crate::policy::PolicyError;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Default job label
pub const DEFAULT_JOB_LABEL: &str = "create-tfrecords";

/// Configuration parse errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// Unknown compression name
    #[error("Compression {name} is not supported, expected gzip or none")]
    UnsupportedCompression {
        /// Name as given
        name: String,
    },

    /// Unparseable header specification
    #[error("Invalid header specification `{value}`, expected first-row, none or a row number")]
    InvalidHeader {
        /// Specification as given
        value: String,
    },
}

/// Execution backend
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Runner {
    /// In-process execution
    #[default]
    Local,
    /// Distributed cloud execution
    Distributed,
}

impl Runner {
    /// Canonical runner name
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Local => "DirectRunner",
            Self::Distributed => "DataflowRunner",
        }
    }
}

impl fmt::Display for Runner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Runner {
    type Err = PolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "directrunner" | "direct" | "local" => Ok(Self::Local),
            "dataflowrunner" | "dataflow" | "distributed" => Ok(Self::Distributed),
            _ => Err(PolicyError::UnsupportedRunner { name: s.to_string() }),
        }
    }
}

/// Output compression
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Compression {
    /// Gzip the whole output file
    #[default]
    Gzip,
    /// Plain record files
    None,
}

impl Compression {
    /// Output file suffix
    #[must_use]
    pub const fn file_suffix(&self) -> &'static str {
        match self {
            Self::Gzip => ".tfrecord.gz",
            Self::None => ".tfrecord",
        }
    }
}

impl fmt::Display for Compression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Gzip => f.write_str("gzip"),
            Self::None => f.write_str("none"),
        }
    }
}

impl FromStr for Compression {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gzip" | "gz" => Ok(Self::Gzip),
            "none" | "uncompressed" | "" => Ok(Self::None),
            _ => Err(ConfigError::UnsupportedCompression { name: s.to_string() }),
        }
    }
}

/// How column names are found when reading a delimited file.
///
/// For in-memory tables only `Names` matters: it projects the table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum HeaderSpec {
    /// The first record is the header
    #[default]
    FromFirstRow,
    /// Record `n` is the header, earlier records are skipped
    Row(usize),
    /// No header, columns are `image_uri, label, split`
    NoHeader,
    /// No header, columns are the given names
    Names(Vec<String>),
}

impl FromStr for HeaderSpec {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "infer" | "first-row" | "first_row" => Ok(Self::FromFirstRow),
            "none" | "no-header" => Ok(Self::NoHeader),
            other => other
                .parse::<usize>()
                .map(Self::Row)
                .map_err(|_| ConfigError::InvalidHeader { value: s.to_string() }),
        }
    }
}

/// Everything a pipeline builder needs to know about one invocation.
///
/// Built once, after validation, and only ever lent out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    /// Local directory or remote prefix for the record files
    pub output_dir: String,
    /// Execution backend
    pub runner: Runner,
    /// Cloud project (distributed runner)
    pub project: Option<String>,
    /// Cloud region (distributed runner)
    pub region: Option<String>,
    /// Backend specific options, passed through untouched
    pub backend_options: IndexMap<String, serde_json::Value>,
    /// Human readable job label
    pub job_label: String,
    /// Output compression
    pub compression: Compression,
    /// Number of output files per split, 0 lets the backend decide
    pub num_shards: u32,
    /// Whether the label column holds integers.
    ///
    /// Inferred from the table; builders use it to pick the label encoding.
    pub integer_label: bool,
}

impl RunConfig {
    /// Number of files each split is written to
    #[must_use]
    pub const fn shards_per_split(&self) -> u32 {
        if self.num_shards == 0 { 1 } else { self.num_shards }
    }
}
