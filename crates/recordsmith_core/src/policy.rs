//! Runner policy check.
//!
//! Distributed workers cannot resolve local filesystem paths, and cloud job
//! submission needs an explicit project and region. Both are checked here,
//! before any work is submitted.

use crate::config::Runner;
use crate::schema::IMAGE_URI_KEY;
use crate::table::{Table, Value};

/// URI scheme every image must use under the distributed runner
pub const REMOTE_SCHEME: &str = "gs://";

/// Runner misconfiguration
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PolicyError {
    /// The runner name is not one of the supported runners
    #[error("Runner {name} is not supported")]
    UnsupportedRunner {
        /// Runner name as given
        name: String,
    },

    /// An image is not remotely addressable
    #[error("{runner} requires gs:// image locations, row {row} is `{uri}`")]
    LocalImageLocation {
        /// Runner that needs remote images
        runner: Runner,
        /// Zero based row index
        row: usize,
        /// Offending image location
        uri: String,
    },

    /// Cloud project or region is missing
    #[error("{runner} requires a project and a region, project is {project:?} and region is {region:?}")]
    MissingCloudTarget {
        /// Runner that needs the target
        runner: Runner,
        /// Project as given
        project: Option<String>,
        /// Region as given
        region: Option<String>,
    },
}

fn is_remote(value: &Value) -> bool {
    value.as_str().is_some_and(|uri| uri.starts_with(REMOTE_SCHEME))
}

fn is_blank(value: Option<&str>) -> bool {
    value.is_none_or(|v| v.trim().is_empty())
}

/// Check that `table` can run on `runner`.
///
/// The table is expected to have passed the schema check.
///
/// # Errors
///
/// Returns error if the distributed runner is asked to read local images, or
/// is missing its project or region
pub fn validate(
    table: &Table,
    runner: Runner,
    project: Option<&str>,
    region: Option<&str>,
) -> Result<(), PolicyError> {
    match runner {
        Runner::Local => Ok(()),
        Runner::Distributed => {
            if let Some(uris) = table.column_values(IMAGE_URI_KEY) {
                if let Some((row, uri)) = uris.enumerate().find(|(_, v)| !is_remote(v)) {
                    return Err(PolicyError::LocalImageLocation {
                        runner,
                        row,
                        uri: uri.to_string(),
                    });
                }
            }

            if is_blank(project) || is_blank(region) {
                return Err(PolicyError::MissingCloudTarget {
                    runner,
                    project: project.map(str::to_string),
                    region: region.map(str::to_string),
                });
            }

            Ok(())
        }
    }
}
