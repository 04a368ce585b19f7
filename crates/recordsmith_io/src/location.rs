//! Local paths and remote object URIs.

use crate::storage::StorageError;
use std::fmt;
use std::path::PathBuf;
use url::Url;

/// Where bytes live
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Location {
    /// Local filesystem path
    Local(PathBuf),
    /// Object store URI (`gs://` or `s3://`)
    Remote(Url),
}

impl Location {
    /// Parse a path or URI.
    ///
    /// Plain paths and `file://` URIs are local, `gs://` and `s3://` URIs
    /// are remote.
    ///
    /// # Errors
    ///
    /// Returns error if the URI is malformed or uses another scheme
    pub fn parse(s: &str) -> Result<Self, StorageError> {
        if !s.contains("://") {
            return Ok(Self::Local(PathBuf::from(s)));
        }

        let url = Url::parse(s).map_err(|e| StorageError::InvalidLocation {
            location: s.to_string(),
            reason: e.to_string(),
        })?;

        match url.scheme() {
            "file" => url
                .to_file_path()
                .map(Self::Local)
                .map_err(|()| StorageError::InvalidLocation {
                    location: s.to_string(),
                    reason: "not a valid file path".to_string(),
                }),
            "gs" | "s3" => {
                if url.host_str().is_none_or(str::is_empty) {
                    return Err(StorageError::InvalidLocation {
                        location: s.to_string(),
                        reason: "missing bucket".to_string(),
                    });
                }
                Ok(Self::Remote(url))
            }
            other => Err(StorageError::UnsupportedScheme {
                scheme: other.to_string(),
            }),
        }
    }

    /// Whether the location names a directory.
    ///
    /// Local paths are checked on disk. Object stores have no directories, so
    /// a remote URI counts as one when it ends with `/`.
    #[must_use]
    pub fn is_directory(&self) -> bool {
        match self {
            Self::Local(path) => path.is_dir(),
            Self::Remote(url) => url.path().ends_with('/'),
        }
    }

    /// Location of `name` inside this location
    ///
    /// # Errors
    ///
    /// Returns error if `name` does not form a valid URI
    pub fn join(&self, name: &str) -> Result<Self, StorageError> {
        match self {
            Self::Local(path) => Ok(Self::Local(path.join(name))),
            Self::Remote(url) => {
                let mut base = url.clone();
                if !base.path().ends_with('/') {
                    let dir = format!("{}/", base.path());
                    base.set_path(&dir);
                }
                base.join(name)
                    .map(Self::Remote)
                    .map_err(|e| StorageError::InvalidLocation {
                        location: format!("{}{}", base, name),
                        reason: e.to_string(),
                    })
            }
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local(path) => write!(f, "{}", path.display()),
            Self::Remote(url) => write!(f, "{}", url),
        }
    }
}
