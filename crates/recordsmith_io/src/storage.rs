//! Byte level access to local paths and object stores.
//!
//! Every call goes through `object_store`, so local files and `gs://` or
//! `s3://` objects are read and written the same way. The calls are
//! blocking: a [`Storage`] drives its own current-thread runtime, which
//! means it must not be used from inside another async runtime.

use crate::location::Location;
use bytes::Bytes;
use object_store::aws::AmazonS3Builder;
use object_store::buffered::BufWriter;
use object_store::gcp::GoogleCloudStorageBuilder;
use object_store::local::LocalFileSystem;
use object_store::path::Path as ObjectPath;
use object_store::{BackoffConfig, ObjectStore, RetryConfig};
use std::collections::HashMap;
use std::io::{self, Write};
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::runtime::Runtime;
use url::Url;

/// Storage errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StorageError {
    /// Malformed path or URI
    #[error("Invalid location {location}: {reason}")]
    InvalidLocation {
        /// Location as given
        location: String,
        /// What is wrong with it
        reason: String,
    },

    /// URI scheme other than file, gs or s3
    #[error("Unsupported URI scheme: {scheme}")]
    UnsupportedScheme {
        /// Scheme as given
        scheme: String,
    },

    /// Nothing stored at the location
    #[error("Not found: {location}")]
    NotFound {
        /// Missing location
        location: String,
    },

    /// Object store failure
    #[error("Object store error at {location}: {reason}")]
    ObjectStore {
        /// Location being accessed
        location: String,
        /// Store error message
        reason: String,
    },

    /// Local I/O failure outside the object store
    #[error("IO error at {location}: {reason}")]
    Io {
        /// Local path being accessed
        location: String,
        /// I/O error message
        reason: String,
    },

    /// The I/O runtime could not start
    #[error("Failed to start I/O runtime: {reason}")]
    Runtime {
        /// Runtime builder error message
        reason: String,
    },
}

fn create_retry_config() -> RetryConfig {
    RetryConfig {
        max_retries: 5,
        backoff: BackoffConfig {
            init_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(10),
            base: 2.0,
        },
        retry_timeout: Duration::from_secs(120),
    }
}

fn store_error(location: &Location, err: object_store::Error) -> StorageError {
    match err {
        object_store::Error::NotFound { .. } => StorageError::NotFound {
            location: location.to_string(),
        },
        other => StorageError::ObjectStore {
            location: location.to_string(),
            reason: other.to_string(),
        },
    }
}

/// Absolute form of `path` with `.` dropped and `..` folded.
///
/// Purely lexical, so the path does not have to exist. `..` at the root
/// stays at the root.
///
/// # Errors
///
/// Returns error if the working directory cannot be determined
pub fn normalize_local(path: &Path) -> io::Result<PathBuf> {
    let absolute = std::path::absolute(path)?;
    let mut normalized = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other),
        }
    }
    Ok(normalized)
}

/// Client for a remote bucket; credentials come from the environment
/// (`GOOGLE_APPLICATION_CREDENTIALS`, `AWS_*`) the way the cloud SDKs do.
fn remote_store(location: &Location, url: &Url) -> Result<Arc<dyn ObjectStore>, StorageError> {
    let store: Arc<dyn ObjectStore> = match url.scheme() {
        "gs" => {
            tracing::debug!("Creating GCS client for {}", url);
            Arc::new(
                GoogleCloudStorageBuilder::from_env()
                    .with_url(url.as_str())
                    .with_retry(create_retry_config())
                    .build()
                    .map_err(|e| store_error(location, e))?,
            )
        }
        "s3" => {
            tracing::debug!("Creating S3 client for {}", url);
            Arc::new(
                AmazonS3Builder::from_env()
                    .with_url(url.as_str())
                    .with_retry(create_retry_config())
                    .build()
                    .map_err(|e| store_error(location, e))?,
            )
        }
        other => {
            return Err(StorageError::UnsupportedScheme {
                scheme: other.to_string(),
            })
        }
    };
    Ok(store)
}

/// Blocking handle onto local and remote object stores.
///
/// Owns one runtime for all its calls and keeps one client per bucket, so
/// credentials are looked up once per bucket rather than once per object.
#[derive(Debug)]
pub struct Storage {
    runtime: Arc<Runtime>,
    stores: Mutex<HashMap<String, Arc<dyn ObjectStore>>>,
}

impl Storage {
    /// Start the I/O runtime
    ///
    /// # Errors
    ///
    /// Returns error if the runtime cannot be built
    pub fn new() -> Result<Self, StorageError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| StorageError::Runtime {
                reason: e.to_string(),
            })?;
        Ok(Self {
            runtime: Arc::new(runtime),
            stores: Mutex::new(HashMap::new()),
        })
    }

    fn store(
        &self,
        key: String,
        build: impl FnOnce() -> Result<Arc<dyn ObjectStore>, StorageError>,
    ) -> Result<Arc<dyn ObjectStore>, StorageError> {
        let mut stores = self.stores.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(store) = stores.get(&key) {
            return Ok(Arc::clone(store));
        }
        let store = build()?;
        stores.insert(key, Arc::clone(&store));
        Ok(store)
    }

    /// The store that serves `location` and the object path inside it
    fn resolve(&self, location: &Location) -> Result<(Arc<dyn ObjectStore>, ObjectPath), StorageError> {
        let invalid = |reason: String| StorageError::InvalidLocation {
            location: location.to_string(),
            reason,
        };

        match location {
            Location::Local(path) => {
                let absolute = normalize_local(path).map_err(|e| invalid(e.to_string()))?;
                let object_path =
                    ObjectPath::from_absolute_path(&absolute).map_err(|e| invalid(e.to_string()))?;
                let store = self.store("file".to_string(), || {
                    let store: Arc<dyn ObjectStore> = Arc::new(LocalFileSystem::new());
                    Ok(store)
                })?;
                Ok((store, object_path))
            }
            Location::Remote(url) => {
                let object_path =
                    ObjectPath::from_url_path(url.path()).map_err(|e| invalid(e.to_string()))?;
                let key = format!("{}://{}", url.scheme(), url.host_str().unwrap_or_default());
                let store = self.store(key, || remote_store(location, url))?;
                Ok((store, object_path))
            }
        }
    }

    /// Read the whole object at `location`
    ///
    /// # Errors
    ///
    /// Returns error if the location cannot be resolved or read
    pub fn read(&self, location: &Location) -> Result<Bytes, StorageError> {
        let (store, path) = self.resolve(location)?;
        self.runtime
            .block_on(async {
                let result = store.get(&path).await?;
                result.bytes().await
            })
            .map_err(|e| store_error(location, e))
    }

    /// Write `data` to `location`, replacing what is there.
    ///
    /// Missing local parent directories are created.
    ///
    /// # Errors
    ///
    /// Returns error if the location cannot be resolved or written
    pub fn write(&self, location: &Location, data: Bytes) -> Result<(), StorageError> {
        let (store, path) = self.resolve(location)?;
        let size = data.len();
        self.runtime
            .block_on(store.put(&path, data.into()))
            .map_err(|e| store_error(location, e))?;
        tracing::debug!("Wrote {} bytes to {}", size, location);
        Ok(())
    }

    /// Open a streaming writer onto `location`.
    ///
    /// Nothing is visible at `location` until [`ObjectWriter::finish`].
    ///
    /// # Errors
    ///
    /// Returns error if the location cannot be resolved
    pub fn create(&self, location: &Location) -> Result<ObjectWriter, StorageError> {
        let (store, path) = self.resolve(location)?;
        Ok(ObjectWriter {
            runtime: Arc::clone(&self.runtime),
            inner: BufWriter::new(store, path),
            location: location.clone(),
        })
    }

    /// Copy a local file to `dest`
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or the copy cannot be written
    pub fn copy_local_file(&self, source: &Path, dest: &Location) -> Result<(), StorageError> {
        let data = std::fs::read(source).map_err(|e| StorageError::Io {
            location: source.display().to_string(),
            reason: e.to_string(),
        })?;
        self.write(dest, Bytes::from(data))
    }
}

/// Blocking [`Write`] onto one object.
///
/// Small objects are uploaded in one request, larger ones switch to a
/// multipart upload as the buffer fills.
pub struct ObjectWriter {
    runtime: Arc<Runtime>,
    inner: BufWriter,
    location: Location,
}

impl ObjectWriter {
    /// Destination
    #[must_use]
    pub const fn location(&self) -> &Location {
        &self.location
    }

    /// Complete the upload
    ///
    /// # Errors
    ///
    /// Returns error if the remaining bytes cannot be stored
    pub fn finish(mut self) -> Result<Location, StorageError> {
        match self.runtime.block_on(self.inner.shutdown()) {
            Ok(()) => Ok(self.location),
            Err(e) => Err(StorageError::ObjectStore {
                location: self.location.to_string(),
                reason: e.to_string(),
            }),
        }
    }
}

impl Write for ObjectWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.runtime.block_on(self.inner.write(buf))
    }

    fn flush(&mut self) -> io::Result<()> {
        self.runtime.block_on(self.inner.flush())
    }
}

impl std::fmt::Debug for ObjectWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectWriter")
            .field("location", &self.location)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_then_read_local() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::new().unwrap();
        let location = Location::Local(dir.path().join("nested/dir/blob.bin"));

        storage.write(&location, Bytes::from_static(b"record bytes")).unwrap();
        assert_eq!(storage.read(&location).unwrap(), Bytes::from_static(b"record bytes"));
    }

    #[test]
    fn test_read_missing_local() {
        let dir = tempfile::tempdir().unwrap();
        let location = Location::Local(dir.path().join("missing.jpg"));
        let err = Storage::new().unwrap().read(&location).unwrap_err();
        assert!(matches!(err, StorageError::NotFound { .. }));
    }

    #[test]
    fn test_write_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::new().unwrap();
        let location = Location::Local(dir.path().join("blob.bin"));
        storage.write(&location, Bytes::from_static(b"first")).unwrap();
        storage.write(&location, Bytes::from_static(b"second")).unwrap();
        assert_eq!(std::fs::read(dir.path().join("blob.bin")).unwrap(), b"second");
    }

    #[test]
    fn test_parent_segments_resolve() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::new().unwrap();
        std::fs::write(dir.path().join("1.png"), "pixels").unwrap();

        let up = Location::Local(dir.path().join("images/../1.png"));
        assert_eq!(storage.read(&up).unwrap(), Bytes::from_static(b"pixels"));

        let target = Location::Local(dir.path().join("out/./shards/../train.tfrecord"));
        storage.write(&target, Bytes::from_static(b"records")).unwrap();
        assert_eq!(std::fs::read(dir.path().join("out/train.tfrecord")).unwrap(), b"records");
    }

    #[test]
    fn test_normalize_local() {
        assert_eq!(
            normalize_local(Path::new("/data/images/../labels/./a.csv")).unwrap(),
            PathBuf::from("/data/labels/a.csv")
        );
        assert_eq!(normalize_local(Path::new("/../a")).unwrap(), PathBuf::from("/a"));

        let cwd = std::env::current_dir().unwrap();
        let expected = cwd.parent().unwrap_or(&cwd).join("images.csv");
        assert_eq!(normalize_local(Path::new("../images.csv")).unwrap(), expected);
    }

    #[test]
    fn test_streaming_writer() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::new().unwrap();
        let location = Location::Local(dir.path().join("shards/train.tfrecord"));

        let mut writer = storage.create(&location).unwrap();
        writer.write_all(b"first ").unwrap();
        writer.write_all(b"second").unwrap();
        assert_eq!(writer.location(), &location);
        assert!(!dir.path().join("shards/train.tfrecord").exists());

        assert_eq!(writer.finish().unwrap(), location);
        assert_eq!(storage.read(&location).unwrap(), Bytes::from_static(b"first second"));
    }

    #[test]
    fn test_one_client_per_store() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::new().unwrap();
        for name in ["a.bin", "b.bin", "c.bin"] {
            storage
                .write(&Location::Local(dir.path().join(name)), Bytes::from_static(b"x"))
                .unwrap();
        }
        assert_eq!(storage.stores.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_copy_local_file() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("run.log");
        std::fs::write(&source, "line one\n").unwrap();

        let dest = Location::Local(dir.path().join("out/run.log"));
        Storage::new().unwrap().copy_local_file(&source, &dest).unwrap();
        assert_eq!(std::fs::read_to_string(dir.path().join("out/run.log")).unwrap(), "line one\n");
    }

    #[test]
    fn test_copy_missing_source() {
        let dir = tempfile::tempdir().unwrap();
        let dest = Location::Local(dir.path().join("out.log"));
        let err = Storage::new()
            .unwrap()
            .copy_local_file(&dir.path().join("absent.log"), &dest)
            .unwrap_err();
        assert!(matches!(err, StorageError::Io { .. }));
    }
}
