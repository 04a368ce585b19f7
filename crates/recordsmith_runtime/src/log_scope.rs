//! Per-invocation diagnostic log.
//!
//! While a [`LogScope`] is open, every event on the opening thread is also
//! written to its file. The subscriber is thread scoped, so concurrent
//! invocations on other threads never interleave into the same file.

use recordsmith_core::RunId;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::subscriber::DefaultGuard;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::EnvFilter;

/// Directives for the diagnostic log; chatty transport crates only warn
pub const LOG_FILTER: &str = "info,hyper=warn,h2=warn,reqwest=warn,rustls=warn,object_store=warn";

/// Log scope errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LogScopeError {
    /// The log file could not be created
    #[error("Failed to open diagnostic log {path}: {reason}")]
    Open {
        /// Log file path
        path: String,
        /// I/O error message
        reason: String,
    },

    /// Buffered log lines could not be written out
    #[error("Failed to flush diagnostic log {path}: {reason}")]
    Flush {
        /// Log file path
        path: String,
        /// I/O error message
        reason: String,
    },
}

#[derive(Clone)]
struct SharedFileMakeWriter {
    file: Arc<Mutex<BufWriter<File>>>,
}

struct SharedFileWriter {
    file: Arc<Mutex<BufWriter<File>>>,
}

impl<'a> MakeWriter<'a> for SharedFileMakeWriter {
    type Writer = SharedFileWriter;

    fn make_writer(&'a self) -> Self::Writer {
        SharedFileWriter {
            file: Arc::clone(&self.file),
        }
    }
}

impl Write for SharedFileWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut file = self
            .file
            .lock()
            .map_err(|_| io::Error::other("log file lock poisoned"))?;
        file.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        let mut file = self
            .file
            .lock()
            .map_err(|_| io::Error::other("log file lock poisoned"))?;
        file.flush()
    }
}

/// Default log location for `run_id`, unique per invocation
#[must_use]
pub fn default_log_path(run_id: &RunId) -> PathBuf {
    std::env::temp_dir().join(format!("recordsmith-{}.log", run_id.as_uuid().simple()))
}

/// An open diagnostic log.
///
/// Closed explicitly with [`LogScope::close`], or on drop.
pub struct LogScope {
    path: PathBuf,
    file: Arc<Mutex<BufWriter<File>>>,
    guard: Option<DefaultGuard>,
}

impl LogScope {
    /// Open the log for `run_id` at [`default_log_path`]
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be created
    pub fn open(run_id: &RunId) -> Result<Self, LogScopeError> {
        Self::open_at(default_log_path(run_id))
    }

    /// Open a log at `path`, truncating anything already there
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be created
    pub fn open_at(path: impl Into<PathBuf>) -> Result<Self, LogScopeError> {
        let path = path.into();
        let open_error = |e: io::Error| LogScopeError::Open {
            path: path.display().to_string(),
            reason: e.to_string(),
        };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(open_error)?;
        }
        let file = Arc::new(Mutex::new(BufWriter::new(File::create(&path).map_err(open_error)?)));

        let subscriber = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::new(LOG_FILTER))
            .with_writer(SharedFileMakeWriter {
                file: Arc::clone(&file),
            })
            .with_ansi(false)
            .finish();
        let guard = tracing::subscriber::set_default(subscriber);
        tracing::debug!("Diagnostic log opened at {}", path.display());

        Ok(Self {
            path,
            file,
            guard: Some(guard),
        })
    }

    /// Log file path
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether events are still being captured
    #[must_use]
    pub const fn is_open(&self) -> bool {
        self.guard.is_some()
    }

    /// Stop capturing and flush the file. Closing twice is a no-op.
    ///
    /// # Errors
    ///
    /// Returns error if buffered lines cannot be written
    pub fn close(&mut self) -> Result<(), LogScopeError> {
        let Some(guard) = self.guard.take() else {
            return Ok(());
        };
        tracing::debug!("Closing diagnostic log {}", self.path.display());
        drop(guard);

        let flush_error = |reason: String| LogScopeError::Flush {
            path: self.path.display().to_string(),
            reason,
        };
        let mut file = self
            .file
            .lock()
            .map_err(|_| flush_error("log file lock poisoned".to_string()))?;
        file.flush().map_err(|e| flush_error(e.to_string()))
    }
}

impl Drop for LogScope {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::warn!("{}", e);
        }
    }
}

impl std::fmt::Debug for LogScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogScope")
            .field("path", &self.path)
            .field("open", &self.is_open())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_captures_events_until_closed() {
        let dir = tempfile::tempdir().unwrap();
        let mut scope = LogScope::open_at(dir.path().join("run.log")).unwrap();
        assert!(scope.is_open());

        tracing::info!("inside the scope");
        scope.close().unwrap();
        tracing::info!("after the scope");

        assert!(!scope.is_open());
        let contents = fs::read_to_string(scope.path()).unwrap();
        assert!(contents.contains("inside the scope"));
        assert!(!contents.contains("after the scope"));
    }

    #[test]
    fn test_close_twice() {
        let dir = tempfile::tempdir().unwrap();
        let mut scope = LogScope::open_at(dir.path().join("run.log")).unwrap();
        scope.close().unwrap();
        scope.close().unwrap();
    }

    #[test]
    fn test_drop_flushes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/run.log");
        {
            let _scope = LogScope::open_at(&path).unwrap();
            tracing::warn!("dropped without close");
        }
        assert!(fs::read_to_string(&path).unwrap().contains("dropped without close"));
    }

    #[test]
    fn test_noisy_targets_filtered() {
        let dir = tempfile::tempdir().unwrap();
        let mut scope = LogScope::open_at(dir.path().join("run.log")).unwrap();
        tracing::info!(target: "hyper", "connection pooled");
        tracing::warn!(target: "hyper", "connection reset");
        scope.close().unwrap();

        let contents = fs::read_to_string(scope.path()).unwrap();
        assert!(!contents.contains("connection pooled"));
        assert!(contents.contains("connection reset"));
    }

    #[test]
    fn test_default_paths_are_unique() {
        let first = default_log_path(&RunId::new());
        let second = default_log_path(&RunId::new());
        assert_ne!(first, second);
        assert!(first.starts_with(std::env::temp_dir()));
    }

    #[test]
    fn test_open_failure() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        fs::write(&blocker, "").unwrap();
        let err = LogScope::open_at(blocker.join("run.log")).unwrap_err();
        assert!(matches!(err, LogScopeError::Open { .. }));
    }
}
