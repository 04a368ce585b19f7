//! Pipeline builder and job handle interface.
//!
//! The dispatcher only ever talks to a backend through these two traits:
//! a [`PipelineBuilder`] turns a validated table and its run configuration
//! into a [`JobHandle`], which is then started and waited on.

use recordsmith_core::{RunConfig, Runner, Table};
use recordsmith_io::StorageError;
use std::fmt;

/// Job lifecycle as reported by a backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobState {
    /// Built, not started
    Pending,
    /// Started, not finished
    Running,
    /// Finished successfully
    Succeeded,
    /// Finished with an error
    Failed {
        /// Backend supplied reason
        message: String,
    },
    /// Stopped before finishing
    Cancelled,
}

impl JobState {
    /// Whether the job can no longer change state
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed { .. } | Self::Cancelled)
    }

    /// Whether the job finished successfully
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "PENDING"),
            Self::Running => write!(f, "RUNNING"),
            Self::Succeeded => write!(f, "DONE"),
            Self::Failed { message } => write!(f, "FAILED: {}", message),
            Self::Cancelled => write!(f, "CANCELLED"),
        }
    }
}

/// Pipeline errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PipelineError {
    /// The builder cannot execute on this runner
    #[error("{builder} cannot run on {runner}")]
    UnsupportedRunner {
        /// Builder name
        builder: &'static str,
        /// Requested runner
        runner: Runner,
    },

    /// Operation not allowed in the job's current state
    #[error("Cannot {operation} job {job_id} while it is {state}")]
    InvalidState {
        /// Job identifier
        job_id: String,
        /// Attempted operation
        operation: &'static str,
        /// State at the time
        state: JobState,
    },

    /// A row could not be turned into a record
    #[error("Row {row}: {reason}")]
    InvalidRecord {
        /// Zero based row index
        row: usize,
        /// What is wrong with the row
        reason: String,
    },

    /// An output file could not be written
    #[error("Failed to write {location}: {reason}")]
    Write {
        /// Output file
        location: String,
        /// I/O error message
        reason: String,
    },

    /// Reading an image or writing output failed
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// A submitted job
pub trait JobHandle: Send {
    /// Backend assigned job identifier
    fn job_id(&self) -> &str;

    /// Current state, without blocking
    fn state(&self) -> JobState;

    /// Start the job
    ///
    /// # Errors
    ///
    /// Returns error if the job was already started
    fn run(&mut self) -> Result<(), PipelineError>;

    /// Block until the job reaches a terminal state and return it.
    ///
    /// A job that fails still returns `Ok` with a `Failed` state; `Err` means
    /// the handle could not be waited on at all.
    ///
    /// # Errors
    ///
    /// Returns error if the job was never started
    fn wait_until_finish(&mut self) -> Result<JobState, PipelineError>;

    /// Stop the job if it has not finished
    ///
    /// # Errors
    ///
    /// Returns error if the backend refuses to cancel
    fn cancel(&mut self) -> Result<(), PipelineError>;
}

/// Turns a validated table into a job
pub trait PipelineBuilder {
    /// Build, but do not start, a job writing `table` per `config`
    ///
    /// # Errors
    ///
    /// Returns error if the backend cannot handle the configuration
    fn build(&self, table: &Table, config: &RunConfig) -> Result<Box<dyn JobHandle>, PipelineError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(!JobState::Pending.is_terminal());
        assert!(!JobState::Running.is_terminal());
        assert!(JobState::Succeeded.is_terminal());
        assert!(JobState::Cancelled.is_terminal());
        assert!(JobState::Failed { message: "x".into() }.is_terminal());
        assert!(JobState::Succeeded.is_success());
        assert!(!JobState::Cancelled.is_success());
    }

    #[test]
    fn test_state_display() {
        assert_eq!(JobState::Succeeded.to_string(), "DONE");
        assert_eq!(
            JobState::Failed { message: "disk full".into() }.to_string(),
            "FAILED: disk full"
        );
    }

    #[test]
    fn test_invalid_state_message() {
        let err = PipelineError::InvalidState {
            job_id: "local-1".to_string(),
            operation: "wait on",
            state: JobState::Pending,
        };
        assert_eq!(err.to_string(), "Cannot wait on job local-1 while it is PENDING");
    }
}
