//! recordsmith runtime
//!
//! Drives one invocation end to end: checks the input, opens the
//! per-invocation diagnostic log, builds and runs the job, and publishes
//! the log next to the output.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod dispatch;
pub mod log_scope;

pub use dispatch::{
    create_tfrecords, validate, CreateRequest, DispatchError, InvocationState, RunReport, LOG_FILE_NAME,
};
pub use log_scope::{default_log_path, LogScope, LogScopeError, LOG_FILTER};
