//! Invocation dispatch.
//!
//! One call to [`create_tfrecords`] takes input data through normalization,
//! schema and runner checks, then hands the table to a pipeline builder and
//! blocks until the job is done. Checks run strictly in that order and stop
//! at the first failure, before any job is built or log file created.

use crate::log_scope::{LogScope, LogScopeError};
use indexmap::IndexMap;
use recordsmith_core::{
    policy, schema, Compression, HeaderSpec, PolicyError, RunConfig, RunId, Runner, SchemaError, Table,
    DEFAULT_JOB_LABEL, LABEL_KEY,
};
use recordsmith_io::{to_table, InputData, Location, NormalizeError, Storage};
use recordsmith_pipeline::{JobHandle, JobState, PipelineBuilder, PipelineError};
use std::fmt;
use std::path::{Path, PathBuf};

/// Name of the diagnostic log published next to the output
pub const LOG_FILE_NAME: &str = "recordsmith.log";

/// Dispatch errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    /// Input could not be turned into a table
    #[error(transparent)]
    Normalize(#[from] NormalizeError),

    /// Table does not have the image record layout
    #[error(transparent)]
    Schema(#[from] SchemaError),

    /// Table or settings not allowed on the chosen runner
    #[error(transparent)]
    Policy(#[from] PolicyError),

    /// The diagnostic log could not be opened
    #[error(transparent)]
    LogScope(#[from] LogScopeError),

    /// The pipeline builder or job handle failed
    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    /// The job finished without succeeding
    #[error("Job {job_id} did not succeed: {detail}")]
    ExecutionFailed {
        /// Backend job id
        job_id: String,
        /// Terminal job state
        detail: String,
    },

    /// Internal state machine misuse
    #[error("Invalid invocation transition {from} -> {to}")]
    IllegalTransition {
        /// Current state
        from: InvocationState,
        /// Requested state
        to: InvocationState,
    },
}

/// Lifecycle of one invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InvocationState {
    /// Request accepted
    Created,
    /// Input converted to a table
    Normalized,
    /// Schema and runner checks passed
    Validated,
    /// Job built
    Submitted,
    /// Job started
    Running,
    /// Job finished successfully
    Succeeded,
    /// Stopped by an error
    Failed,
}

impl InvocationState {
    /// Whether the invocation is over
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }

    /// Whether `next` may follow this state
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        match (self, next) {
            (Self::Created, Self::Normalized)
            | (Self::Normalized, Self::Validated)
            | (Self::Validated, Self::Submitted)
            | (Self::Submitted, Self::Running)
            | (Self::Running, Self::Succeeded) => true,
            (from, Self::Failed) => !from.is_terminal(),
            _ => false,
        }
    }
}

impl fmt::Display for InvocationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Created => "created",
            Self::Normalized => "normalized",
            Self::Validated => "validated",
            Self::Submitted => "submitted",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        };
        write!(f, "{}", name)
    }
}

/// State machine of one invocation, with its history
#[derive(Debug, Clone)]
struct Invocation {
    history: Vec<InvocationState>,
}

impl Invocation {
    fn new() -> Self {
        Self {
            history: vec![InvocationState::Created],
        }
    }

    fn state(&self) -> InvocationState {
        self.history.last().copied().unwrap_or(InvocationState::Created)
    }

    fn advance(&mut self, next: InvocationState) -> Result<(), DispatchError> {
        let from = self.state();
        if !from.can_transition_to(next) {
            return Err(DispatchError::IllegalTransition { from, to: next });
        }
        tracing::info!("Invocation {} -> {}", from, next);
        self.history.push(next);
        Ok(())
    }

    fn fail(&mut self) {
        let from = self.state();
        if !from.is_terminal() {
            tracing::info!("Invocation {} -> {}", from, InvocationState::Failed);
            self.history.push(InvocationState::Failed);
        }
    }

    /// Run `f`, then move to `next` on success or to `Failed` on error
    fn step<T>(
        &mut self,
        next: InvocationState,
        f: impl FnOnce() -> Result<T, DispatchError>,
    ) -> Result<T, DispatchError> {
        match f() {
            Ok(value) => {
                self.advance(next)?;
                Ok(value)
            }
            Err(e) => {
                self.fail();
                Err(e)
            }
        }
    }
}

/// Everything one invocation is asked to do
#[derive(Debug, Clone, PartialEq)]
pub struct CreateRequest {
    input: InputData,
    output_dir: String,
    header: HeaderSpec,
    runner: Runner,
    project: Option<String>,
    region: Option<String>,
    backend_options: IndexMap<String, serde_json::Value>,
    job_label: String,
    compression: Compression,
    num_shards: u32,
}

impl CreateRequest {
    /// Request writing `input` under `output_dir` with default settings
    pub fn new(input: impl Into<InputData>, output_dir: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            output_dir: output_dir.into(),
            header: HeaderSpec::default(),
            runner: Runner::default(),
            project: None,
            region: None,
            backend_options: IndexMap::new(),
            job_label: DEFAULT_JOB_LABEL.to_string(),
            compression: Compression::default(),
            num_shards: 0,
        }
    }

    /// Header handling for delimited files, or the projection for tables
    #[must_use]
    pub fn with_header(mut self, header: HeaderSpec) -> Self {
        self.header = header;
        self
    }

    /// Execution backend
    #[must_use]
    pub fn with_runner(mut self, runner: Runner) -> Self {
        self.runner = runner;
        self
    }

    /// Cloud project
    #[must_use]
    pub fn with_project(mut self, project: impl Into<String>) -> Self {
        self.project = Some(project.into());
        self
    }

    /// Cloud region
    #[must_use]
    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    /// Add one backend option
    #[must_use]
    pub fn with_backend_option(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.backend_options.insert(key.into(), value.into());
        self
    }

    /// Job label
    #[must_use]
    pub fn with_job_label(mut self, job_label: impl Into<String>) -> Self {
        self.job_label = job_label.into();
        self
    }

    /// Output compression
    #[must_use]
    pub fn with_compression(mut self, compression: Compression) -> Self {
        self.compression = compression;
        self
    }

    /// Files per split, 0 lets the backend decide
    #[must_use]
    pub fn with_num_shards(mut self, num_shards: u32) -> Self {
        self.num_shards = num_shards;
        self
    }

    /// Chosen runner
    #[must_use]
    pub const fn runner(&self) -> Runner {
        self.runner
    }

    /// Output location
    #[must_use]
    pub fn output_dir(&self) -> &str {
        &self.output_dir
    }
}

/// Outcome of a successful invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    /// Invocation id
    pub run_id: RunId,
    /// Backend job id
    pub job_id: String,
    /// Terminal job state
    pub job_state: JobState,
    /// Every state the invocation went through
    pub history: Vec<InvocationState>,
    /// Local diagnostic log, removed once it has been published
    pub log_path: PathBuf,
    /// Where the log was published, if publishing worked
    pub log_location: Option<String>,
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "run:   {}", self.run_id)?;
        writeln!(f, "job:   {} ({})", self.job_id, self.job_state)?;
        match &self.log_location {
            Some(location) => write!(f, "log:   {}", location),
            None => write!(f, "log:   {} (not published)", self.log_path.display()),
        }
    }
}

fn checked_table(
    input: InputData,
    header: &HeaderSpec,
    runner: Runner,
    project: Option<&str>,
    region: Option<&str>,
    invocation: &mut Invocation,
) -> Result<Table, DispatchError> {
    let table = invocation.step(InvocationState::Normalized, || Ok(to_table(input, header)?))?;
    invocation.step(InvocationState::Validated, || {
        schema::validate(&table)?;
        policy::validate(&table, runner, project, region)?;
        Ok(())
    })?;
    Ok(table)
}

/// Normalize the request's input and run the schema and runner checks
/// without building a job.
///
/// # Errors
///
/// Returns the first failing check
pub fn validate(request: CreateRequest) -> Result<Table, DispatchError> {
    let mut invocation = Invocation::new();
    checked_table(
        request.input,
        &request.header,
        request.runner,
        request.project.as_deref(),
        request.region.as_deref(),
        &mut invocation,
    )
}

fn run_job(
    table: &Table,
    config: &RunConfig,
    builder: &dyn PipelineBuilder,
    invocation: &mut Invocation,
) -> Result<(String, JobState), DispatchError> {
    match serde_json::to_string(config) {
        Ok(json) => tracing::info!("Run configuration: {}", json),
        Err(e) => tracing::warn!("Run configuration not serializable: {}", e),
    }

    let mut job: Box<dyn JobHandle> =
        invocation.step(InvocationState::Submitted, || Ok(builder.build(table, config)?))?;
    let job_id = job.job_id().to_string();
    tracing::info!("Submitted job {}", job_id);

    invocation.step(InvocationState::Running, || Ok(job.run()?))?;
    let state = match job.wait_until_finish() {
        Ok(state) => state,
        Err(e) => {
            invocation.fail();
            return Err(e.into());
        }
    };

    if state.is_success() {
        invocation.advance(InvocationState::Succeeded)?;
        tracing::info!("Job {} finished: {}", job_id, state);
        Ok((job_id, state))
    } else {
        invocation.fail();
        tracing::error!("Job {} finished: {}", job_id, state);
        Err(DispatchError::ExecutionFailed {
            job_id,
            detail: state.to_string(),
        })
    }
}

fn publish_log(log_path: &Path, output_dir: &str) -> Option<String> {
    let dest = match Location::parse(output_dir).and_then(|l| l.join(LOG_FILE_NAME)) {
        Ok(dest) => dest,
        Err(e) => {
            tracing::warn!("Diagnostic log not published: {}", e);
            return None;
        }
    };
    match Storage::new().and_then(|storage| storage.copy_local_file(log_path, &dest)) {
        Ok(()) => {
            tracing::info!("Diagnostic log published to {}", dest);
            if let Err(e) = std::fs::remove_file(log_path) {
                tracing::warn!("Failed to remove local log {}: {}", log_path.display(), e);
            }
            Some(dest.to_string())
        }
        Err(e) => {
            tracing::warn!("Diagnostic log not published to {}: {}", dest, e);
            None
        }
    }
}

/// Write `request`'s input as TFRecord files through `builder`.
///
/// Blocks until the job reaches a terminal state. The diagnostic log is
/// opened once the checks pass, closed on every path after that and then
/// copied to `<output_dir>/recordsmith.log`. The local copy is only kept
/// when that copy fails.
///
/// # Errors
///
/// Returns the first failing check, a builder or job handle error, or
/// [`DispatchError::ExecutionFailed`] when the job ends in any state other
/// than success
pub fn create_tfrecords(request: CreateRequest, builder: &dyn PipelineBuilder) -> Result<RunReport, DispatchError> {
    let CreateRequest {
        input,
        output_dir,
        header,
        runner,
        project,
        region,
        backend_options,
        job_label,
        compression,
        num_shards,
    } = request;

    let run_id = RunId::new();
    let mut invocation = Invocation::new();
    let table = checked_table(
        input,
        &header,
        runner,
        project.as_deref(),
        region.as_deref(),
        &mut invocation,
    )?;

    let mut scope = match LogScope::open(&run_id) {
        Ok(scope) => scope,
        Err(e) => {
            invocation.fail();
            return Err(e.into());
        }
    };
    tracing::info!("Run {} writing {} rows to {}", run_id, table.num_rows(), output_dir);

    let integer_label = table.dtype(LABEL_KEY).is_some_and(|d| d.is_integer());
    let config = RunConfig {
        output_dir,
        runner,
        project,
        region,
        backend_options,
        job_label,
        compression,
        num_shards,
        integer_label,
    };
    let outcome = run_job(&table, &config, builder, &mut invocation);

    if let Err(e) = scope.close() {
        tracing::warn!("{}", e);
    }
    let log_location = publish_log(scope.path(), &config.output_dir);

    let (job_id, job_state) = outcome?;
    Ok(RunReport {
        run_id,
        job_id,
        job_state,
        history: invocation.history,
        log_path: scope.path().to_path_buf(),
        log_location,
    })
}
