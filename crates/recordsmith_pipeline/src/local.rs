//! In-process pipeline writing TFRecord files.
//!
//! Runs entirely on the thread that waits on the job, so anything it logs
//! ends up in whatever subscriber that thread has installed.

use crate::example::{Example, Feature};
use crate::job::{JobHandle, JobState, PipelineBuilder, PipelineError};
use crate::tfrecord::{RecordSink, TfRecordWriter};
use bytes::Bytes;
use indexmap::IndexMap;
use recordsmith_core::{Compression, RunConfig, Runner, Table, Value};
use recordsmith_io::{Location, ObjectWriter, Storage};
use std::io;
use uuid::Uuid;

/// Feature holding the image location
pub const IMAGE_URI_FEATURE: &str = "image_uri";
/// Feature holding the encoded image bytes
pub const IMAGE_FEATURE: &str = "image";
/// Feature holding the class label
pub const LABEL_FEATURE: &str = "label";
/// Feature holding the partition tag
pub const SPLIT_FEATURE: &str = "split";

/// File name of one output shard, e.g. `train-00000-of-00004.tfrecord.gz`
#[must_use]
pub fn shard_name(split: &str, index: u32, total: u32, compression: Compression) -> String {
    format!("{}-{:05}-of-{:05}{}", split, index, total, compression.file_suffix())
}

#[derive(Debug, Clone, PartialEq)]
enum Label {
    Int(i64),
    Text(String),
}

#[derive(Debug, Clone, PartialEq)]
struct Row {
    image_uri: String,
    label: Label,
    split: String,
}

impl Row {
    fn from_values(
        row: usize,
        image_uri: &Value,
        label: &Value,
        split: &Value,
        integer_label: bool,
    ) -> Result<Self, PipelineError> {
        let invalid = |reason: String| PipelineError::InvalidRecord { row, reason };

        let image_uri = image_uri
            .as_str()
            .ok_or_else(|| invalid(format!("image_uri `{}` is not text", image_uri)))?
            .to_string();
        let label = if integer_label {
            Label::Int(
                label
                    .as_i64()
                    .ok_or_else(|| invalid(format!("label `{}` is not an integer", label)))?,
            )
        } else if label.is_null() {
            return Err(invalid("label is missing".to_string()));
        } else {
            Label::Text(label.to_string())
        };
        let split = split
            .as_str()
            .ok_or_else(|| invalid(format!("split `{}` is not text", split)))?
            .to_lowercase();

        Ok(Self { image_uri, label, split })
    }

    fn to_example(&self, image: Bytes) -> Example {
        let label = match &self.label {
            Label::Int(value) => Feature::int64(*value),
            Label::Text(text) => Feature::bytes(text.as_bytes()),
        };
        Example::new([
            (IMAGE_URI_FEATURE.to_string(), Feature::bytes(self.image_uri.as_bytes())),
            (IMAGE_FEATURE.to_string(), Feature::bytes(image.to_vec())),
            (LABEL_FEATURE.to_string(), label),
            (SPLIT_FEATURE.to_string(), Feature::bytes(self.split.as_bytes())),
        ])
    }
}

/// Builds [`LocalJob`]s for the local runner
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalPipelineBuilder;

impl LocalPipelineBuilder {
    /// Create a builder
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl PipelineBuilder for LocalPipelineBuilder {
    fn build(&self, table: &Table, config: &RunConfig) -> Result<Box<dyn JobHandle>, PipelineError> {
        if config.runner != Runner::Local {
            return Err(PipelineError::UnsupportedRunner {
                builder: "LocalPipelineBuilder",
                runner: config.runner,
            });
        }

        let output = Location::parse(&config.output_dir)?;
        let rows = table
            .records()
            .enumerate()
            .map(|(i, r)| Row::from_values(i, r.image_uri, r.label, r.split, config.integer_label))
            .collect::<Result<Vec<_>, _>>()?;

        let job = LocalJob {
            job_id: format!("local-{}", Uuid::new_v4().simple()),
            job_label: config.job_label.clone(),
            output,
            compression: config.compression,
            shards: config.shards_per_split(),
            rows,
            state: JobState::Pending,
        };
        tracing::debug!(
            "Built job {} ({}) for {} rows",
            job.job_id,
            job.job_label,
            job.rows.len()
        );
        Ok(Box::new(job))
    }
}

/// A local job; the work happens inside [`JobHandle::wait_until_finish`]
#[derive(Debug)]
pub struct LocalJob {
    job_id: String,
    job_label: String,
    output: Location,
    compression: Compression,
    shards: u32,
    rows: Vec<Row>,
    state: JobState,
}

impl LocalJob {
    fn invalid_state(&self, operation: &'static str) -> PipelineError {
        PipelineError::InvalidState {
            job_id: self.job_id.clone(),
            operation,
            state: self.state.clone(),
        }
    }

    fn open_shards(&self, storage: &Storage, split: &str) -> Result<Vec<Shard>, PipelineError> {
        (0..self.shards)
            .map(|index| -> Result<Shard, PipelineError> {
                let location = self.output.join(&shard_name(split, index, self.shards, self.compression))?;
                let sink = RecordSink::new(storage.create(&location)?, self.compression);
                Ok(Shard {
                    location,
                    writer: TfRecordWriter::new(sink),
                })
            })
            .collect()
    }

    /// Stream every row into its split's shards. A record is written as
    /// soon as its image has been read.
    fn execute(&self) -> Result<Vec<Location>, PipelineError> {
        let storage = Storage::new()?;
        let mut splits: IndexMap<&str, Vec<&Row>> = IndexMap::new();
        for row in &self.rows {
            splits.entry(row.split.as_str()).or_default().push(row);
        }

        let mut written = Vec::new();
        for (split, rows) in splits {
            let mut shards = self.open_shards(&storage, split)?;
            let total = shards.len();
            for (i, row) in rows.iter().enumerate() {
                let image = storage.read(&Location::parse(&row.image_uri)?)?;
                shards[i % total].write(&row.to_example(image).to_bytes())?;
            }

            for shard in shards {
                let records = shard.writer.records();
                let location = shard.finish()?;
                tracing::info!("Wrote {} records to {}", records, location);
                written.push(location);
            }
        }
        Ok(written)
    }
}

/// One output file being written
struct Shard {
    location: Location,
    writer: TfRecordWriter<RecordSink<ObjectWriter>>,
}

impl Shard {
    fn write_error(&self, err: &io::Error) -> PipelineError {
        PipelineError::Write {
            location: self.location.to_string(),
            reason: err.to_string(),
        }
    }

    fn write(&mut self, record: &[u8]) -> Result<(), PipelineError> {
        self.writer.write_record(record).map_err(|e| self.write_error(&e))
    }

    fn finish(self) -> Result<Location, PipelineError> {
        let object = self
            .writer
            .into_inner()
            .and_then(RecordSink::finish)
            .map_err(|e| PipelineError::Write {
                location: self.location.to_string(),
                reason: e.to_string(),
            })?;
        Ok(object.finish()?)
    }
}

impl JobHandle for LocalJob {
    fn job_id(&self) -> &str {
        &self.job_id
    }

    fn state(&self) -> JobState {
        self.state.clone()
    }

    fn run(&mut self) -> Result<(), PipelineError> {
        if self.state != JobState::Pending {
            return Err(self.invalid_state("start"));
        }
        tracing::info!("Starting job {} ({})", self.job_id, self.job_label);
        self.state = JobState::Running;
        Ok(())
    }

    fn wait_until_finish(&mut self) -> Result<JobState, PipelineError> {
        match self.state {
            JobState::Pending => return Err(self.invalid_state("wait on")),
            JobState::Running => {}
            _ => return Ok(self.state.clone()),
        }

        self.state = match self.execute() {
            Ok(written) => {
                tracing::info!("Job {} wrote {} files", self.job_id, written.len());
                JobState::Succeeded
            }
            Err(e) => {
                tracing::error!("Job {} failed: {}", self.job_id, e);
                JobState::Failed { message: e.to_string() }
            }
        };
        Ok(self.state.clone())
    }

    fn cancel(&mut self) -> Result<(), PipelineError> {
        if !self.state.is_terminal() {
            tracing::warn!("Cancelling job {}", self.job_id);
            self.state = JobState::Cancelled;
        }
        Ok(())
    }
}
