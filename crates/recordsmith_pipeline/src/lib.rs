//! recordsmith pipelines
//!
//! The interface the dispatcher drives a backend through, plus the local
//! backend: an in-process writer producing TFRecord files of
//! `tf.train.Example` messages.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod example;
pub mod job;
pub mod local;
pub mod tfrecord;

pub use example::{Example, Feature};
pub use job::{JobHandle, JobState, PipelineBuilder, PipelineError};
pub use local::{shard_name, LocalJob, LocalPipelineBuilder};
pub use tfrecord::{decode_file, encode_file, masked_crc32c, RecordSink, TfRecordError, TfRecordWriter};
