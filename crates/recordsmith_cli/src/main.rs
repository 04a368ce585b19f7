//! recordsmith CLI
//!
//! Turns an image table (CSV/TSV of `image_uri,label,split`) into TFRecord
//! files.

#![warn(missing_docs)]
#![warn(clippy::all)]

use clap::{Args, Parser, Subcommand};
use color_eyre::Result;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use recordsmith_core::{Compression, HeaderSpec, Runner, DEFAULT_JOB_LABEL};
use recordsmith_pipeline::LocalPipelineBuilder;
use recordsmith_runtime::{create_tfrecords, validate, CreateRequest};
use std::time::Duration;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "recordsmith")]
#[command(about = "recordsmith - image tables to TFRecord files", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write TFRecord files for an image table
    Create(CreateArgs),
    /// Check an image table without writing anything
    Validate(InputArgs),
}

#[derive(Args)]
struct InputArgs {
    /// CSV or TSV file, local path or gs:// / s3:// URI
    #[arg(short, long)]
    input: String,
    /// Header row: first-row, none or a row number
    #[arg(long, default_value = "first-row")]
    header: HeaderSpec,
    /// Column names for a file without a header row
    #[arg(long, value_delimiter = ',')]
    names: Vec<String>,
    /// Execution backend
    #[arg(short, long, default_value = "DirectRunner")]
    runner: Runner,
    /// Cloud project
    #[arg(long)]
    project: Option<String>,
    /// Cloud region
    #[arg(long)]
    region: Option<String>,
}

#[derive(Args)]
struct CreateArgs {
    #[command(flatten)]
    input: InputArgs,
    /// Output directory, local path or gs:// / s3:// URI
    #[arg(short, long)]
    output: String,
    /// Backend option as key=value, repeatable
    #[arg(long = "option", value_parser = parse_option)]
    options: Vec<(String, serde_json::Value)>,
    /// Job label
    #[arg(long, default_value = DEFAULT_JOB_LABEL)]
    job_label: String,
    /// Output compression: gzip or none
    #[arg(long, default_value = "gzip")]
    compression: Compression,
    /// Files per split, 0 lets the backend decide
    #[arg(long, default_value_t = 0)]
    num_shards: u32,
}

/// Parse `key=value`; values that are valid JSON keep their type
fn parse_option(s: &str) -> Result<(String, serde_json::Value), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got `{}`", s))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty option name in `{}`", s));
    }
    let value = serde_json::from_str(value).unwrap_or_else(|_| serde_json::Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

impl InputArgs {
    fn request(self, output: String) -> CreateRequest {
        let header = if self.names.is_empty() {
            self.header
        } else {
            HeaderSpec::Names(self.names)
        };
        let mut request = CreateRequest::new(self.input, output)
            .with_header(header)
            .with_runner(self.runner);
        if let Some(project) = self.project {
            request = request.with_project(project);
        }
        if let Some(region) = self.region {
            request = request.with_region(region);
        }
        request
    }
}

impl CreateArgs {
    fn request(self) -> CreateRequest {
        let mut request = self
            .input
            .request(self.output)
            .with_job_label(self.job_label)
            .with_compression(self.compression)
            .with_num_shards(self.num_shards);
        for (key, value) in self.options {
            request = request.with_backend_option(key, value);
        }
        request
    }
}

fn spinner(message: String) -> Result<ProgressBar> {
    let bar = ProgressBar::new_spinner();
    bar.set_style(ProgressStyle::with_template("{spinner:.cyan} {msg}")?);
    bar.set_message(message);
    bar.enable_steady_tick(Duration::from_millis(120));
    Ok(bar)
}

fn create(args: CreateArgs) -> Result<()> {
    let request = args.request();
    tracing::debug!("Request: {:?}", request);
    if request.runner() != Runner::Local {
        color_eyre::eyre::bail!(
            "{} jobs are submitted by a cloud pipeline service; this binary only runs {}",
            request.runner(),
            Runner::Local
        );
    }

    let bar = spinner(format!("Writing TFRecords to {}", request.output_dir()))?;
    let result = create_tfrecords(request, &LocalPipelineBuilder::new());
    bar.finish_and_clear();

    let report = result?;
    println!("{} {}", style("✔").green().bold(), style("TFRecords written").bold());
    println!("{}", report);
    Ok(())
}

fn check(args: InputArgs) -> Result<()> {
    let table = validate(args.request(String::new()))?;
    println!(
        "{} {} rows, columns {}",
        style("✔").green().bold(),
        table.num_rows(),
        style(table.columns().join(", ")).cyan()
    );
    Ok(())
}

fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("recordsmith=info,warn")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match cli.command {
        Commands::Create(args) => create(args),
        Commands::Validate(args) => check(args),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_option() {
        assert_eq!(
            parse_option("machine_type=n1-standard-4").unwrap(),
            ("machine_type".to_string(), serde_json::json!("n1-standard-4"))
        );
        assert_eq!(
            parse_option("max_workers=8").unwrap(),
            ("max_workers".to_string(), serde_json::json!(8))
        );
        assert!(parse_option("no-equals").is_err());
        assert!(parse_option("=value").is_err());
    }

    #[test]
    fn test_create_args() {
        let cli = Cli::try_parse_from([
            "recordsmith",
            "create",
            "--input",
            "images.csv",
            "--output",
            "/tmp/out",
            "--names",
            "image_uri,label,split",
            "--compression",
            "none",
            "--num-shards",
            "4",
            "--option",
            "a=1",
        ])
        .unwrap();
        let Commands::Create(args) = cli.command else {
            panic!("expected create");
        };
        assert_eq!(args.input.runner, Runner::Local);
        assert_eq!(args.input.names.len(), 3);
        assert_eq!(args.compression, Compression::None);
        assert_eq!(args.num_shards, 4);
        assert_eq!(args.job_label, DEFAULT_JOB_LABEL);
        assert_eq!(args.options, vec![("a".to_string(), serde_json::json!(1))]);
    }

    #[test]
    fn test_unknown_runner_rejected() {
        let parsed = Cli::try_parse_from(["recordsmith", "validate", "--input", "a.csv", "--runner", "SparkRunner"]);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_header_row_number() {
        let cli = Cli::try_parse_from(["recordsmith", "validate", "--input", "a.csv", "--header", "2"]).unwrap();
        let Commands::Validate(args) = cli.command else {
            panic!("expected validate");
        };
        assert_eq!(args.header, HeaderSpec::Row(2));
    }
}
