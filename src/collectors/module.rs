use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat, Utc};
use log::warn;
use serde::Serialize;

use crate::constants::{DEFAULT_INPUT_DIR, FILE_TIMESTAMP_FORMAT};
use crate::models::{ExportFormat, Record, Verbosity};
use crate::utils::data_writer::{output_file_stem, DataWriter, WriterError};

/// Capability every artifact collector implements.
///
/// `run` is a blocking call. It executes on the blocking thread pool and is
/// never interrupted by the dispatcher, not even after the batch deadline.
pub trait Module: Send + Sync {
    /// Unique registry key.
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// Collect, write records, and report what happened.
    ///
    /// An `Err` means the module could not do its job at all (bad output
    /// file, unreadable source). Per-record problems belong in
    /// [`RunSummary::warnings`].
    fn run(&self, params: &ModuleParams) -> anyhow::Result<RunSummary>;
}

/// Immutable configuration shared by every module of one run.
///
/// Built once at startup and handed out behind an `Arc`. Logging goes
/// through the process-wide `log` facade; `verbosity` tells modules how much
/// detail the operator asked for.
#[derive(Debug, Clone)]
pub struct ModuleParams {
    pub export_format: ExportFormat,
    /// RFC3339, identical for every record of the run.
    pub collection_timestamp: String,
    /// Filesystem-safe rendering of `start_time`, used in file names.
    pub file_timestamp: String,
    pub logs_dir: PathBuf,
    pub output_dir: PathBuf,
    pub input_dir: PathBuf,
    pub verbosity: Verbosity,
    pub start_time: DateTime<Utc>,
}

impl ModuleParams {
    /// Params rooted at `output_dir` for a run starting now.
    pub fn new(export_format: ExportFormat, output_dir: impl Into<PathBuf>) -> Self {
        Self::starting_at(export_format, output_dir, Utc::now())
    }

    pub fn starting_at(
        export_format: ExportFormat,
        output_dir: impl Into<PathBuf>,
        start_time: DateTime<Utc>,
    ) -> Self {
        let output_dir = output_dir.into();
        Self {
            export_format,
            collection_timestamp: start_time.to_rfc3339_opts(SecondsFormat::Secs, true),
            file_timestamp: start_time.format(FILE_TIMESTAMP_FORMAT).to_string(),
            logs_dir: output_dir.clone(),
            output_dir,
            input_dir: PathBuf::from(DEFAULT_INPUT_DIR),
            verbosity: Verbosity::default(),
            start_time,
        }
    }

    pub fn with_logs_dir(mut self, logs_dir: impl Into<PathBuf>) -> Self {
        self.logs_dir = logs_dir.into();
        self
    }

    pub fn with_input_dir(mut self, input_dir: impl Into<PathBuf>) -> Self {
        self.input_dir = input_dir.into();
        self
    }

    pub fn with_verbosity(mut self, verbosity: Verbosity) -> Self {
        self.verbosity = verbosity;
        self
    }

    /// Open the writer for `<module>[-<subcollection>]-<stamp>.<format>` in
    /// the logs directory.
    pub fn create_writer(
        &self,
        module: &str,
        subcollection: Option<&str>,
    ) -> Result<DataWriter, WriterError> {
        let stem = output_file_stem(module, subcollection, &self.file_timestamp);
        DataWriter::create(&self.logs_dir, &stem, self.export_format)
    }

    /// Resolve an absolute evidence path against `input_dir`.
    pub fn input_path(&self, relative: impl AsRef<Path>) -> PathBuf {
        let relative = relative.as_ref();
        let relative = relative.strip_prefix("/").unwrap_or(relative);
        self.input_dir.join(relative)
    }

    /// A record stamped with this run's collection time.
    pub fn record(
        &self,
        event_timestamp: impl Into<String>,
        source_file: impl Into<String>,
    ) -> Record {
        Record::new(self.collection_timestamp.clone(), event_timestamp, source_file)
    }
}

/// Aggregated result of one `Module::run`.
///
/// Partial failure is the normal case for collectors: a run can succeed while
/// some records were lost. Those losses are kept here instead of only being
/// logged.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunSummary {
    pub records_written: usize,
    pub output_files: Vec<PathBuf>,
    pub warnings: Vec<String>,
}

impl RunSummary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Log a non-fatal problem and keep it.
    pub fn warn(&mut self, module: &str, message: impl Into<String>) {
        let message = message.into();
        warn!("[{}] {}", module, message);
        self.warnings.push(message);
    }

    /// Write one record, downgrading a failure to a warning.
    pub fn write(&mut self, module: &str, writer: &mut DataWriter, record: &Record) {
        match writer.write_record(record) {
            Ok(()) => self.records_written += 1,
            Err(e) => self.warn(
                module,
                format!("failed to write record from {}: {}", record.source_file, e),
            ),
        }
    }

    /// Close the writer and remember the file it produced.
    pub fn finish_writer(&mut self, writer: DataWriter) -> Result<(), WriterError> {
        let path = writer.close()?;
        self.output_files.push(path);
        Ok(())
    }

    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }
}
