//! Record serialization.
//!
//! A [`DataWriter`] is bound to exactly one output file for its whole life and
//! belongs to exactly one module, so writers are never shared across threads.
//!
//! Two serializers exist:
//!
//! - **JSON**: newline-delimited objects. Envelope fields sit at the same level
//!   as the normalized payload keys; the envelope wins on collision.
//! - **CSV**: a fixed four-token header, then one row per record where each
//!   payload entry becomes an extra `"key: value"` column. Rows are therefore
//!   not rectangular.

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use log::debug;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::constants::{
    CSV_HEADER, ENVELOPE_COLLECTION_TIMESTAMP, ENVELOPE_EVENT_TIMESTAMP, ENVELOPE_SOURCE_FILE,
};
use crate::models::{ExportFormat, Record};

/// Errors raised while creating a writer or serializing a record.
#[derive(Debug, Error)]
pub enum WriterError {
    #[error("unsupported export format: {0}")]
    UnsupportedFormat(String),

    #[error("failed to create output file {path}: {source}")]
    Create {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("record data must be a string-keyed mapping, got {0}")]
    DataNotObject(&'static str),

    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    #[error("json serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("csv serialization error: {0}")]
    Csv(#[from] csv::Error),
}

/// Lowercase `key` and drop every character outside `[a-z0-9_-]`.
pub fn normalize_key(key: &str) -> String {
    key.to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '_' || *c == '-')
        .collect()
}

/// Normalize every payload key. Keys that collide after normalization
/// overwrite each other; the survivor is whichever comes last in map order.
pub fn normalize_data(data: &Map<String, Value>) -> Map<String, Value> {
    let mut normalized = Map::with_capacity(data.len());
    for (key, value) in data {
        normalized.insert(normalize_key(key), value.clone());
    }
    normalized
}

/// Output file name: `<module>[-<subcollection>]-<stamp>`, without extension.
pub fn output_file_stem(module: &str, subcollection: Option<&str>, stamp: &str) -> String {
    match subcollection {
        Some(sub) if !sub.is_empty() => format!("{}-{}-{}", module, sub, stamp),
        _ => format!("{}-{}", module, stamp),
    }
}

enum Sink {
    Json(BufWriter<File>),
    Csv(csv::Writer<File>),
}

/// Per-file record sink.
pub struct DataWriter {
    path: PathBuf,
    records_written: usize,
    sink: Sink,
}

impl DataWriter {
    /// Create `<dir>/<file_stem>.<format>`.
    ///
    /// The format is validated before anything touches the filesystem, so an
    /// unsupported format never leaves an empty file behind.
    pub fn new(dir: &Path, file_stem: &str, format: &str) -> Result<Self, WriterError> {
        let format: ExportFormat = format.parse()?;
        Self::create(dir, file_stem, format)
    }

    /// Same as [`DataWriter::new`] with an already validated format.
    pub fn create(dir: &Path, file_stem: &str, format: ExportFormat) -> Result<Self, WriterError> {
        let path = dir.join(format!("{}.{}", file_stem, format.extension()));

        fs::create_dir_all(dir).map_err(|source| WriterError::Create {
            path: dir.to_path_buf(),
            source,
        })?;
        let file = File::create(&path).map_err(|source| WriterError::Create {
            path: path.clone(),
            source,
        })?;

        let sink = match format {
            ExportFormat::Json => Sink::Json(BufWriter::new(file)),
            ExportFormat::Csv => {
                let mut writer = csv::WriterBuilder::new()
                    .flexible(true)
                    .from_writer(file);
                writer.write_record(CSV_HEADER)?;
                Sink::Csv(writer)
            }
        };

        debug!("Opened {} writer at {}", format, path.display());

        Ok(Self {
            path,
            records_written: 0,
            sink,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn records_written(&self) -> usize {
        self.records_written
    }

    /// Serialize one record as a single write. A record that fails to
    /// serialize leaves the file untouched.
    pub fn write_record(&mut self, record: &Record) -> Result<(), WriterError> {
        let data = normalize_data(&record.data);

        match &mut self.sink {
            Sink::Json(out) => {
                let mut line = serde_json::to_vec(&json_object(record, data))?;
                line.push(b'\n');
                out.write_all(&line)?;
            }
            Sink::Csv(out) => {
                out.write_record(csv_row(record, &data))?;
            }
        }

        self.records_written += 1;
        Ok(())
    }

    /// Flush buffered rows and release the file handle.
    pub fn close(self) -> Result<PathBuf, WriterError> {
        match self.sink {
            Sink::Json(mut out) => out.flush()?,
            Sink::Csv(mut out) => out.flush()?,
        }
        debug!(
            "Closed {} after {} records",
            self.path.display(),
            self.records_written
        );
        Ok(self.path)
    }
}

fn json_object(record: &Record, mut data: Map<String, Value>) -> Map<String, Value> {
    let envelope = [
        (ENVELOPE_COLLECTION_TIMESTAMP, &record.collection_timestamp),
        (ENVELOPE_EVENT_TIMESTAMP, &record.event_timestamp),
        (ENVELOPE_SOURCE_FILE, &record.source_file),
    ];

    for (key, value) in envelope {
        if data.insert(key.to_string(), Value::String(value.clone())).is_some() {
            debug!("Dropped payload key '{}' shadowing the record envelope", key);
        }
    }
    data
}

fn csv_row(record: &Record, data: &Map<String, Value>) -> Vec<String> {
    let mut row = Vec::with_capacity(3 + data.len());
    row.push(record.collection_timestamp.clone());
    row.push(record.event_timestamp.clone());
    row.push(record.source_file.clone());

    let mut entries: Vec<_> = data.iter().collect();
    entries.sort_by(|a, b| a.0.cmp(b.0));
    for (key, value) in entries {
        row.push(format!("{}: {}", key, display_value(value)));
    }
    row
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
