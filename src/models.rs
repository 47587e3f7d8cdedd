use std::fmt;
use std::str::FromStr;

use log::LevelFilter;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::utils::data_writer::WriterError;

/// Serialization format of every output file produced during one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Json,
    Csv,
}

impl ExportFormat {
    /// File extension used for output files in this format.
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Json => "json",
            ExportFormat::Csv => "csv",
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for ExportFormat {
    type Err = WriterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(ExportFormat::Json),
            "csv" => Ok(ExportFormat::Csv),
            other => Err(WriterError::UnsupportedFormat(other.to_string())),
        }
    }
}

/// Log verbosity: 0 = errors only, 1 = info, 2 = debug.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Verbosity(u8);

impl Verbosity {
    pub const ERROR: Verbosity = Verbosity(0);
    pub const INFO: Verbosity = Verbosity(1);
    pub const DEBUG: Verbosity = Verbosity(2);

    /// Values above 2 are clamped to debug.
    pub fn new(level: u8) -> Self {
        Verbosity(level.min(2))
    }

    pub fn level(&self) -> u8 {
        self.0
    }

    pub fn level_filter(&self) -> LevelFilter {
        match self.0 {
            0 => LevelFilter::Error,
            1 => LevelFilter::Info,
            _ => LevelFilter::Debug,
        }
    }
}

impl Default for Verbosity {
    fn default() -> Self {
        Verbosity::INFO
    }
}

/// The evidentiary envelope every collector emits.
///
/// The envelope fields are typed; the payload is an open key/value bag since
/// artifact schemas differ per collector. Keys are normalized only when the
/// record is serialized by a [`DataWriter`](crate::utils::data_writer::DataWriter).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Record {
    pub collection_timestamp: String,
    pub event_timestamp: String,
    pub source_file: String,
    pub data: Map<String, Value>,
}

impl Record {
    pub fn new(
        collection_timestamp: impl Into<String>,
        event_timestamp: impl Into<String>,
        source_file: impl Into<String>,
    ) -> Self {
        Self {
            collection_timestamp: collection_timestamp.into(),
            event_timestamp: event_timestamp.into(),
            source_file: source_file.into(),
            data: Map::new(),
        }
    }

    /// Build a record from a loosely typed payload.
    ///
    /// Fails with [`WriterError::DataNotObject`] unless `data` is a JSON object,
    /// i.e. a string-keyed mapping.
    pub fn from_value(
        collection_timestamp: impl Into<String>,
        event_timestamp: impl Into<String>,
        source_file: impl Into<String>,
        data: Value,
    ) -> Result<Self, WriterError> {
        let data = match data {
            Value::Object(map) => map,
            other => return Err(WriterError::DataNotObject(value_kind(&other))),
        };
        let mut record = Self::new(collection_timestamp, event_timestamp, source_file);
        record.data = data;
        Ok(record)
    }

    /// Insert one payload entry, builder style.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
