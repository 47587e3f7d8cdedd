//! Global constants for the agent.
//!
//! Output-format tokens live here because they are part of the on-disk
//! contract consumed by downstream tooling.

use std::time::Duration;

/// JSON envelope field holding the run-wide collection time.
pub const ENVELOPE_COLLECTION_TIMESTAMP: &str = "collection_timestamp";

/// JSON envelope field holding the time of the recorded event.
pub const ENVELOPE_EVENT_TIMESTAMP: &str = "event_timestamp";

/// JSON envelope field naming the file the record was extracted from.
pub const ENVELOPE_SOURCE_FILE: &str = "source_file";

/// Fixed CSV header. The second token is `events_timestamp`, not the JSON
/// envelope name; existing parsers depend on it.
pub const CSV_HEADER: [&str; 4] = [
    "collection_timestamp",
    "events_timestamp",
    "source_file",
    "data",
];

/// Interval between two renders of the status table.
pub const STATUS_REPORT_INTERVAL: Duration = Duration::from_secs(2);

/// Timestamp layout used in output file and directory names.
pub const FILE_TIMESTAMP_FORMAT: &str = "%Y%m%d-%H%M%S";

/// Agent log file written inside the logs directory.
pub const AGENT_LOG_FILE: &str = "agent.log";

/// Run summary written inside the logs directory.
pub const SUMMARY_FILE: &str = "collection_summary.json";

/// Default base output directory.
pub const DEFAULT_OUTPUT_DIR: &str = "output";

/// Default root of the evidence tree; "/" means the live host.
pub const DEFAULT_INPUT_DIR: &str = "/";

/// Module selector that expands to every registered module.
pub const ALL_MODULES: &str = "all";

/// Files larger than this are listed but not hashed (in MB).
pub const MAX_HASH_FILE_SIZE_MB: u64 = 64;

/// Buffer size for hashing and archive copies (1MB).
pub const DEFAULT_BUFFER_SIZE: usize = 1024 * 1024;
