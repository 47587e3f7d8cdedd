//! Output plumbing shared by every module and by the bootstrap.
//!
//! ## Components
//!
//! - **DataWriter**: JSON / CSV record serialization, one file per writer
//! - **Summary**: the per-run `collection_summary.json`
//! - **Compression**: ZIP packaging of the logs directory
//! - **Hashing**: SHA-256 of collected files
//!
//! ## Writing records
//!
//! ```no_run
//! use dfir_agent::models::Record;
//! use dfir_agent::utils::data_writer::DataWriter;
//! use std::path::Path;
//!
//! # fn example() -> anyhow::Result<()> {
//! let mut writer = DataWriter::new(Path::new("/tmp/logs"), "usb-20240101-000000", "csv")?;
//! let record = Record::new("2024-01-01T00:00:00Z", "2023-12-30T08:15:00Z", "/var/log/syslog")
//!     .with("Vendor ID", "0781")
//!     .with("serial", "4C530001");
//! writer.write_record(&record)?;
//! writer.close()?;
//! # Ok(())
//! # }
//! ```

/// Record serializers (JSON, CSV)
pub mod data_writer;

/// Collection summary generation
pub mod summary;

/// Logs directory packaging
pub mod compress;

/// Cryptographic hash calculation utilities
pub mod hash;
