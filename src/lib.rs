//! # dfir-agent
//!
//! A forensic artifact collection agent. Independent collectors ("modules")
//! each extract one category of host evidence and emit it as uniform
//! [`Record`](models::Record)s; the crate's core is the framework that runs
//! them.
//!
//! ## Overview
//!
//! - **Registry**: explicit `name → Module` map built at startup
//! - **Dispatcher**: runs a selected set of modules on the blocking pool,
//!   bounded by a semaphore, under one shared batch deadline
//! - **Status reporting**: shared per-module state rendered as a live table
//! - **Output contract**: `Record` plus JSON / CSV `DataWriter`s
//!
//! The batch deadline is an annotation, not a kill switch: a module that
//! outlives it is reported as `timeout` while it keeps running, and the
//! dispatcher still waits for it to return.
//!
//! ## Writing a module
//!
//! ```no_run
//! use dfir_agent::collectors::module::{Module, ModuleParams, RunSummary};
//!
//! struct HostsFile;
//!
//! impl Module for HostsFile {
//!     fn name(&self) -> &str { "hosts_file" }
//!     fn description(&self) -> &str { "Static name resolution entries" }
//!
//!     fn run(&self, params: &ModuleParams) -> anyhow::Result<RunSummary> {
//!         let path = params.input_path("/etc/hosts");
//!         let content = std::fs::read_to_string(&path)?;
//!         let mut writer = params.create_writer(self.name(), None)?;
//!         let mut summary = RunSummary::new();
//!         for line in content.lines().filter(|l| !l.starts_with('#')) {
//!             let record = params
//!                 .record("", path.to_string_lossy())
//!                 .with("entry", line);
//!             summary.write(self.name(), &mut writer, &record);
//!         }
//!         summary.finish_writer(writer)?;
//!         Ok(summary)
//!     }
//! }
//! ```
//!
//! ## Module Organization
//!
//! - [`cli`]: Command-line interface definitions
//! - [`config`]: YAML configuration merged with CLI flags
//! - [`models`]: Export format, verbosity and the `Record` envelope
//! - [`collectors`]: Module trait, registry, dispatcher, status, built-ins
//! - [`utils`]: Writers, run summary, packaging, hashing
//! - [`constants`]: Output-format tokens and defaults

/// Command-line interface definitions and argument parsing
pub mod cli;

/// Run configuration
pub mod config;

/// Core data models
pub mod models;

/// Module orchestration framework and built-in collectors
pub mod collectors;

/// Record writers, summaries, packaging and hashing
pub mod utils;

/// Application constants
pub mod constants;
