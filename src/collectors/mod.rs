//! Module orchestration framework.
//!
//! Every artifact collector is a [`Module`](module::Module). Modules are held
//! in an explicit [`ModuleRegistry`](registry::ModuleRegistry), dispatched in
//! batches by the [`Dispatcher`](dispatcher::Dispatcher), and observed through
//! a shared [`StatusBoard`](status::StatusBoard).
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │   Status Reporter (read-only ticker)    │
//! ├─────────────────────────────────────────┤
//! │   Dispatcher                            │
//! │   semaphore(P) + shared batch deadline  │
//! ├─────────────────────────────────────────┤
//! │   Module Registry  (name → Module)      │
//! ├─────────────────────────────────────────┤
//! │   Modules → Records → DataWriter        │
//! │  ┌─────────┬──────────┬──────────┐      │
//! │  │ sysinfo │ history  │ autostart│ ...  │
//! │  └─────────┴──────────┴──────────┘      │
//! └─────────────────────────────────────────┘
//! ```
//!
//! ## Usage Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use dfir_agent::collectors::builtin::default_registry;
//! use dfir_agent::collectors::dispatcher::{DispatchOptions, Dispatcher};
//! use dfir_agent::collectors::module::ModuleParams;
//! use dfir_agent::models::ExportFormat;
//!
//! # async fn example() {
//! let registry = Arc::new(default_registry());
//! let names = registry.expand_selection(&["all"]);
//! let params = Arc::new(ModuleParams::new(ExportFormat::Json, "/tmp/collection"));
//!
//! let dispatcher = Dispatcher::new(registry);
//! let report = dispatcher.dispatch(&names, params, DispatchOptions::from_secs(4, 300)).await;
//! println!("{} records", report.total_records());
//! # }
//! ```

/// The `Module` capability, run parameters and run summaries
pub mod module;

/// Name to module lookup
pub mod registry;

/// Bounded, deadline-annotated batch execution
pub mod dispatcher;

/// Per-module status and the live status table
pub mod status;

/// Collectors shipped with the agent
pub mod builtin;
