//! Collectors shipped with the agent.
//!
//! They double as reference implementations of the [`Module`] contract: open
//! a writer through [`ModuleParams::create_writer`], emit records, downgrade
//! per-record problems to warnings, close the writer.
//!
//! [`ModuleParams::create_writer`]: crate::collectors::module::ModuleParams::create_writer

use std::sync::Arc;
use std::time::SystemTime;

use chrono::{DateTime, SecondsFormat, Utc};

use crate::collectors::module::Module;
use crate::collectors::registry::ModuleRegistry;

mod autostart_files;
mod process_list;
mod shell_history;
mod system_info;

pub use autostart_files::FileListingModule;
pub use process_list::ProcessListModule;
pub use shell_history::{parse_bash_history, parse_zsh_history, HistoryEntry, ShellHistoryModule};
pub use system_info::SystemInfoModule;

/// Constructors of every built-in module, in registration order.
pub fn builtin_modules() -> Vec<Arc<dyn Module>> {
    vec![
        Arc::new(SystemInfoModule::new()),
        Arc::new(ProcessListModule::new()),
        Arc::new(FileListingModule::autostart()),
        Arc::new(ShellHistoryModule::new()),
    ]
}

/// Registry holding every built-in module.
pub fn default_registry() -> ModuleRegistry {
    ModuleRegistry::from_modules(builtin_modules())
}

pub(crate) fn rfc3339_from_epoch(secs: i64) -> Option<String> {
    DateTime::<Utc>::from_timestamp(secs, 0).map(|t| t.to_rfc3339_opts(SecondsFormat::Secs, true))
}

pub(crate) fn rfc3339_from_system_time(time: SystemTime) -> String {
    DateTime::<Utc>::from(time).to_rfc3339_opts(SecondsFormat::Secs, true)
}
