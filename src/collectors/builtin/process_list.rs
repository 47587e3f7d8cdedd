use anyhow::{Context, Result};
use log::debug;
use sysinfo::{PidExt, ProcessExt, ProcessStatus, System, SystemExt};

use crate::collectors::builtin::rfc3339_from_epoch;
use crate::collectors::module::{Module, ModuleParams, RunSummary};

const NAME: &str = "process_list";

/// One record per running process.
pub struct ProcessListModule;

impl ProcessListModule {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ProcessListModule {
    fn default() -> Self {
        Self::new()
    }
}

fn status_label(status: ProcessStatus) -> &'static str {
    match status {
        ProcessStatus::Run => "running",
        ProcessStatus::Sleep => "sleeping",
        ProcessStatus::Stop => "stopped",
        ProcessStatus::Zombie => "zombie",
        ProcessStatus::Idle => "idle",
        _ => "unknown",
    }
}

impl Module for ProcessListModule {
    fn name(&self) -> &str {
        NAME
    }

    fn description(&self) -> &str {
        "Running processes with parent, command line, executable and start time"
    }

    fn run(&self, params: &ModuleParams) -> Result<RunSummary> {
        let mut writer = params
            .create_writer(NAME, None)
            .context("Failed to open process_list output")?;
        let mut summary = RunSummary::new();

        let mut system = System::new();
        system.refresh_processes();

        let mut processes: Vec<_> = system.processes().iter().collect();
        processes.sort_by_key(|(pid, _)| pid.as_u32());
        debug!("Enumerated {} processes", processes.len());

        for (pid, process) in processes {
            let exe = process.exe().to_string_lossy().to_string();
            let started = rfc3339_from_epoch(process.start_time() as i64).unwrap_or_default();
            let source = if exe.is_empty() {
                format!("/proc/{}", pid.as_u32())
            } else {
                exe.clone()
            };

            let record = params
                .record(started, source)
                .with("pid", pid.as_u32())
                .with("ppid", process.parent().map(|p| p.as_u32()))
                .with("name", process.name())
                .with("cmdline", process.cmd().join(" "))
                .with("exe", exe)
                .with("cwd", process.cwd().to_string_lossy().to_string())
                .with("status", status_label(process.status()))
                .with("memory", process.memory());

            summary.write(NAME, &mut writer, &record);
        }

        summary.finish_writer(writer)?;
        Ok(summary)
    }
}
