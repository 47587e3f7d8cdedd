use anyhow::{Context, Result};
use log::debug;
use sysinfo::{CpuExt, System, SystemExt};

use crate::collectors::builtin::rfc3339_from_epoch;
use crate::collectors::module::{Module, ModuleParams, RunSummary};

const NAME: &str = "system_info";

/// Host identity: name, OS, kernel, CPU and memory.
pub struct SystemInfoModule;

impl SystemInfoModule {
    pub fn new() -> Self {
        Self
    }
}

impl Default for SystemInfoModule {
    fn default() -> Self {
        Self::new()
    }
}

impl Module for SystemInfoModule {
    fn name(&self) -> &str {
        NAME
    }

    fn description(&self) -> &str {
        "Host name, operating system, kernel, CPU and memory of the live system"
    }

    fn run(&self, params: &ModuleParams) -> Result<RunSummary> {
        let mut writer = params
            .create_writer(NAME, None)
            .context("Failed to open system_info output")?;
        let mut summary = RunSummary::new();

        let mut system = System::new();
        system.refresh_cpu();
        system.refresh_memory();
        debug!("Refreshed CPU and memory information");

        let cpus = system.cpus();
        let record = params
            .record(params.collection_timestamp.clone(), "sysinfo")
            .with("hostname", system.host_name().unwrap_or_default())
            .with("os_name", system.name().unwrap_or_default())
            .with("os_version", system.long_os_version().unwrap_or_default())
            .with("kernel_version", system.kernel_version().unwrap_or_default())
            .with(
                "boot_time",
                rfc3339_from_epoch(system.boot_time() as i64).unwrap_or_default(),
            )
            .with("uptime_secs", system.uptime())
            .with("cpu_count", cpus.len())
            .with(
                "cpu_brand",
                cpus.first().map(|c| c.brand().to_string()).unwrap_or_default(),
            )
            .with("total_memory", system.total_memory())
            .with("used_memory", system.used_memory())
            .with("total_swap", system.total_swap());

        summary.write(NAME, &mut writer, &record);
        summary.finish_writer(writer)?;
        Ok(summary)
    }
}
