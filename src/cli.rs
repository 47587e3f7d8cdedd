use clap::Parser;
use std::path::PathBuf;

use crate::config::ConfigOverrides;
use crate::models::{ExportFormat, Verbosity};

/// Command-line arguments for the collection agent.
///
/// Every collection option is optional so that values from `--config`, or the
/// built-in defaults, apply when a flag is omitted.
#[derive(Parser, Debug)]
#[clap(name = "dfir-agent", version, about = "Forensic artifact collection agent")]
pub struct Args {
    /// Modules to run: comma-separated names or "all"
    #[clap(short = 'm', long, value_delimiter = ',')]
    pub modules: Option<Vec<String>>,

    /// Export format of module output (json, csv)
    #[clap(short = 'e', long = "export", value_parser = parse_export_format)]
    pub export: Option<ExportFormat>,

    /// Maximum number of modules running at once
    #[clap(short = 'p', long)]
    pub parallel: Option<usize>,

    /// Verbosity: 0 = errors, 1 = info, 2 = debug
    #[clap(short = 'v', long, value_parser = clap::value_parser!(u8).range(0..=2))]
    pub verbosity: Option<u8>,

    /// Batch timeout in seconds (0 = unbounded)
    #[clap(short = 't', long)]
    pub timeout: Option<u64>,

    /// Base output directory
    #[clap(short = 'o', long)]
    pub output: Option<PathBuf>,

    /// Root of the evidence tree ("/" for the live host)
    #[clap(short = 'i', long)]
    pub input: Option<PathBuf>,

    /// Path to configuration YAML file
    #[clap(short = 'c', long)]
    pub config: Option<PathBuf>,

    /// Keep the logs directory unpackaged
    #[clap(long)]
    pub no_archive: bool,

    /// List available modules and exit
    #[clap(long)]
    pub list: bool,
}

fn parse_export_format(value: &str) -> Result<ExportFormat, String> {
    value.parse::<ExportFormat>().map_err(|e| e.to_string())
}

impl Args {
    pub fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            modules: self.modules.clone(),
            export_format: self.export,
            parallelism: self.parallel,
            timeout_secs: self.timeout,
            verbosity: self.verbosity.map(Verbosity::new),
            output_dir: self.output.clone(),
            input_dir: self.input.clone(),
            no_archive: self.no_archive,
        }
    }
}
