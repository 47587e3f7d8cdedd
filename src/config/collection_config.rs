use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::constants::{ALL_MODULES, DEFAULT_INPUT_DIR, DEFAULT_OUTPUT_DIR};
use crate::models::{ExportFormat, Verbosity};

/// Settings of one collection run.
///
/// Every field has a default so a YAML file only needs the keys it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectionConfig {
    /// Module names, or `all`.
    pub modules: Vec<String>,
    pub export_format: ExportFormat,
    pub parallelism: usize,
    /// Batch timeout in seconds; 0 is unbounded.
    pub timeout_secs: u64,
    pub verbosity: Verbosity,
    pub output_dir: PathBuf,
    pub input_dir: PathBuf,
    /// Package the logs directory once the batch is done.
    pub archive: bool,
}

impl Default for CollectionConfig {
    fn default() -> Self {
        Self {
            modules: vec![ALL_MODULES.to_string()],
            export_format: ExportFormat::Json,
            parallelism: num_cpus::get(),
            timeout_secs: 0,
            verbosity: Verbosity::INFO,
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            input_dir: PathBuf::from(DEFAULT_INPUT_DIR),
            archive: true,
        }
    }
}

/// Values given on the command line; `None` keeps the configured value.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub modules: Option<Vec<String>>,
    pub export_format: Option<ExportFormat>,
    pub parallelism: Option<usize>,
    pub timeout_secs: Option<u64>,
    pub verbosity: Option<Verbosity>,
    pub output_dir: Option<PathBuf>,
    pub input_dir: Option<PathBuf>,
    pub no_archive: bool,
}

impl CollectionConfig {
    /// Load configuration from a YAML file
    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config = Self::from_yaml_str(&content)
            .with_context(|| format!("Failed to parse YAML config: {}", path.display()))?;
        debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn from_yaml_str(content: &str) -> Result<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: CollectionConfig = serde_yaml::from_str(content)?;
        Ok(config.normalized())
    }

    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).context("Failed to serialize config to YAML")
    }

    /// Apply command-line values on top of this configuration.
    pub fn merge(mut self, overrides: ConfigOverrides) -> Self {
        if let Some(modules) = overrides.modules {
            self.modules = modules;
        }
        if let Some(format) = overrides.export_format {
            self.export_format = format;
        }
        if let Some(parallelism) = overrides.parallelism {
            self.parallelism = parallelism;
        }
        if let Some(timeout) = overrides.timeout_secs {
            self.timeout_secs = timeout;
        }
        if let Some(verbosity) = overrides.verbosity {
            self.verbosity = verbosity;
        }
        if let Some(output_dir) = overrides.output_dir {
            self.output_dir = output_dir;
        }
        if let Some(input_dir) = overrides.input_dir {
            self.input_dir = input_dir;
        }
        if overrides.no_archive {
            self.archive = false;
        }
        self.normalized()
    }

    /// `None` when the batch is unbounded.
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }

    fn normalized(mut self) -> Self {
        self.parallelism = self.parallelism.max(1);
        self.verbosity = Verbosity::new(self.verbosity.level());
        if self.modules.is_empty() {
            self.modules = vec![ALL_MODULES.to_string()];
        }
        self
    }
}

/// Load the optional YAML file, then apply command-line overrides.
pub fn load_config(path: Option<&Path>, overrides: ConfigOverrides) -> Result<CollectionConfig> {
    let base = match path {
        Some(path) => CollectionConfig::from_yaml_file(path)?,
        None => CollectionConfig::default(),
    };
    Ok(base.merge(overrides))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults() {
        let config = CollectionConfig::default();
        assert_eq!(config.modules, vec!["all"]);
        assert_eq!(config.export_format, ExportFormat::Json);
        assert!(config.parallelism >= 1);
        assert_eq!(config.timeout(), None);
        assert!(config.archive);
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let config = CollectionConfig::from_yaml_str(
            "modules: [shell_history, process_list]\nexport_format: csv\ntimeout_secs: 30\n",
        )
        .unwrap();

        assert_eq!(config.modules, vec!["shell_history", "process_list"]);
        assert_eq!(config.export_format, ExportFormat::Csv);
        assert_eq!(config.timeout(), Some(Duration::from_secs(30)));
        assert_eq!(config.input_dir, PathBuf::from("/"));
    }

    #[test]
    fn test_invalid_yaml_is_rejected() {
        assert!(CollectionConfig::from_yaml_str("export_format: xml\n").is_err());
        assert!(CollectionConfig::from_yaml_str("parallelism: [1").is_err());
    }

    #[test]
    fn test_empty_yaml_is_default() {
        assert_eq!(
            CollectionConfig::from_yaml_str("  \n").unwrap(),
            CollectionConfig::default()
        );
    }

    #[test]
    fn test_overrides_win_over_file() {
        let config = CollectionConfig::from_yaml_str("parallelism: 8\nverbosity: 0\n").unwrap();
        let merged = config.merge(ConfigOverrides {
            parallelism: Some(0),
            verbosity: Some(Verbosity::DEBUG),
            no_archive: true,
            ..ConfigOverrides::default()
        });

        assert_eq!(merged.parallelism, 1);
        assert_eq!(merged.verbosity, Verbosity::DEBUG);
        assert!(!merged.archive);
    }

    #[test]
    fn test_load_config_from_file() {
        let file = NamedTempFile::new().unwrap();
        std::fs::write(file.path(), "output_dir: /evidence/out\narchive: false\n").unwrap();

        let config = load_config(Some(file.path()), ConfigOverrides::default()).unwrap();
        assert_eq!(config.output_dir, PathBuf::from("/evidence/out"));
        assert!(!config.archive);

        let missing = Path::new("/no/such/config.yaml");
        assert!(load_config(Some(missing), ConfigOverrides::default()).is_err());
    }

    #[test]
    fn test_yaml_round_trip_of_defaults() {
        let yaml = CollectionConfig::default().to_yaml().unwrap();
        assert_eq!(
            CollectionConfig::from_yaml_str(&yaml).unwrap(),
            CollectionConfig::default()
        );
    }
}
