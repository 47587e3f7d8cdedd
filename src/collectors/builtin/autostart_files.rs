use std::path::PathBuf;

use anyhow::{Context, Result};
use log::debug;
use walkdir::WalkDir;

use crate::collectors::builtin::rfc3339_from_system_time;
use crate::collectors::module::{Module, ModuleParams, RunSummary};
use crate::constants::MAX_HASH_FILE_SIZE_MB;
use crate::utils::hash::calculate_sha256;

/// Locations where Linux and macOS keep persistence items.
const AUTOSTART_ROOTS: &[&str] = &[
    "/etc/cron.d",
    "/etc/init.d",
    "/etc/systemd/system",
    "/Library/LaunchAgents",
    "/Library/LaunchDaemons",
];

/// Lists and hashes every file below a fixed set of evidence roots.
///
/// Roots are resolved against the run's input directory; missing roots are
/// skipped silently since most hosts only have a few of them.
pub struct FileListingModule {
    name: String,
    description: String,
    roots: Vec<PathBuf>,
    max_hash_size_mb: u64,
}

impl FileListingModule {
    pub fn new<I, P>(name: impl Into<String>, description: impl Into<String>, roots: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self {
            name: name.into(),
            description: description.into(),
            roots: roots.into_iter().map(Into::into).collect(),
            max_hash_size_mb: MAX_HASH_FILE_SIZE_MB,
        }
    }

    /// Cron, init, systemd and launchd persistence locations.
    pub fn autostart() -> Self {
        Self::new(
            "autostart_files",
            "Cron jobs, init scripts, systemd units and launchd plists with hashes",
            AUTOSTART_ROOTS.iter().copied(),
        )
    }

    pub fn with_max_hash_size_mb(mut self, max_hash_size_mb: u64) -> Self {
        self.max_hash_size_mb = max_hash_size_mb;
        self
    }
}

impl Module for FileListingModule {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn run(&self, params: &ModuleParams) -> Result<RunSummary> {
        let mut writer = params
            .create_writer(&self.name, None)
            .with_context(|| format!("Failed to open {} output", self.name))?;
        let mut summary = RunSummary::new();

        for root in &self.roots {
            let root = params.input_path(root);
            if !root.exists() {
                debug!("[{}] {} not present, skipping", self.name, root.display());
                continue;
            }

            for entry in WalkDir::new(&root).follow_links(false).sort_by_file_name() {
                let entry = match entry {
                    Ok(entry) => entry,
                    Err(e) => {
                        summary.warn(&self.name, format!("cannot walk {}: {}", root.display(), e));
                        continue;
                    }
                };
                if entry.file_type().is_dir() {
                    continue;
                }

                let path = entry.path();
                let metadata = match entry.metadata() {
                    Ok(metadata) => metadata,
                    Err(e) => {
                        summary.warn(&self.name, format!("cannot stat {}: {}", path.display(), e));
                        continue;
                    }
                };

                let modified = metadata
                    .modified()
                    .map(rfc3339_from_system_time)
                    .unwrap_or_default();
                let sha256 = if entry.file_type().is_file() {
                    match calculate_sha256(path, self.max_hash_size_mb) {
                        Ok(hash) => hash,
                        Err(e) => {
                            let message = format!("cannot hash {}: {}", path.display(), e);
                            summary.warn(&self.name, message);
                            None
                        }
                    }
                } else {
                    None
                };

                let record = params
                    .record(modified, path.to_string_lossy())
                    .with("file_name", entry.file_name().to_string_lossy().to_string())
                    .with("size", metadata.len())
                    .with("is_symlink", entry.file_type().is_symlink())
                    .with("mode", file_mode(&metadata))
                    .with("sha256", sha256);

                summary.write(&self.name, &mut writer, &record);
            }
        }

        summary.finish_writer(writer)?;
        Ok(summary)
    }
}

#[cfg(unix)]
fn file_mode(metadata: &std::fs::Metadata) -> Option<String> {
    use std::os::unix::fs::PermissionsExt;
    Some(format!("{:o}", metadata.permissions().mode() & 0o7777))
}

#[cfg(not(unix))]
fn file_mode(_metadata: &std::fs::Metadata) -> Option<String> {
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ExportFormat;
    use serde_json::Value;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_lists_and_hashes_files_under_input_dir() {
        let evidence = TempDir::new().unwrap();
        let cron = evidence.path().join("etc/cron.d");
        fs::create_dir_all(cron.join("nested")).unwrap();
        fs::write(cron.join("backdoor"), b"abc").unwrap();
        fs::write(cron.join("nested/other"), b"* * * * * root true").unwrap();

        let out = TempDir::new().unwrap();
        let params =
            ModuleParams::new(ExportFormat::Json, out.path()).with_input_dir(evidence.path());

        let summary = FileListingModule::autostart().run(&params).unwrap();

        assert_eq!(summary.records_written, 2);
        assert!(summary.is_clean());

        let content = fs::read_to_string(&summary.output_files[0]).unwrap();
        let records: Vec<Value> = content
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        let backdoor = records
            .iter()
            .find(|r| r["file_name"] == "backdoor")
            .unwrap();
        assert_eq!(
            backdoor["sha256"],
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(backdoor["size"], 3);
        assert!(backdoor["source_file"].as_str().unwrap().ends_with("backdoor"));
    }

    #[test]
    fn test_missing_roots_yield_empty_output() {
        let evidence = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        let params =
            ModuleParams::new(ExportFormat::Csv, out.path()).with_input_dir(evidence.path());

        let summary = FileListingModule::new("custom", "test roots", ["/does/not/exist"])
            .run(&params)
            .unwrap();

        assert_eq!(summary.records_written, 0);
        assert_eq!(summary.output_files.len(), 1);
        assert!(summary.output_files[0].exists());
    }

    #[test]
    fn test_oversized_files_are_listed_unhashed() {
        let evidence = TempDir::new().unwrap();
        let root = evidence.path().join("data");
        fs::create_dir_all(&root).unwrap();
        fs::write(root.join("large"), vec![1u8; 1024 * 1024 + 1]).unwrap();

        let out = TempDir::new().unwrap();
        let params =
            ModuleParams::new(ExportFormat::Json, out.path()).with_input_dir(evidence.path());

        let summary = FileListingModule::new("listing", "test", ["/data"])
            .with_max_hash_size_mb(1)
            .run(&params)
            .unwrap();

        let content = fs::read_to_string(&summary.output_files[0]).unwrap();
        let record: Value = serde_json::from_str(content.lines().next().unwrap()).unwrap();
        assert!(record["sha256"].is_null());
    }
}
