use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::info;
use serde_json::json;
use uuid::Uuid;

use crate::collectors::dispatcher::DispatchReport;
use crate::collectors::module::ModuleParams;
use crate::collectors::status::ModuleState;
use crate::constants::SUMMARY_FILE;

/// Create a JSON summary of the run.
///
/// The summary is the chain-of-custody record of what was attempted: one
/// entry per dispatched module with its final state, elapsed time, record
/// count, output files, non-fatal warnings and error.
///
/// # Example Output
///
/// ```json
/// {
///   "collection_id": "550e8400-e29b-41d4-a716-446655440000",
///   "hostname": "workstation-01",
///   "collection_timestamp": "2024-01-15T14:30:52Z",
///   "modules": [{"name": "system_info", "state": "completed", ...}],
///   "totals": {"completed": 3, "failed": 1, "timeout": 0, "records": 812}
/// }
/// ```
pub fn create_collection_summary(
    hostname: &str,
    params: &ModuleParams,
    report: &DispatchReport,
) -> Result<String> {
    let modules: Vec<_> = report
        .outcomes
        .iter()
        .map(|outcome| {
            json!({
                "name": outcome.name,
                "state": outcome.state,
                "elapsed_secs": outcome.elapsed_secs,
                "records_written": outcome.records_written(),
                "output_files": relative_paths(outcome.output_files(), &params.logs_dir),
                "warnings": outcome
                    .summary
                    .as_ref()
                    .map(|s| s.warnings.clone())
                    .unwrap_or_default(),
                "error": outcome.error,
            })
        })
        .collect();

    let summary = json!({
        "collection_id": Uuid::new_v4().to_string(),
        "hostname": hostname,
        "collection_timestamp": params.collection_timestamp,
        "export_format": params.export_format,
        "input_dir": params.input_dir,
        "os": std::env::consts::OS,
        "agent_version": env!("CARGO_PKG_VERSION"),
        "modules": modules,
        "totals": {
            "completed": report.count(ModuleState::Completed),
            "failed": report.count(ModuleState::Failed),
            "timeout": report.count(ModuleState::Timeout),
            "records": report.total_records(),
        },
    });

    serde_json::to_string_pretty(&summary).context("Failed to serialize collection summary to JSON")
}

/// Write the summary into the logs directory.
pub fn write_collection_summary(
    hostname: &str,
    params: &ModuleParams,
    report: &DispatchReport,
) -> Result<PathBuf> {
    let summary = create_collection_summary(hostname, params, report)?;
    let path = params.logs_dir.join(SUMMARY_FILE);
    fs::write(&path, summary).context("Failed to write collection summary")?;
    info!("Collection summary written to {}", path.display());
    Ok(path)
}

fn relative_paths(paths: &[PathBuf], base: &Path) -> Vec<String> {
    paths
        .iter()
        .map(|p| {
            p.strip_prefix(base)
                .unwrap_or(p)
                .to_string_lossy()
                .replace('\\', "/")
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collectors::dispatcher::ModuleOutcome;
    use crate::collectors::module::RunSummary;
    use crate::models::ExportFormat;
    use serde_json::Value;
    use tempfile::TempDir;

    fn report(logs_dir: &Path) -> DispatchReport {
        DispatchReport {
            outcomes: vec![
                ModuleOutcome {
                    name: "shell_history".to_string(),
                    state: ModuleState::Completed,
                    elapsed_secs: 0.25,
                    summary: Some(RunSummary {
                        records_written: 12,
                        output_files: vec![
                            logs_dir.join("shell_history-bash-20240101-000000.json")
                        ],
                        warnings: vec!["cannot read /root/.bash_history".to_string()],
                    }),
                    error: None,
                },
                ModuleOutcome {
                    name: "usb".to_string(),
                    state: ModuleState::Failed,
                    elapsed_secs: 0.0,
                    summary: None,
                    error: Some("module not found: usb".to_string()),
                },
            ],
        }
    }

    #[test]
    fn test_summary_contents() {
        let dir = TempDir::new().unwrap();
        let params = ModuleParams::new(ExportFormat::Json, dir.path());

        let json_str =
            create_collection_summary("test-host", &params, &report(dir.path())).unwrap();
        let json: Value = serde_json::from_str(&json_str).unwrap();

        assert_eq!(json["hostname"], "test-host");
        assert_eq!(json["collection_timestamp"], params.collection_timestamp.as_str());
        assert_eq!(json["export_format"], "json");
        assert!(json["collection_id"].is_string());
        assert_eq!(json["modules"].as_array().unwrap().len(), 2);
        assert_eq!(json["modules"][0]["state"], "completed");
        assert_eq!(
            json["modules"][0]["output_files"][0],
            "shell_history-bash-20240101-000000.json"
        );
        assert_eq!(json["modules"][0]["warnings"].as_array().unwrap().len(), 1);
        assert_eq!(json["modules"][1]["error"], "module not found: usb");
        assert_eq!(json["totals"]["completed"], 1);
        assert_eq!(json["totals"]["failed"], 1);
        assert_eq!(json["totals"]["records"], 12);
    }

    #[test]
    fn test_unique_collection_ids() {
        let dir = TempDir::new().unwrap();
        let params = ModuleParams::new(ExportFormat::Json, dir.path());
        let report = report(dir.path());

        let first = create_collection_summary("h", &params, &report).unwrap();
        let second = create_collection_summary("h", &params, &report).unwrap();
        let first: Value = serde_json::from_str(&first).unwrap();
        let second: Value = serde_json::from_str(&second).unwrap();

        assert_ne!(first["collection_id"], second["collection_id"]);
    }

    #[test]
    fn test_write_collection_summary() {
        let dir = TempDir::new().unwrap();
        let params = ModuleParams::new(ExportFormat::Csv, dir.path());

        let path = write_collection_summary("h", &params, &DispatchReport::default()).unwrap();

        assert_eq!(path, dir.path().join(SUMMARY_FILE));
        let json: Value = serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(json["modules"].as_array().unwrap().len(), 0);
    }
}
