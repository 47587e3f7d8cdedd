use std::fs::{self, File};
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use log::{debug, info, warn};
use walkdir::WalkDir;
use zip::{write::FileOptions, CompressionMethod, ZipWriter};

/// Package a run's logs directory as `<dest_dir>/<hostname>.<stamp>.zip`.
///
/// Entries are stored relative to the logs directory's parent, so the archive
/// unpacks into a single `<hostname>.<stamp>/` folder.
///
/// # Example
///
/// ```no_run
/// # use std::path::Path;
/// # use dfir_agent::utils::compress::compress_logs_dir;
/// let archive = compress_logs_dir(
///     Path::new("output/host01.20240115-143052"),
///     Path::new("output"),
///     "host01",
///     "20240115-143052",
/// )?;
/// # Ok::<(), anyhow::Error>(())
/// ```
pub fn compress_logs_dir(
    logs_dir: &Path,
    dest_dir: &Path,
    hostname: &str,
    stamp: &str,
) -> Result<PathBuf> {
    let start = Instant::now();
    let archive_path = dest_dir.join(format!("{}.{}.zip", hostname, stamp));
    info!("Packaging {} into {}", logs_dir.display(), archive_path.display());

    let file = File::create(&archive_path).context("Failed to create archive file")?;
    if let Err(e) = write_archive(logs_dir, file) {
        if let Err(remove_err) = fs::remove_file(&archive_path) {
            warn!(
                "Failed to remove partial archive {}: {}",
                archive_path.display(),
                remove_err
            );
        }
        return Err(e);
    }

    info!(
        "Archive written to {} in {:?} ({} bytes)",
        archive_path.display(),
        start.elapsed(),
        fs::metadata(&archive_path).map(|m| m.len()).unwrap_or(0)
    );
    Ok(archive_path)
}

fn write_archive(logs_dir: &Path, file: File) -> Result<()> {
    let base = logs_dir.parent().unwrap_or(logs_dir);
    let mut zip = ZipWriter::new(file);
    let options = FileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .unix_permissions(0o644);

    for entry in WalkDir::new(logs_dir).sort_by_file_name() {
        let entry = entry.context("Failed to walk logs directory")?;
        let path = entry.path();
        let name = path
            .strip_prefix(base)
            .unwrap_or(path)
            .to_string_lossy()
            .replace('\\', "/");

        if entry.file_type().is_dir() {
            zip.add_directory(format!("{}/", name), options)
                .with_context(|| format!("Failed to add directory {}", name))?;
            continue;
        }

        zip.start_file(name.as_str(), options)
            .with_context(|| format!("Failed to start archive entry {}", name))?;
        let mut reader = BufReader::new(
            File::open(path).with_context(|| format!("Failed to open {}", path.display()))?,
        );
        let copied = io::copy(&mut reader, &mut zip)
            .with_context(|| format!("Failed to archive {}", path.display()))?;
        debug!("Archived {} ({} bytes)", name, copied);
    }

    zip.finish().context("Failed to finalize archive")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use tempfile::TempDir;
    use zip::read::ZipArchive;

    #[test]
    fn test_compress_logs_dir() {
        let out = TempDir::new().unwrap();
        let logs_dir = out.path().join("host01.20240101-000000");
        fs::create_dir_all(logs_dir.join("nested")).unwrap();
        fs::write(logs_dir.join("agent.log"), "started\n").unwrap();
        fs::write(logs_dir.join("nested/usb-20240101-000000.json"), "{}\n").unwrap();

        let archive =
            compress_logs_dir(&logs_dir, out.path(), "host01", "20240101-000000").unwrap();
        assert_eq!(archive, out.path().join("host01.20240101-000000.zip"));

        let mut zip = ZipArchive::new(File::open(&archive).unwrap()).unwrap();
        let mut log = String::new();
        zip.by_name("host01.20240101-000000/agent.log")
            .unwrap()
            .read_to_string(&mut log)
            .unwrap();
        assert_eq!(log, "started\n");
        assert!(zip
            .by_name("host01.20240101-000000/nested/usb-20240101-000000.json")
            .is_ok());
    }

    #[test]
    fn test_missing_logs_dir_fails() {
        let out = TempDir::new().unwrap();
        let result = compress_logs_dir(&out.path().join("absent"), out.path(), "h", "s");
        assert!(result.is_err());
        assert!(!out.path().join("h.s.zip").exists());
    }
}
