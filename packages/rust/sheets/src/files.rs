//! Output paths, archiving and tab-separated logs.

use std::path::{Path, PathBuf};

use chorekit_shared::{ChoreError, Result};
use chrono::Local;
use tracing::info;

/// Timestamp format used in generated file names.
const STAMP_FORMAT: &str = "%Y_%m_%d-%H-%M-%S";

/// `<dir>/<prefix>_<timestamp>.<ext>`.
pub fn timestamped_path(dir: &Path, prefix: &str, ext: &str) -> PathBuf {
    let stamp = Local::now().format(STAMP_FORMAT);
    dir.join(format!("{prefix}_{stamp}.{ext}"))
}

/// The user's Downloads directory, falling back to `~/Downloads`, then `.`.
pub fn default_output_dir() -> PathBuf {
    dirs::download_dir()
        .or_else(|| dirs::home_dir().map(|home| home.join("Downloads")))
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Move `path` into `archive_dir` as `<timestamp>_<file name>`.
pub fn archive_file(path: &Path, archive_dir: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(archive_dir).map_err(|e| ChoreError::io(archive_dir, e))?;

    let name = path
        .file_name()
        .ok_or_else(|| ChoreError::validation(format!("{} has no file name", path.display())))?
        .to_string_lossy();
    let stamp = Local::now().format("%Y_%m_%d-%H-%M");
    let destination = archive_dir.join(format!("{stamp}_{name}"));

    if std::fs::rename(path, &destination).is_err() {
        // Different filesystem: copy, then remove the original.
        std::fs::copy(path, &destination).map_err(|e| ChoreError::io(path, e))?;
        std::fs::remove_file(path).map_err(|e| ChoreError::io(path, e))?;
    }

    info!(from = %path.display(), to = %destination.display(), "archived input file");
    Ok(destination)
}

/// Write a tab-separated file with a header row.
pub fn write_tsv(path: &Path, headers: &[&str], rows: &[Vec<String>]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|e| ChoreError::io(parent, e))?;
        }
    }

    let to_err = |e: csv::Error| ChoreError::io(path, std::io::Error::other(e.to_string()));

    let mut writer = csv::WriterBuilder::new()
        .delimiter(b'\t')
        .flexible(true)
        .from_path(path)
        .map_err(to_err)?;
    writer.write_record(headers).map_err(to_err)?;
    for row in rows {
        writer.write_record(row).map_err(to_err)?;
    }
    writer.flush().map_err(|e| ChoreError::io(path, e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamped_path_shape() {
        let path = timestamped_path(Path::new("/tmp/out"), "Collector_Export", "xlsx");
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("Collector_Export_"));
        assert!(name.ends_with(".xlsx"));
        // prefix + '_' + 19-char stamp + ".xlsx"
        assert_eq!(name.len(), "Collector_Export_".len() + 19 + ".xlsx".len());
    }

    #[test]
    fn archive_moves_file() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("urls.txt");
        std::fs::write(&input, "https://example.com\n").unwrap();

        let archived = archive_file(&input, &dir.path().join("Archive")).unwrap();
        assert!(!input.exists());
        assert!(archived.exists());
        assert!(
            archived
                .file_name()
                .unwrap()
                .to_string_lossy()
                .ends_with("_urls.txt")
        );
    }

    #[test]
    fn tsv_has_header_and_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("errors.log");
        write_tsv(
            &path,
            &["Error", "User Data"],
            &[vec!["Invalid input".into(), "bad-mail".into()]],
        )
        .unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, "Error\tUser Data\nInvalid input\tbad-mail\n");
    }
}
