//! Export workbook and error log for a collector run.

use std::path::{Path, PathBuf};

use tracing::info;

use chorekit_sheets::{timestamped_path, write_table, write_tsv};
use chorekit_shared::{CollectorConfig, Result};

use crate::engine::CollectReport;

const EXPORT_PREFIX: &str = "Collector_Export";
const ERRORS_PREFIX: &str = "Collector_Export_Errors";

/// Files written by [`write_export`].
#[derive(Debug, Clone)]
pub struct ExportPaths {
    pub export: PathBuf,
    /// Only written when at least one record failed.
    pub errors: Option<PathBuf>,
}

/// Write valid items to `Collector_Export_<ts>.xlsx` and failures to
/// `Collector_Export_Errors_<ts>.log` under `dir`.
pub fn write_export(
    dir: &Path,
    config: &CollectorConfig,
    report: &CollectReport,
) -> Result<ExportPaths> {
    let mut headers: Vec<&str> = vec![config.input_column.as_str()];
    headers.extend(config.fields.iter().map(|f| f.name.as_str()));

    let rows: Vec<Vec<String>> = report
        .valid_items()
        .map(|item| {
            let mut row = vec![item.input.clone()];
            row.extend(
                item.fields
                    .iter()
                    .map(|(_, value)| value.clone().unwrap_or_default()),
            );
            row
        })
        .collect();

    let export = timestamped_path(dir, EXPORT_PREFIX, "xlsx");
    write_table(&export, "Export", &headers, &rows)?;
    info!(path = %export.display(), rows = rows.len(), "wrote export");

    let errors = if report.failures.is_empty() {
        None
    } else {
        let path = timestamped_path(dir, ERRORS_PREFIX, "log");
        let error_rows: Vec<Vec<String>> = report
            .failures
            .iter()
            .map(|f| vec![f.reason.to_string(), format!("[{}]", f.raw.join(", "))])
            .collect();
        write_tsv(&path, &["Error", "User Data"], &error_rows)?;
        info!(path = %path.display(), failures = error_rows.len(), "wrote error log");
        Some(path)
    };

    Ok(ExportPaths { export, errors })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chorekit_sheets::Workbook;
    use chorekit_shared::{
        CollectFailure, CrawledItem, FailureReason, FieldMapping, ItemStatus,
    };

    fn config() -> CollectorConfig {
        CollectorConfig {
            fields: vec![
                FieldMapping {
                    name: "userid".into(),
                    key: "uid".into(),
                },
                FieldMapping {
                    name: "plant".into(),
                    key: "plant".into(),
                },
            ],
            ..CollectorConfig::default()
        }
    }

    fn item(input: &str, plant: Option<&str>) -> CrawledItem {
        let status = match plant {
            Some(_) => ItemStatus::Valid,
            None => ItemStatus::Invalid {
                missing: vec!["plant".into()],
            },
        };
        CrawledItem {
            input: input.into(),
            url: "http://example.test/api".into(),
            fields: vec![
                ("userid".into(), Some("u1".into())),
                ("plant".into(), plant.map(String::from)),
            ],
            status,
        }
    }

    #[test]
    fn exports_only_valid_items_and_logs_failures() {
        let dir = tempfile::tempdir().unwrap();
        let report = CollectReport {
            items: vec![
                item("jane@example.com", Some("Bremen")),
                item("john@example.com", None),
            ],
            failures: vec![CollectFailure {
                input: "john@example.com".into(),
                reason: FailureReason::MissingData,
                detail: "missing: plant".into(),
                raw: vec!["john@example.com".into(), "John".into()],
            }],
        };

        let paths = write_export(dir.path(), &config(), &report).unwrap();

        let rows = Workbook::open(&paths.export).unwrap().rows(0).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0], vec!["email", "userid", "plant"]);
        assert_eq!(rows[1], vec!["jane@example.com", "u1", "Bremen"]);

        let log = std::fs::read_to_string(paths.errors.unwrap()).unwrap();
        assert_eq!(
            log,
            "Error\tUser Data\nRequested data not found\t[john@example.com, John]\n"
        );
    }

    #[test]
    fn no_error_log_without_failures() {
        let dir = tempfile::tempdir().unwrap();
        let report = CollectReport {
            items: vec![item("jane@example.com", Some("Bremen"))],
            failures: Vec::new(),
        };
        let paths = write_export(dir.path(), &config(), &report).unwrap();
        assert!(paths.errors.is_none());
        assert!(paths.export.exists());
    }
}
