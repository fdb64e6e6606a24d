//! URL check report: counts, mail body and the xlsx attachment.

use std::path::{Path, PathBuf};

use chrono::{Local, NaiveDate};
use tracing::info;

use chorekit_sheets::{timestamped_path, write_table};
use chorekit_shared::{CheckStatus, Result, UrlCheckResult};

const REPORT_HEADERS: [&str; 9] = [
    "URL",
    "Status",
    "Reachable",
    "Certificate valid",
    "HTTP status",
    "Overall Grade",
    "Grade cap reasons",
    "Grade warning",
    "Notes",
];

/// `Logfiles/Logfiles_<YYYY-MM-DD>` relative to the working directory.
pub fn default_report_dir() -> PathBuf {
    PathBuf::from("Logfiles").join(format!("Logfiles_{}", Local::now().format("%Y-%m-%d")))
}

/// Occurrence counts shown in the mail.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReportSummary {
    pub invalid: usize,
    pub unreachable: usize,
    pub certificate_invalid: usize,
    pub grade_ok: usize,
    pub grade_not_ok: usize,
    pub total: usize,
}

/// Results of one run, ordered invalid → unreachable → reachable.
#[derive(Debug, Clone)]
pub struct Report {
    results: Vec<UrlCheckResult>,
    date: NaiveDate,
}

impl Report {
    /// Build a report dated today.
    pub fn new(results: Vec<UrlCheckResult>) -> Self {
        Self::dated(results, Local::now().date_naive())
    }

    /// Build a report with an explicit date.
    pub fn dated(mut results: Vec<UrlCheckResult>, date: NaiveDate) -> Self {
        // Stable: input order is kept within each status.
        results.sort_by_key(|r| r.status);
        Self { results, date }
    }

    pub fn results(&self) -> &[UrlCheckResult] {
        &self.results
    }

    pub fn summary(&self) -> ReportSummary {
        let mut summary = ReportSummary {
            total: self.results.len(),
            ..ReportSummary::default()
        };
        for result in &self.results {
            match result.status {
                CheckStatus::Invalid => summary.invalid += 1,
                CheckStatus::Unreachable => summary.unreachable += 1,
                CheckStatus::Reachable => {}
            }
            if result.certificate_valid == Some(false) {
                summary.certificate_invalid += 1;
            }
            match &result.grade {
                Some(grade) if grade.is_ok() => summary.grade_ok += 1,
                Some(_) => summary.grade_not_ok += 1,
                None => {}
            }
        }
        summary
    }

    pub fn subject(&self) -> String {
        format!(
            "[Automatic Security Log] Summary of URL verification results on {}",
            self.date.format("%Y-%m-%d")
        )
    }

    /// HTML mail body with the summary table.
    pub fn html(&self) -> String {
        let s = self.summary();
        let row = |label: &str, count: usize| {
            format!("      <tr><td>{label}</td><td align=\"center\">{count}</td></tr>\n")
        };

        let mut rows = String::new();
        rows.push_str(&row("Invalid URLs", s.invalid));
        rows.push_str(&row("Unreachable", s.unreachable));
        rows.push_str(&row("Certificate invalid", s.certificate_invalid));
        rows.push_str(&row("Grade is ok", s.grade_ok));
        rows.push_str(&row("Grade is not ok", s.grade_not_ok));

        format!(
            r#"<html>
  <body>
    <p>Hello,<br><br>
    here is a summary of the automatic URL verification run on {date}:</p>
    <table border="2">
      <tr><th width="250">Status</th><th width="100">Occurrences</th></tr>
{rows}      <tfoot><tr><td bgcolor="lightgrey"><strong>Checked URLs</strong></td><td bgcolor="lightgrey" align="center"><strong>{total}</strong></td></tr></tfoot>
    </table>
    <p>The attached workbook lists every URL with its result.<br>
    This message was generated automatically.</p>
  </body>
</html>
"#,
            date = self.date.format("%Y-%m-%d"),
            total = s.total,
        )
    }

    /// Write `Security_Check_<timestamp>.xlsx` into `dir`.
    pub fn write_xlsx(&self, dir: &Path) -> Result<PathBuf> {
        let rows: Vec<Vec<String>> = self.results.iter().map(report_row).collect();
        let path = timestamped_path(dir, "Security_Check", "xlsx");
        write_table(&path, "Report", &REPORT_HEADERS, &rows)?;
        info!(path = %path.display(), rows = rows.len(), "wrote report");
        Ok(path)
    }
}

fn report_row(result: &UrlCheckResult) -> Vec<String> {
    let yes_no = |value: bool| (if value { "yes" } else { "no" }).to_string();
    let grade = result.grade.clone().unwrap_or_default();
    vec![
        result.url.clone(),
        result.status.to_string(),
        yes_no(result.reachable),
        result.certificate_valid.map(yes_no).unwrap_or_default(),
        result
            .http_status
            .map(|s| s.to_string())
            .unwrap_or_default(),
        grade.overall,
        grade.cap_reasons,
        grade.warning,
        result.notes.clone(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use chorekit_sheets::Workbook;
    use chorekit_shared::Grade;

    fn reachable(url: &str, cert: Option<bool>, overall: Option<&str>) -> UrlCheckResult {
        UrlCheckResult {
            url: url.into(),
            status: CheckStatus::Reachable,
            reachable: true,
            certificate_valid: cert,
            http_status: Some(200),
            grade: overall.map(|o| Grade {
                overall: o.into(),
                ..Grade::default()
            }),
            notes: String::new(),
        }
    }

    fn unreachable(url: &str) -> UrlCheckResult {
        UrlCheckResult {
            status: CheckStatus::Unreachable,
            reachable: false,
            certificate_valid: None,
            http_status: None,
            grade: None,
            notes: "connection refused".into(),
            url: url.into(),
        }
    }

    fn sample() -> Report {
        Report::dated(
            vec![
                reachable("https://a.example.com", Some(true), Some("A+")),
                unreachable("https://down.example.com"),
                UrlCheckResult::invalid("nonsense", "not a URL"),
                reachable("https://b.example.com", Some(false), Some("T")),
                reachable("http://c.example.com", None, None),
            ],
            NaiveDate::from_ymd_opt(2025, 2, 8).unwrap(),
        )
    }

    #[test]
    fn results_are_ordered_by_status() {
        let report = sample();
        let urls: Vec<_> = report.results().iter().map(|r| r.url.as_str()).collect();
        assert_eq!(
            urls,
            vec![
                "nonsense",
                "https://down.example.com",
                "https://a.example.com",
                "https://b.example.com",
                "http://c.example.com",
            ]
        );
    }

    #[test]
    fn summary_counts() {
        assert_eq!(
            sample().summary(),
            ReportSummary {
                invalid: 1,
                unreachable: 1,
                certificate_invalid: 1,
                grade_ok: 1,
                grade_not_ok: 1,
                total: 5,
            }
        );
    }

    #[test]
    fn subject_and_html() {
        let report = sample();
        assert_eq!(
            report.subject(),
            "[Automatic Security Log] Summary of URL verification results on 2025-02-08"
        );
        let html = report.html();
        assert!(html.contains("<td>Invalid URLs</td><td align=\"center\">1</td>"));
        assert!(html.contains("<strong>5</strong>"));
    }

    #[test]
    fn xlsx_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = sample().write_xlsx(dir.path()).unwrap();
        let rows = Workbook::open(&path).unwrap().rows(0).unwrap();

        assert_eq!(rows.len(), 6);
        assert_eq!(rows[0][0], "URL");
        assert_eq!(rows[1][0], "nonsense");
        assert_eq!(rows[1][1], "Invalid URL");
        assert_eq!(rows[4][3], "no");
        assert_eq!(rows[4][5], "T");
    }
}
