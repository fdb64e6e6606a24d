//! CSV tables and URL list files.

use std::path::Path;

use chorekit_shared::{ChoreError, Result};
use tracing::debug;

use crate::workbook::Workbook;

/// Candidate delimiters, in tie-break order.
const DELIMITERS: [u8; 4] = [b',', b';', b'\t', b'|'];

/// A CSV file with a header row. Header names are lower-cased.
#[derive(Debug, Clone, Default)]
pub struct CsvTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl CsvTable {
    /// Index of a column by (case-insensitive) header name.
    pub fn column(&self, name: &str) -> Option<usize> {
        let name = name.to_lowercase();
        self.headers.iter().position(|h| *h == name)
    }
}

/// Guess the delimiter of a CSV file from its first line.
///
/// Counts each candidate outside double quotes and picks the most frequent;
/// defaults to `,`.
pub fn sniff_delimiter(first_line: &str) -> u8 {
    let mut counts = [0usize; DELIMITERS.len()];
    let mut in_quotes = false;

    for byte in first_line.bytes() {
        if byte == b'"' {
            in_quotes = !in_quotes;
            continue;
        }
        if in_quotes {
            continue;
        }
        if let Some(i) = DELIMITERS.iter().position(|d| *d == byte) {
            counts[i] += 1;
        }
    }

    let mut best = 0;
    for i in 1..DELIMITERS.len() {
        if counts[i] > counts[best] {
            best = i;
        }
    }
    DELIMITERS[best]
}

/// Parse CSV text with a header row, sniffing the delimiter.
pub fn parse_csv(content: &str) -> Result<CsvTable> {
    let first_line = content.lines().next().unwrap_or_default();
    let delimiter = sniff_delimiter(first_line);

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(content.as_bytes());

    let headers = reader
        .headers()
        .map_err(|e| ChoreError::parse(format!("invalid CSV header: {e}")))?
        .iter()
        .map(str::to_lowercase)
        .collect();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| ChoreError::parse(format!("invalid CSV row: {e}")))?;
        rows.push(record.iter().map(String::from).collect());
    }

    debug!(
        delimiter = %(delimiter as char).escape_default(),
        rows = rows.len(),
        "parsed CSV"
    );

    Ok(CsvTable { headers, rows })
}

/// Read a CSV file with a header row.
pub fn read_csv(path: &Path) -> Result<CsvTable> {
    match extension(path).as_str() {
        "csv" => {}
        other => {
            return Err(ChoreError::validation(format!(
                "unsupported file type '{other}' for {}: only 'csv' is supported",
                path.display()
            )));
        }
    }
    let content = std::fs::read_to_string(path).map_err(|e| ChoreError::io(path, e))?;
    parse_csv(&content)
}

/// Read a list of URLs: the first column of a `.csv` or `.xlsx` file, or
/// one entry per line of a `.txt` file. No header row; blank entries are
/// skipped.
pub fn read_url_list(path: &Path) -> Result<Vec<String>> {
    let entries: Vec<String> = match extension(path).as_str() {
        "txt" => {
            let content = std::fs::read_to_string(path).map_err(|e| ChoreError::io(path, e))?;
            content.lines().map(|l| l.trim().to_string()).collect()
        }
        "csv" => {
            let content = std::fs::read_to_string(path).map_err(|e| ChoreError::io(path, e))?;
            let mut reader = csv::ReaderBuilder::new()
                .has_headers(false)
                .flexible(true)
                .trim(csv::Trim::All)
                .from_reader(content.as_bytes());
            let mut entries = Vec::new();
            for record in reader.records() {
                let record =
                    record.map_err(|e| ChoreError::parse(format!("invalid CSV row: {e}")))?;
                entries.push(record.get(0).unwrap_or_default().to_string());
            }
            entries
        }
        "xlsx" => Workbook::open(path)?
            .rows(0)?
            .into_iter()
            .map(|row| row.into_iter().next().unwrap_or_default())
            .collect(),
        other => {
            return Err(ChoreError::validation(format!(
                "unsupported file type '{other}' for {}: expected 'xlsx', 'txt' or 'csv'",
                path.display()
            )));
        }
    };

    Ok(entries.into_iter().filter(|e| !e.is_empty()).collect())
}

fn extension(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default()
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workbook::write_table;

    #[test]
    fn sniffs_common_delimiters() {
        assert_eq!(sniff_delimiter("email,name,plant"), b',');
        assert_eq!(sniff_delimiter("email;name;plant"), b';');
        assert_eq!(sniff_delimiter("email\tname\tplant"), b'\t');
        assert_eq!(sniff_delimiter("email|name"), b'|');
        assert_eq!(sniff_delimiter("email"), b',');
    }

    #[test]
    fn sniff_ignores_quoted_delimiters() {
        assert_eq!(sniff_delimiter(r#""Doe, Jane";"Doe, John";x"#), b';');
    }

    #[test]
    fn parse_semicolon_csv_lowercases_headers() {
        let table = parse_csv("EMail;Name\njane@example.com; Jane \njohn@example.com;John\n")
            .unwrap();
        assert_eq!(table.headers, vec!["email", "name"]);
        assert_eq!(table.column("EMAIL"), Some(0));
        assert_eq!(table.column("plant"), None);
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[0][1], "Jane");
    }

    #[test]
    fn read_csv_rejects_other_extensions() {
        let result = read_csv(Path::new("people.json"));
        assert!(matches!(result, Err(ChoreError::Validation { .. })));
    }

    #[test]
    fn url_list_from_txt_csv_and_xlsx() {
        let dir = tempfile::tempdir().unwrap();

        let txt = dir.path().join("urls.txt");
        std::fs::write(&txt, "https://a.example.com\n\n  https://b.example.com  \n").unwrap();
        assert_eq!(
            read_url_list(&txt).unwrap(),
            vec!["https://a.example.com", "https://b.example.com"]
        );

        let csv_path = dir.path().join("urls.csv");
        std::fs::write(&csv_path, "https://a.example.com,ignored\nhttps://c.example.com\n")
            .unwrap();
        assert_eq!(
            read_url_list(&csv_path).unwrap(),
            vec!["https://a.example.com", "https://c.example.com"]
        );

        let xlsx = dir.path().join("urls.xlsx");
        write_table(&xlsx, "Sheet1", &["https://first.example.com"], &[vec![
            "https://second.example.com".into(),
        ]])
        .unwrap();
        assert_eq!(
            read_url_list(&xlsx).unwrap(),
            vec!["https://first.example.com", "https://second.example.com"]
        );

        let unsupported = dir.path().join("urls.pdf");
        assert!(read_url_list(&unsupported).is_err());
    }
}
