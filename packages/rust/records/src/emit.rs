//! Record emitters.

use std::path::Path;

use tracing::info;

use chorekit_sheets::write_table;
use chorekit_shared::{ChangeRecord, ChoreError, Result};

use crate::extract::RecordSchema;

/// Pretty-printed JSON array of records.
pub fn to_json(records: &[ChangeRecord]) -> Result<String> {
    serde_json::to_string_pretty(records)
        .map_err(|e| ChoreError::parse(format!("failed to serialize records: {e}")))
}

/// Write one row per record: `file`, the scalar fields, then one column per
/// group holding its entries as compact JSON.
pub fn write_xlsx(path: &Path, schema: &RecordSchema, records: &[ChangeRecord]) -> Result<()> {
    let mut headers: Vec<&str> = vec!["file"];
    headers.extend(schema.fields.iter().map(String::as_str));
    headers.extend(schema.groups.iter().map(|g| g.element.as_str()));

    let mut rows = Vec::with_capacity(records.len());
    for record in records {
        let mut row = vec![record.source.clone().unwrap_or_default()];
        row.extend(
            schema
                .fields
                .iter()
                .map(|name| record.get(name).unwrap_or_default().to_string()),
        );
        for group in &schema.groups {
            let cell = match record.groups.get(&group.element) {
                Some(entries) if !entries.is_empty() => serde_json::to_string(entries)
                    .map_err(|e| ChoreError::parse(format!("failed to serialize group: {e}")))?,
                _ => String::new(),
            };
            row.push(cell);
        }
        rows.push(row);
    }

    write_table(path, "Records", &headers, &rows)?;
    info!(path = %path.display(), records = records.len(), "wrote record sheet");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    use chorekit_sheets::Workbook;
    use chorekit_shared::{GroupConfig, RecordsConfig};

    fn record(source: &str, nummer: Option<&str>) -> ChangeRecord {
        ChangeRecord {
            source: Some(source.into()),
            fields: vec![
                ("Nummer".into(), nummer.map(String::from)),
                ("Baureihe".into(), Some("BR223".into())),
            ],
            groups: BTreeMap::new(),
        }
    }

    fn schema() -> RecordSchema {
        RecordSchema::from(&RecordsConfig {
            fields: vec!["Nummer".into(), "Baureihe".into()],
            ..RecordsConfig::default()
        })
    }

    #[test]
    fn json_keeps_field_order_and_nulls() {
        let json = to_json(&[record("a.xml", None)]).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value[0]["source"], "a.xml");
        assert!(value[0]["Nummer"].is_null());
        assert_eq!(value[0]["Baureihe"], "BR223");
        assert!(value[0].get("fields").is_none());
        assert!(json.find("Nummer").unwrap() < json.find("Baureihe").unwrap());
    }

    #[test]
    fn json_puts_groups_beside_fields() {
        let mut rec = record("b.xml", Some("4712"));
        rec.groups.insert(
            "SelliSubtask".into(),
            vec![BTreeMap::from([("Titel".to_string(), "Pruefen".to_string())])],
        );
        let value: serde_json::Value = serde_json::from_str(&to_json(&[rec]).unwrap()).unwrap();
        assert_eq!(
            value[0],
            serde_json::json!({
                "source": "b.xml",
                "Nummer": "4712",
                "Baureihe": "BR223",
                "SelliSubtask": [{ "Titel": "Pruefen" }]
            })
        );
    }

    #[test]
    fn xlsx_has_header_and_one_row_per_record() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("records.xlsx");

        let mut schema = schema();
        schema.groups = vec![GroupConfig {
            element: "SelliSubtask".into(),
            fields: Vec::new(),
        }];
        let mut second = record("b.xml", Some("4712"));
        second.groups.insert(
            "SelliSubtask".into(),
            vec![BTreeMap::from([("Titel".to_string(), "Pruefen".to_string())])],
        );

        write_xlsx(&path, &schema, &[record("a.xml", Some("4711")), second]).unwrap();

        let rows = Workbook::open(&path).unwrap().rows(0).unwrap();
        assert_eq!(rows[0], vec!["file", "Nummer", "Baureihe", "SelliSubtask"]);
        assert_eq!(rows[1], vec!["a.xml", "4711", "BR223", ""]);
        assert_eq!(rows[2][3], r#"[{"Titel":"Pruefen"}]"#);
    }
}
