//! `.xlsx` workbooks backed by `umya-spreadsheet`.
//!
//! Cells are addressed with 1-based `(column, row)` pairs, as in the
//! spreadsheet UI. Untouched cells keep their content and formatting when the
//! workbook is saved back.

use std::path::{Path, PathBuf};

use chorekit_shared::{ChoreError, Result};
use tracing::debug;
use umya_spreadsheet::{Spreadsheet, Worksheet};

/// An open workbook and the path it was loaded from.
pub struct Workbook {
    path: PathBuf,
    book: Spreadsheet,
}

impl Workbook {
    /// Load an existing `.xlsx` file.
    pub fn open(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(ChoreError::io(
                path,
                std::io::Error::new(std::io::ErrorKind::NotFound, "workbook not found"),
            ));
        }

        let book = umya_spreadsheet::reader::xlsx::read(path).map_err(|e| {
            ChoreError::Spreadsheet(format!("failed to read {}: {e}", path.display()))
        })?;
        debug!(path = %path.display(), "opened workbook");

        Ok(Self {
            path: path.to_path_buf(),
            book,
        })
    }

    /// Path the workbook was loaded from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Last used row of a sheet (0 for an empty sheet).
    pub fn last_row(&self, sheet: usize) -> Result<u32> {
        Ok(self.sheet(sheet)?.get_highest_row())
    }

    /// Trimmed cell text, `None` when the cell is empty.
    pub fn text(&self, sheet: usize, column: u32, row: u32) -> Result<Option<String>> {
        let value = self.sheet(sheet)?.get_value((column, row));
        let trimmed = value.trim();
        Ok((!trimmed.is_empty()).then(|| trimmed.to_string()))
    }

    /// Store `value` as a string cell.
    pub fn set_text(&mut self, sheet: usize, column: u32, row: u32, value: &str) -> Result<()> {
        let worksheet = self
            .book
            .get_sheet_mut(&sheet)
            .ok_or_else(|| missing_sheet(&self.path, sheet))?;
        worksheet
            .get_cell_mut((column, row))
            .set_value_string(value);
        Ok(())
    }

    /// Every row of a sheet as trimmed strings, up to the last used column.
    pub fn rows(&self, sheet: usize) -> Result<Vec<Vec<String>>> {
        let worksheet = self.sheet(sheet)?;
        let last_row = worksheet.get_highest_row();
        let last_column = worksheet.get_highest_column();

        Ok((1..=last_row)
            .map(|row| {
                (1..=last_column)
                    .map(|column| worksheet.get_value((column, row)).trim().to_string())
                    .collect()
            })
            .collect())
    }

    /// Write the workbook back to where it was loaded from.
    pub fn save(&self) -> Result<()> {
        self.save_as(&self.path)
    }

    /// Write the workbook to `path`.
    pub fn save_as(&self, path: &Path) -> Result<()> {
        ensure_parent(path)?;
        umya_spreadsheet::writer::xlsx::write(&self.book, path).map_err(|e| {
            ChoreError::Spreadsheet(format!("failed to write {}: {e}", path.display()))
        })?;
        debug!(path = %path.display(), "saved workbook");
        Ok(())
    }

    fn sheet(&self, index: usize) -> Result<&Worksheet> {
        self.book
            .get_sheet(&index)
            .ok_or_else(|| missing_sheet(&self.path, index))
    }
}

fn missing_sheet(path: &Path, index: usize) -> ChoreError {
    ChoreError::Spreadsheet(format!("{} has no sheet #{index}", path.display()))
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|e| ChoreError::io(parent, e))?;
        }
    }
    Ok(())
}

/// Create a new single-sheet `.xlsx` with a header row followed by `rows`.
pub fn write_table(
    path: &Path,
    sheet_name: &str,
    headers: &[&str],
    rows: &[Vec<String>],
) -> Result<()> {
    let mut book = umya_spreadsheet::new_file();
    let sheet = book
        .get_sheet_mut(&0)
        .ok_or_else(|| ChoreError::Spreadsheet("new workbook has no sheet".into()))?;
    sheet.set_name(sheet_name);

    for (column, header) in (1u32..).zip(headers) {
        sheet.get_cell_mut((column, 1)).set_value_string(*header);
    }
    for (row, values) in (2u32..).zip(rows) {
        for (column, value) in (1u32..).zip(values) {
            sheet.get_cell_mut((column, row)).set_value_string(value.as_str());
        }
    }

    ensure_parent(path)?;
    umya_spreadsheet::writer::xlsx::write(&book, path)
        .map_err(|e| ChoreError::Spreadsheet(format!("failed to write {}: {e}", path.display())))?;
    debug!(path = %path.display(), rows = rows.len(), "wrote table");
    Ok(())
}
