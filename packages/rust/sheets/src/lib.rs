//! Spreadsheet and tabular file I/O shared by the chorekit tools.
//!
//! This crate provides:
//! - [`Workbook`]: read/modify/write of `.xlsx` files, cell by cell
//! - [`write_table`]: create a fresh `.xlsx` export from rows
//! - [`CsvTable`] and [`read_url_list`]: delimiter-sniffing CSV and list input
//! - [`files`]: timestamped output paths, archiving, TSV logs

pub mod files;
pub mod tabular;
pub mod workbook;

pub use files::{archive_file, default_output_dir, timestamped_path, write_tsv};
pub use tabular::{CsvTable, parse_csv, read_csv, read_url_list, sniff_delimiter};
pub use workbook::{Workbook, write_table};
