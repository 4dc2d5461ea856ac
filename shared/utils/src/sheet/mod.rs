//! Spreadsheet intake module
//!
//! Format-detecting parser for uploaded MTO sheets.
//! Supports CSV and Excel (XLSX/XLS) uploads.

pub mod parser;

pub use parser::{Cell, ParsedSheet, SheetFormat, SheetParser};
