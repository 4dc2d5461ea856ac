//! Spreadsheet file parser.
//!
//! Format-detecting reader for uploaded MTO sheets (CSV and Excel). The
//! parser only separates the header row from data rows and lifts cells into
//! a neutral value type; schema derivation and per-field coercion happen
//! downstream against the owning project's derived schema.

use std::path::Path;

use calamine::{open_workbook_from_rs, DataType, Reader, Xlsx};
use chrono::{Duration, NaiveDate, NaiveDateTime};

use crate::error::{TakeoffError, TakeoffResult};

/// Supported upload formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SheetFormat {
    Csv,
    Excel, // XLSX/XLS
}

impl SheetFormat {
    /// Detect format from file extension
    pub fn from_extension(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_lowercase();
        match ext.as_str() {
            "csv" => Some(Self::Csv),
            "xlsx" | "xls" => Some(Self::Excel),
            _ => None,
        }
    }

    /// Detect format from content type header
    pub fn from_content_type(content_type: &str) -> Option<Self> {
        match content_type {
            "text/csv" | "application/csv" => Some(Self::Csv),
            "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet" => {
                Some(Self::Excel)
            }
            "application/vnd.ms-excel" => Some(Self::Excel),
            _ => None,
        }
    }
}

/// One cell lifted out of the source file, before schema coercion.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Empty,
    Text(String),
    Number(f64),
    Bool(bool),
    DateTime(NaiveDateTime),
}

impl Cell {
    pub fn is_empty(&self) -> bool {
        match self {
            Cell::Empty => true,
            Cell::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }
}

/// Raw parse result: the header row verbatim plus every data row.
#[derive(Debug, Clone)]
pub struct ParsedSheet {
    pub filename: String,
    pub format: SheetFormat,
    pub raw_headers: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
    pub total_rows: usize,
    pub parse_warnings: Vec<String>,
}

/// Sheet parser for the first worksheet of an upload.
#[derive(Debug, Clone, Default)]
pub struct SheetParser;

impl SheetParser {
    pub fn new() -> Self {
        Self
    }

    /// Parse an uploaded file from bytes, detecting the format from the
    /// filename when not supplied.
    pub fn parse_bytes(
        &self,
        filename: &str,
        data: &[u8],
        format: Option<SheetFormat>,
    ) -> TakeoffResult<ParsedSheet> {
        let format = format
            .or_else(|| SheetFormat::from_extension(Path::new(filename)))
            .ok_or_else(|| {
                TakeoffError::validation("file", "Could not determine file format")
            })?;

        match format {
            SheetFormat::Csv => self.parse_csv(filename, data),
            SheetFormat::Excel => self.parse_excel(filename, data),
        }
    }

    fn parse_csv(&self, filename: &str, data: &[u8]) -> TakeoffResult<ParsedSheet> {
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .has_headers(false)
            .from_reader(data);

        let mut records = reader.records();
        let raw_headers: Vec<String> = records
            .next()
            .ok_or_else(|| TakeoffError::validation("file", "CSV file has no header row"))?
            .map_err(|e| TakeoffError::validation("file", format!("Failed to read CSV headers: {e}")))?
            .iter()
            .map(|h| h.trim().to_string())
            .collect();

        let mut rows = Vec::new();
        let mut warnings = Vec::new();

        for (idx, result) in records.enumerate() {
            match result {
                Ok(record) => {
                    let row: Vec<Cell> = record
                        .iter()
                        .map(|value| {
                            let trimmed = value.trim();
                            if trimmed.is_empty() {
                                Cell::Empty
                            } else {
                                Cell::Text(trimmed.to_string())
                            }
                        })
                        .collect();
                    rows.push(row);
                }
                Err(e) => {
                    warnings.push(format!("Row {}: Parse error - {}", idx + 2, e));
                }
            }
        }

        Ok(ParsedSheet {
            filename: filename.to_string(),
            format: SheetFormat::Csv,
            raw_headers,
            total_rows: rows.len(),
            rows,
            parse_warnings: warnings,
        })
    }

    fn parse_excel(&self, filename: &str, data: &[u8]) -> TakeoffResult<ParsedSheet> {
        let cursor = std::io::Cursor::new(data);
        let mut workbook: Xlsx<_> = open_workbook_from_rs(cursor)
            .map_err(|e| TakeoffError::validation("file", format!("Failed to open workbook: {e}")))?;

        // First worksheet only
        let sheet_name = workbook
            .sheet_names()
            .first()
            .cloned()
            .ok_or_else(|| TakeoffError::validation("file", "No sheets found in workbook"))?;

        let range = workbook
            .worksheet_range(&sheet_name)
            .ok_or_else(|| TakeoffError::validation("file", "Failed to read worksheet"))?
            .map_err(|e| TakeoffError::validation("file", format!("Failed to read worksheet: {e}")))?;

        let mut rows_iter = range.rows();

        let raw_headers: Vec<String> = rows_iter
            .next()
            .ok_or_else(|| TakeoffError::validation("file", "Worksheet is empty"))?
            .iter()
            .map(|cell: &DataType| cell.to_string().trim().to_string())
            .collect();

        let rows: Vec<Vec<Cell>> = rows_iter
            .map(|row| row.iter().map(convert_cell).collect())
            .collect();

        Ok(ParsedSheet {
            filename: filename.to_string(),
            format: SheetFormat::Excel,
            raw_headers,
            total_rows: rows.len(),
            rows,
            parse_warnings: Vec::new(),
        })
    }
}

fn convert_cell(cell: &DataType) -> Cell {
    match cell {
        DataType::Empty => Cell::Empty,
        DataType::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                Cell::Empty
            } else {
                Cell::Text(trimmed.to_string())
            }
        }
        DataType::Int(v) => Cell::Number(*v as f64),
        DataType::Float(v) => Cell::Number(*v),
        DataType::Bool(v) => Cell::Bool(*v),
        DataType::DateTime(serial) => excel_serial_to_datetime(*serial)
            .map(Cell::DateTime)
            .unwrap_or(Cell::Empty),
        DataType::Error(_) => Cell::Empty,
        other => {
            let text = other.to_string();
            if text.trim().is_empty() {
                Cell::Empty
            } else {
                Cell::Text(text.trim().to_string())
            }
        }
    }
}

/// Excel serial date: days since 1899-12-30, fraction of day as time.
fn excel_serial_to_datetime(serial: f64) -> Option<NaiveDateTime> {
    if !serial.is_finite() {
        return None;
    }
    let days = serial.floor();
    let seconds = ((serial - days) * 86_400.0).round() as i64;
    let base = NaiveDate::from_ymd_opt(1899, 12, 30)?;
    let date = base.checked_add_signed(Duration::days(days as i64))?;
    date.and_hms_opt(0, 0, 0)?
        .checked_add_signed(Duration::seconds(seconds))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_detection() {
        assert_eq!(
            SheetFormat::from_extension(Path::new("mto.csv")),
            Some(SheetFormat::Csv)
        );
        assert_eq!(
            SheetFormat::from_extension(Path::new("mto.xlsx")),
            Some(SheetFormat::Excel)
        );
        assert_eq!(
            SheetFormat::from_extension(Path::new("mto.XLS")),
            Some(SheetFormat::Excel)
        );
        assert_eq!(SheetFormat::from_extension(Path::new("mto.txt")), None);
        assert_eq!(
            SheetFormat::from_content_type("text/csv"),
            Some(SheetFormat::Csv)
        );
    }

    #[test]
    fn test_csv_parsing() {
        let csv_data =
            b"Ident,Issued Qty,Consumed Qty\nA-101-1,10,4\nA-101-2,5,\n";

        let parser = SheetParser::new();
        let sheet = parser.parse_bytes("mto.csv", csv_data, None).unwrap();

        assert_eq!(sheet.raw_headers, vec!["Ident", "Issued Qty", "Consumed Qty"]);
        assert_eq!(sheet.total_rows, 2);
        assert_eq!(sheet.rows[0][0], Cell::Text("A-101-1".to_string()));
        assert_eq!(sheet.rows[1][2], Cell::Empty);
    }

    #[test]
    fn test_csv_without_headers_fails() {
        let parser = SheetParser::new();
        assert!(parser.parse_bytes("mto.csv", b"", None).is_err());
    }

    #[test]
    fn test_excel_serial_conversion() {
        // 2024-01-01 is serial 45292
        let dt = excel_serial_to_datetime(45292.0).unwrap();
        assert_eq!(dt.date(), NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());

        // Half a day is noon
        let dt = excel_serial_to_datetime(45292.5).unwrap();
        assert_eq!(dt.time(), chrono::NaiveTime::from_hms_opt(12, 0, 0).unwrap());

        assert!(excel_serial_to_datetime(f64::NAN).is_none());
    }

    #[test]
    fn test_cell_emptiness() {
        assert!(Cell::Empty.is_empty());
        assert!(Cell::Text("  ".to_string()).is_empty());
        assert!(!Cell::Number(0.0).is_empty());
    }

    proptest::proptest! {
        /// Consecutive serials are consecutive calendar days.
        #[test]
        fn prop_serial_days_are_contiguous(serial in 1u32..200_000) {
            let d0 = excel_serial_to_datetime(serial as f64).unwrap();
            let d1 = excel_serial_to_datetime((serial + 1) as f64).unwrap();
            proptest::prop_assert_eq!(d1.date() - d0.date(), Duration::days(1));
        }

        /// The day fraction round-trips to seconds within rounding error.
        #[test]
        fn prop_serial_fraction_maps_to_time(fraction in 0.0f64..1.0) {
            let dt = excel_serial_to_datetime(45292.0 + fraction).unwrap();
            let seconds = dt
                .signed_duration_since(
                    NaiveDate::from_ymd_opt(2024, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap(),
                )
                .num_seconds();
            let expected = (fraction * 86_400.0).round() as i64;
            proptest::prop_assert!((seconds - expected).abs() <= 1);
        }
    }
}
