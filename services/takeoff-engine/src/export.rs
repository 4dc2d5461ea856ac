//! CSV rendering for row exports.
//!
//! Rows are rendered in the caller-designated header order, one field per
//! column. Every non-empty value is quoted, with embedded quotes doubled;
//! empty and missing values render as nothing at all, keeping blank cells
//! distinguishable from empty strings in the output.

use mongodb::bson::{Bson, Document};

use takeoff_models::row::format_quantity;

pub fn csv_header_row(headers: &[String]) -> String {
    let mut line = headers
        .iter()
        .map(|h| csv_field(h))
        .collect::<Vec<_>>()
        .join(",");
    line.push('\n');
    line
}

pub fn csv_row(headers: &[String], row: &Document) -> String {
    let mut line = headers
        .iter()
        .map(|h| csv_field(&display_value(row.get(h))))
        .collect::<Vec<_>>()
        .join(",");
    line.push('\n');
    line
}

fn csv_field(value: &str) -> String {
    if value.is_empty() {
        String::new()
    } else {
        format!("\"{}\"", value.replace('"', "\"\""))
    }
}

pub fn display_value(value: Option<&Bson>) -> String {
    match value {
        None | Some(Bson::Null) => String::new(),
        Some(Bson::String(s)) => s.clone(),
        Some(Bson::Double(v)) => format_quantity(*v),
        Some(Bson::Int32(v)) => v.to_string(),
        Some(Bson::Int64(v)) => v.to_string(),
        Some(Bson::Boolean(v)) => v.to_string(),
        Some(Bson::DateTime(dt)) => dt
            .try_to_rfc3339_string()
            .map(|s| s.split('T').next().unwrap_or(&s).to_string())
            .unwrap_or_default(),
        Some(other) => other.to_string(),
    }
}
