//! Schema-aware row coercion.
//!
//! Turns parsed sheet cells into storage documents shaped by the owning
//! project's derived schema. Columns are matched by normalized header token,
//! not position, so an incremental re-upload may reorder or omit columns as
//! long as every header it does carry resolves to a schema field.
//!
//! Coercion is lazy: [`coerce_batches`] yields one bounded batch of
//! documents at a time, so intake never holds more than one storage batch of
//! coerced rows in memory regardless of file size.

use chrono::{NaiveDate, NaiveDateTime};
use mongodb::bson::{Bson, Document};
use uuid::Uuid;

use takeoff_models::normalize::normalize_header;
use takeoff_models::row::PROJECT_FIELD;
use takeoff_models::{DerivedSchema, FieldType, SchemaField};
use takeoff_utils::sheet::{Cell, ParsedSheet};
use takeoff_utils::{TakeoffError, TakeoffResult};

/// Text date formats accepted for date-typed fields, tried in order.
const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%d-%m-%Y",
    "%d/%m/%Y",
    "%Y/%m/%d",
    "%d-%b-%Y",
    "%d %b %Y",
];

/// Map each sheet column to a schema field by normalized header token.
///
/// Fails with a schema error when a column's token does not resolve, so a
/// re-upload against the wrong project is rejected before any row is diffed.
fn column_fields<'a>(
    sheet: &ParsedSheet,
    schema: &'a DerivedSchema,
) -> TakeoffResult<Vec<&'a SchemaField>> {
    sheet
        .raw_headers
        .iter()
        .map(|raw| {
            let token = normalize_header(raw);
            schema.field(&token).ok_or_else(|| {
                TakeoffError::schema(format!(
                    "Header '{raw}' does not match any field of the project schema"
                ))
            })
        })
        .collect()
}

/// Lazily coerced storage batches over one parsed sheet.
///
/// Blank rows are dropped; each yielded batch holds at most `batch_size`
/// documents.
#[derive(Debug)]
pub struct CoercedBatches<'a> {
    rows: std::slice::Iter<'a, Vec<Cell>>,
    fields: Vec<&'a SchemaField>,
    project_id: Uuid,
    batch_size: usize,
}

impl<'a> Iterator for CoercedBatches<'a> {
    type Item = Vec<Document>;

    fn next(&mut self) -> Option<Vec<Document>> {
        let mut batch = Vec::with_capacity(self.batch_size.min(1024));
        for cells in self.rows.by_ref() {
            if cells.iter().all(Cell::is_empty) {
                continue;
            }
            batch.push(coerce_row(cells, &self.fields, self.project_id));
            if batch.len() == self.batch_size {
                break;
            }
        }
        (!batch.is_empty()).then_some(batch)
    }
}

/// Coerce a parsed sheet into bounded batches of storage documents.
///
/// `header_rows` counts leading non-data rows in the file; the first is the
/// header row the parser already consumed, any further ones are skipped here.
/// An upload with no data rows left after skipping is a validation error,
/// raised before the first batch is produced.
pub fn coerce_batches<'a>(
    sheet: &'a ParsedSheet,
    schema: &'a DerivedSchema,
    project_id: Uuid,
    header_rows: usize,
    batch_size: usize,
) -> TakeoffResult<CoercedBatches<'a>> {
    let fields = column_fields(sheet, schema)?;

    let skip = header_rows.saturating_sub(1);
    let data = sheet.rows.get(skip..).unwrap_or(&[]);
    if data.iter().all(|cells| cells.iter().all(Cell::is_empty)) {
        return Err(TakeoffError::validation(
            "file",
            "Uploaded file contains no data rows",
        ));
    }

    Ok(CoercedBatches {
        rows: data.iter(),
        fields,
        project_id,
        batch_size: batch_size.max(1),
    })
}

fn coerce_row(cells: &[Cell], fields: &[&SchemaField], project_id: Uuid) -> Document {
    let mut doc = Document::new();
    for (idx, field) in fields.iter().enumerate() {
        let cell = cells.get(idx).unwrap_or(&Cell::Empty);
        let value = match field.field_type {
            FieldType::Date => coerce_date(cell),
            FieldType::Text => coerce_value(cell),
        };
        doc.insert(&field.name, value);
    }
    doc.insert(PROJECT_FIELD, project_id.to_string());
    doc
}

fn coerce_value(cell: &Cell) -> Bson {
    match cell {
        Cell::Empty => Bson::Null,
        Cell::Text(s) => Bson::String(s.clone()),
        Cell::Number(v) => Bson::Double(*v),
        Cell::Bool(v) => Bson::Boolean(*v),
        Cell::DateTime(dt) => datetime_bson(*dt),
    }
}

/// Date-typed fields: unparseable values become null rather than failing the
/// upload, matching the lenient coercion policy for quantities.
fn coerce_date(cell: &Cell) -> Bson {
    match cell {
        Cell::DateTime(dt) => datetime_bson(*dt),
        Cell::Text(s) => parse_date_text(s)
            .map(datetime_bson)
            .unwrap_or(Bson::Null),
        _ => Bson::Null,
    }
}

fn datetime_bson(dt: NaiveDateTime) -> Bson {
    Bson::DateTime(mongodb::bson::DateTime::from_millis(
        dt.and_utc().timestamp_millis(),
    ))
}

fn parse_date_text(text: &str) -> Option<NaiveDateTime> {
    let trimmed = text.trim();
    if let Ok(dt) = NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S") {
        return Some(dt);
    }
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(trimmed, fmt).ok())
        .and_then(|date| date.and_hms_opt(0, 0, 0))
}
