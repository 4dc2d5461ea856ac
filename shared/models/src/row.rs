//! Row-level types and helpers.
//!
//! MTO rows are dynamically shaped: their field set is defined entirely by
//! the owning project's derived schema, so rows travel through the system as
//! bson documents rather than a compiled record type. The helpers here keep
//! quantity coercion and snapshotting consistent across the single-update and
//! bulk-update paths.

use mongodb::bson::{Bson, Document};
use serde::{Deserialize, Serialize};

/// Storage identity of a row, scoped to the project's own store.
pub const ROW_ID_FIELD: &str = "_id";
/// Back-reference to the owning project, attached to every row.
pub const PROJECT_FIELD: &str = "project";
pub const CREATED_AT_FIELD: &str = "created_at";
pub const UPDATED_AT_FIELD: &str = "updated_at";

/// Fields managed by the engine rather than sourced from the spreadsheet.
pub fn is_reserved_field(name: &str) -> bool {
    matches!(
        name,
        ROW_ID_FIELD | PROJECT_FIELD | CREATED_AT_FIELD | UPDATED_AT_FIELD
    )
}

/// Coerce a stored cell value to a quantity.
///
/// Missing and non-numeric values are zero by policy, never an error;
/// negative and zero inputs propagate unchanged.
pub fn qty_value(value: Option<&Bson>) -> f64 {
    match value {
        Some(Bson::Double(v)) => *v,
        Some(Bson::Int32(v)) => f64::from(*v),
        Some(Bson::Int64(v)) => *v as f64,
        Some(Bson::String(s)) => s.trim().parse().unwrap_or(0.0),
        _ => 0.0,
    }
}

pub fn qty_field(doc: &Document, field: &str) -> f64 {
    qty_value(doc.get(field))
}

/// Extract a row's natural key value as a comparable string.
///
/// Returns `None` for missing, null, or blank keys; such rows cannot be
/// diffed and fail the batch with a validation error at the call site.
pub fn pk_string(doc: &Document, pk_field: &str) -> Option<String> {
    match doc.get(pk_field) {
        Some(Bson::String(s)) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Some(Bson::Double(v)) => Some(format_quantity(*v)),
        Some(Bson::Int32(v)) => Some(v.to_string()),
        Some(Bson::Int64(v)) => Some(v.to_string()),
        _ => None,
    }
}

/// Render a quantity without a trailing `.0` for whole numbers.
pub fn format_quantity(value: f64) -> String {
    if value.fract() == 0.0 && value.is_finite() && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        value.to_string()
    }
}

/// Snapshot the named fields of a row. Fields absent from the row are
/// recorded as null so old/new payload pairs always line up key for key.
pub fn field_snapshot<'a>(doc: &Document, fields: impl IntoIterator<Item = &'a str>) -> Document {
    let mut snapshot = Document::new();
    for field in fields {
        snapshot.insert(field, doc.get(field).cloned().unwrap_or(Bson::Null));
    }
    snapshot
}

/// A single-row quantity edit. Only the supplied quantities change; balances
/// are always recomputed and never accepted from the caller.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RowQuantityUpdate {
    pub issued_qty: Option<f64>,
    pub consumed_qty: Option<f64>,
    pub required_qty: Option<f64>,
}

impl RowQuantityUpdate {
    pub fn is_empty(&self) -> bool {
        self.issued_qty.is_none() && self.consumed_qty.is_none() && self.required_qty.is_none()
    }
}

/// Counts reported by every intake operation. `audit_failures` counts log
/// writes that failed while the row write itself succeeded, so operators can
/// tell "data saved, audit trail incomplete" from "data not saved".
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct BatchOutcome {
    pub inserted: usize,
    pub updated: usize,
    #[serde(default)]
    pub audit_failures: usize,
}

/// Listing parameters for a project's rows.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RowQuery {
    /// Display subset of headers, free-form; normalized and validated against
    /// the project schema, then persisted on the project for reuse.
    pub selected_headers: Option<Vec<String>>,
    pub page: Option<u64>,
    pub limit: Option<i64>,
    pub sort_by: Option<String>,
    #[serde(default)]
    pub descending: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use mongodb::bson::doc;

    #[test]
    fn test_qty_coercion() {
        assert_eq!(qty_value(Some(&Bson::Double(2.5))), 2.5);
        assert_eq!(qty_value(Some(&Bson::Int32(-3))), -3.0);
        assert_eq!(qty_value(Some(&Bson::Int64(7))), 7.0);
        assert_eq!(qty_value(Some(&Bson::String(" 12.5 ".into()))), 12.5);
        assert_eq!(qty_value(Some(&Bson::String("n/a".into()))), 0.0);
        assert_eq!(qty_value(Some(&Bson::Null)), 0.0);
        assert_eq!(qty_value(None), 0.0);
    }

    #[test]
    fn test_pk_string() {
        let row = doc! { "ident": "A-101-3", "sheet": 4_i32, "size": 2.0 };
        assert_eq!(pk_string(&row, "ident").as_deref(), Some("A-101-3"));
        assert_eq!(pk_string(&row, "sheet").as_deref(), Some("4"));
        assert_eq!(pk_string(&row, "size").as_deref(), Some("2"));
        assert_eq!(pk_string(&row, "missing"), None);
        assert_eq!(pk_string(&doc! { "ident": "  " }, "ident"), None);
    }

    #[test]
    fn test_field_snapshot_fills_missing_with_null() {
        let row = doc! { "issued_qty": 5.0 };
        let snapshot = field_snapshot(&row, ["issued_qty", "consumed_qty"]);
        assert_eq!(snapshot.get("issued_qty"), Some(&Bson::Double(5.0)));
        assert_eq!(snapshot.get("consumed_qty"), Some(&Bson::Null));
    }

    #[test]
    fn test_format_quantity() {
        assert_eq!(format_quantity(5.0), "5");
        assert_eq!(format_quantity(-2.0), "-2");
        assert_eq!(format_quantity(2.5), "2.5");
    }
}
