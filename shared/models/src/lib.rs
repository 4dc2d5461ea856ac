//! # Material take-off domain models
//!
//! Core domain types for the MTO back office: projects with their derived
//! per-project row schemas, dynamically shaped row helpers, over-consumption
//! alerts, and immutable audit log entries.
//!
//! ## Key models
//!
//! - **Project**: one engineering job, its fixed header list, resolved role
//!   map, and the binding to its isolated row store
//! - **DerivedSchema / RoleMap**: the runtime-derived field set and semantic
//!   role designations persisted on the project
//! - **AlertRecord**: append-only flag raised when a computed balance goes
//!   negative
//! - **LogEntry**: immutable audit trail entry with an old/new payload pair
//!   and an integrity hash
//!
//! Rows themselves have no compiled struct: their shape is only known at
//! runtime, so they travel as bson documents with helpers from [`row`].

pub mod alert;
pub mod log;
pub mod normalize;
pub mod project;
pub mod row;
pub mod schema;

pub use alert::{AlertRecord, AlertView};
pub use log::{Actor, LogEntry, LogView, Provenance};
pub use normalize::normalize_header;
pub use project::{CreateProjectRequest, Project, ProjectMetadataUpdate};
pub use row::{BatchOutcome, RowQuantityUpdate, RowQuery};
pub use schema::{
    DerivedSchema, FieldType, RoleHints, RoleMap, SchemaError, SchemaField,
    DEFAULT_BALANCE_QTY_FIELD, DEFAULT_BALANCE_TO_ISSUE_FIELD,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_hints_resolve_through_normalization() {
        let headers: Vec<String> = ["Area Line Sheet Ident", "Issued Qty", "Consumed Qty"]
            .iter()
            .map(|h| h.to_string())
            .collect();
        let hints = RoleHints {
            pk: "areaLineSheetIdent".to_string(),
            issued_qty: Some("ISSUED QTY".to_string()),
            consumed_qty: Some("Consumed Qty".to_string()),
            ..RoleHints::default()
        };

        let schema = DerivedSchema::derive(&headers, &hints).unwrap();
        assert_eq!(schema.roles.pk_field, "area_line_sheet_ident");
        assert_eq!(schema.roles.issued_qty_field.as_deref(), Some("issued_qty"));
    }

    #[test]
    fn test_default_balance_targets() {
        let headers = vec!["Ident".to_string()];
        let hints = RoleHints {
            pk: "Ident".to_string(),
            ..RoleHints::default()
        };
        let schema = DerivedSchema::derive(&headers, &hints).unwrap();

        assert_eq!(schema.roles.balance_qty_target(), "balance_qty");
        assert_eq!(schema.roles.balance_to_issue_target(), "balance_to_issue");
    }
}
