//! Schema derivation.
//!
//! A project's row schema is derived once, at creation time, from the header
//! row of the first uploaded spreadsheet. Headers become snake_case field
//! tokens, each typed as text or date, and the caller's role hints are
//! resolved against the derived field set. The result is persisted on the
//! project and is immutable for the project's lifetime; there is no
//! migration path.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use validator::Validate;

use crate::normalize::normalize_header;

/// Field name used for computed `issued - consumed` when no balance role
/// hint was designated at project creation.
pub const DEFAULT_BALANCE_QTY_FIELD: &str = "balance_qty";
/// Field name used for computed `required - issued` when no balance-to-issue
/// role hint was designated.
pub const DEFAULT_BALANCE_TO_ISSUE_FIELD: &str = "balance_to_issue";

#[derive(Debug, Error, Clone, PartialEq)]
pub enum SchemaError {
    #[error("spreadsheet has no headers")]
    NoHeaders,

    #[error("header in column {column} normalizes to an empty token")]
    EmptyHeader { column: usize },

    #[error("headers in columns {first} and {second} both normalize to '{token}'")]
    DuplicateHeader {
        token: String,
        first: usize,
        second: usize,
    },

    #[error("role hint '{hint}' ('{value}') does not match any derived header")]
    UnresolvedRole { hint: &'static str, value: String },
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Text,
    Date,
}

/// One derived field: the normalized token, the original header it came
/// from, and its coercion type. Numeric coercion is deliberately deferred to
/// evaluation time since spreadsheet numeric cells may arrive as strings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SchemaField {
    pub name: String,
    pub source_header: String,
    pub field_type: FieldType,
}

/// Caller-supplied designation of which headers play which semantic role.
/// Only the primary key is mandatory.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate, PartialEq)]
pub struct RoleHints {
    #[validate(length(min = 1, message = "Primary key role hint is required"))]
    pub pk: String,
    pub issued_qty: Option<String>,
    pub consumed_qty: Option<String>,
    pub required_qty: Option<String>,
    pub balance_qty: Option<String>,
    pub balance_to_issue: Option<String>,
    pub transfer_other_qty: Option<String>,
    pub date_field: Option<String>,
}

/// Role hints resolved to derived field tokens, persisted on the project.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RoleMap {
    pub pk_field: String,
    pub issued_qty_field: Option<String>,
    pub consumed_qty_field: Option<String>,
    pub required_qty_field: Option<String>,
    pub balance_qty_field: Option<String>,
    pub balance_to_issue_field: Option<String>,
    pub transfer_other_qty_field: Option<String>,
    pub date_field: Option<String>,
}

impl RoleMap {
    /// Field the computed `issued - consumed` balance is written to.
    pub fn balance_qty_target(&self) -> &str {
        self.balance_qty_field
            .as_deref()
            .unwrap_or(DEFAULT_BALANCE_QTY_FIELD)
    }

    /// Field the computed `required - issued` balance is written to.
    pub fn balance_to_issue_target(&self) -> &str {
        self.balance_to_issue_field
            .as_deref()
            .unwrap_or(DEFAULT_BALANCE_TO_ISSUE_FIELD)
    }
}

/// Ordered field list plus resolved role map for one project.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DerivedSchema {
    pub fields: Vec<SchemaField>,
    pub roles: RoleMap,
}

impl DerivedSchema {
    /// Derive a schema from raw spreadsheet headers and role hints.
    ///
    /// A header whose normalized token contains `date` is typed as a date;
    /// everything else defaults to text. Every supplied role hint must
    /// resolve to a derived field or derivation fails before anything is
    /// provisioned.
    pub fn derive(raw_headers: &[String], hints: &RoleHints) -> Result<Self, SchemaError> {
        if raw_headers.is_empty() {
            return Err(SchemaError::NoHeaders);
        }

        let mut fields = Vec::with_capacity(raw_headers.len());
        let mut seen: Vec<(String, usize)> = Vec::with_capacity(raw_headers.len());

        for (idx, raw) in raw_headers.iter().enumerate() {
            let column = idx + 1;
            let token = normalize_header(raw);
            if token.is_empty() {
                return Err(SchemaError::EmptyHeader { column });
            }
            if let Some((_, first)) = seen.iter().find(|(t, _)| *t == token) {
                return Err(SchemaError::DuplicateHeader {
                    token,
                    first: *first,
                    second: column,
                });
            }
            seen.push((token.clone(), column));

            let field_type = if token.contains("date") {
                FieldType::Date
            } else {
                FieldType::Text
            };
            fields.push(SchemaField {
                name: token,
                source_header: raw.clone(),
                field_type,
            });
        }

        let tokens: HashSet<&str> = fields.iter().map(|f| f.name.as_str()).collect();
        let resolve = |hint: &'static str, value: &str| -> Result<String, SchemaError> {
            let token = normalize_header(value);
            if tokens.contains(token.as_str()) {
                Ok(token)
            } else {
                Err(SchemaError::UnresolvedRole {
                    hint,
                    value: value.to_string(),
                })
            }
        };
        let resolve_opt =
            |hint: &'static str, value: &Option<String>| -> Result<Option<String>, SchemaError> {
                value.as_deref().map(|v| resolve(hint, v)).transpose()
            };

        let roles = RoleMap {
            pk_field: resolve("pk", &hints.pk)?,
            issued_qty_field: resolve_opt("issued_qty", &hints.issued_qty)?,
            consumed_qty_field: resolve_opt("consumed_qty", &hints.consumed_qty)?,
            required_qty_field: resolve_opt("required_qty", &hints.required_qty)?,
            balance_qty_field: resolve_opt("balance_qty", &hints.balance_qty)?,
            balance_to_issue_field: resolve_opt("balance_to_issue", &hints.balance_to_issue)?,
            transfer_other_qty_field: resolve_opt(
                "transfer_other_qty",
                &hints.transfer_other_qty,
            )?,
            date_field: resolve_opt("date_field", &hints.date_field)?,
        };

        Ok(Self { fields, roles })
    }

    pub fn field(&self, name: &str) -> Option<&SchemaField> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.field(name).is_some()
    }
}
