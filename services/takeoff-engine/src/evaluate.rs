//! Derived balance evaluation.
//!
//! Pure recomputation of the quantity roles for one row write. Balances are
//! always derived from the effective issued/consumed/required values and
//! never accepted from the input, so a spreadsheet carrying stale balance
//! columns cannot corrupt the stored state. A write whose recomputed balance
//! goes negative yields an alert draft for the caller to persist.

use mongodb::bson::{Bson, Document};

use takeoff_models::row::{qty_field, qty_value};
use takeoff_models::RoleMap;

/// Quantity state computed for one row write: the role and balance fields to
/// write back, plus an alert draft when a balance went negative.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub updates: Document,
    pub alert: Option<AlertDraft>,
}

/// Snapshot of the violating quantities, persisted as an alert by the caller
/// once the row's storage id is known.
#[derive(Debug, Clone, PartialEq)]
pub struct AlertDraft {
    pub issued_qty: f64,
    pub consumed_qty: f64,
    pub balance_qty: f64,
    pub balance_to_issue: Option<f64>,
}

/// Recompute role quantities and balances for one row write.
///
/// The effective value of a role is the incoming value when the input carries
/// that field, otherwise the stored value, otherwise zero. Required quantity
/// only accepts incoming values from a super admin; for anyone else the
/// stored value is retained. Each balance is computed only when the roles it
/// reads from are designated, so a project without a required-quantity role
/// never produces spurious balance-to-issue alerts.
pub fn evaluate(
    existing: Option<&Document>,
    incoming: &Document,
    roles: &RoleMap,
    super_admin: bool,
) -> Evaluation {
    let effective = |field: &str, accept_incoming: bool| -> f64 {
        if accept_incoming {
            if let Some(value) = incoming.get(field) {
                return qty_value(Some(value));
            }
        }
        existing.map(|row| qty_field(row, field)).unwrap_or(0.0)
    };

    let issued_field = roles.issued_qty_field.as_deref();
    let consumed_field = roles.consumed_qty_field.as_deref();
    let required_field = roles.required_qty_field.as_deref();
    let transfer_field = roles.transfer_other_qty_field.as_deref();

    let issued = issued_field.map(|f| effective(f, true)).unwrap_or(0.0);
    let consumed = consumed_field.map(|f| effective(f, true)).unwrap_or(0.0);
    let required = required_field.map(|f| effective(f, super_admin));
    let transfer = transfer_field.map(|f| effective(f, true));

    let mut updates = Document::new();
    if let Some(field) = issued_field {
        updates.insert(field, Bson::Double(issued));
    }
    if let Some(field) = consumed_field {
        updates.insert(field, Bson::Double(consumed));
    }
    if let (Some(field), Some(value)) = (required_field, required) {
        updates.insert(field, Bson::Double(value));
    }
    if let (Some(field), Some(value)) = (transfer_field, transfer) {
        updates.insert(field, Bson::Double(value));
    }

    let mut balance_qty = None;
    if issued_field.is_some() || consumed_field.is_some() {
        let balance = issued - consumed;
        updates.insert(roles.balance_qty_target(), Bson::Double(balance));
        balance_qty = Some(balance);
    }

    let mut balance_to_issue = None;
    if let Some(required) = required {
        let balance = required - issued;
        updates.insert(roles.balance_to_issue_target(), Bson::Double(balance));
        balance_to_issue = Some(balance);
    }

    let violated = balance_qty.map_or(false, |b| b < 0.0)
        || balance_to_issue.map_or(false, |b| b < 0.0);
    let alert = violated.then(|| AlertDraft {
        issued_qty: issued,
        consumed_qty: consumed,
        balance_qty: balance_qty.unwrap_or(issued - consumed),
        balance_to_issue,
    });

    Evaluation { updates, alert }
}
