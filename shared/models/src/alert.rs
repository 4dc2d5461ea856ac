//! Over-consumption alerts.
//!
//! An alert is raised as a side effect of any write whose recomputed balance
//! goes negative: more consumed than issued, or more issued than required.
//! Alerts are append-only history; they are never deleted automatically and
//! several may accumulate for the same row over time.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AlertRecord {
    pub id: Uuid,
    pub project_id: Uuid,
    /// Storage id of the offending row inside the project's store.
    pub row_id: String,
    /// Natural key value of the offending row at the moment of the violation.
    pub pk_value: String,
    pub issued_qty: f64,
    pub consumed_qty: f64,
    pub balance_qty: f64,
    pub balance_to_issue: Option<f64>,
    pub raised_at: DateTime<Utc>,
}

impl AlertRecord {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        project_id: Uuid,
        row_id: String,
        pk_value: String,
        issued_qty: f64,
        consumed_qty: f64,
        balance_qty: f64,
        balance_to_issue: Option<f64>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            project_id,
            row_id,
            pk_value,
            issued_qty,
            consumed_qty,
            balance_qty,
            balance_to_issue,
            raised_at: Utc::now(),
        }
    }
}

/// Alert joined with its project's display name for listings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertView {
    #[serde(flatten)]
    pub alert: AlertRecord,
    pub project_name: Option<String>,
}
