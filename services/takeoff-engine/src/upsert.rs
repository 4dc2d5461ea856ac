//! Upsert-with-diff.
//!
//! Incoming rows are matched against stored rows by the project's natural
//! key. Unmatched rows become inserts; matched rows are compared field by
//! field and rewritten only when something actually changed, with old/new
//! snapshots captured over the changed fields before anything is mutated.
//! Re-uploading an identical file is therefore a no-op: no writes, no logs,
//! no alerts.

use std::collections::{HashMap, HashSet};

use futures::TryStreamExt;
use mongodb::bson::{doc, Bson, Document};
use uuid::Uuid;

use takeoff_database::StoreHandle;
use takeoff_models::row::{
    self, field_snapshot, is_reserved_field, pk_string, CREATED_AT_FIELD, ROW_ID_FIELD,
    UPDATED_AT_FIELD,
};
use takeoff_models::RoleMap;
use takeoff_utils::{TakeoffError, TakeoffResult};

use crate::evaluate::{evaluate, AlertDraft};

/// A brand-new row, fully materialized and ready to insert.
#[derive(Debug, Clone)]
pub struct InsertRow {
    pub document: Document,
    pub row_id: String,
    pub pk_value: String,
    pub alert: Option<AlertDraft>,
}

/// A matched row that differs from its stored state.
#[derive(Debug, Clone)]
pub struct RowChange {
    /// Storage id of the stored row, carried verbatim for the write filter.
    pub row_id: Bson,
    pub pk_value: String,
    /// Pre-change values of the changed fields, null for fields the stored
    /// row never had.
    pub old_snapshot: Document,
    /// Post-change values of the same fields.
    pub new_snapshot: Document,
    /// `$set` payload: the changed fields plus the updated-at timestamp.
    pub set: Document,
    pub alert: Option<AlertDraft>,
}

impl RowChange {
    pub fn row_id_string(&self) -> String {
        match &self.row_id {
            Bson::String(s) => s.clone(),
            Bson::ObjectId(oid) => oid.to_hex(),
            other => other.to_string(),
        }
    }
}

/// One batch partitioned into inserts, updates, and no-ops.
#[derive(Debug, Default)]
pub struct DiffedBatch {
    pub inserts: Vec<InsertRow>,
    pub updates: Vec<RowChange>,
    pub unchanged: usize,
}

/// Reject uploads where two rows share a natural key value, or where a row
/// has none. Ambiguous batches fail whole before any write is attempted.
pub fn ensure_unique_pks(rows: &[Document], pk_field: &str) -> TakeoffResult<()> {
    let mut seen: HashSet<String> = HashSet::with_capacity(rows.len());
    ensure_unique_pks_with(rows, pk_field, &mut seen, 0)
}

/// Key check for one chunk of a larger upload. The caller threads `seen`
/// through every chunk so a duplicate spanning two chunks is still caught,
/// and `first_row` so error messages carry the row's position in the file.
pub fn ensure_unique_pks_with(
    rows: &[Document],
    pk_field: &str,
    seen: &mut HashSet<String>,
    first_row: usize,
) -> TakeoffResult<()> {
    for (idx, row) in rows.iter().enumerate() {
        let pk = pk_string(row, pk_field).ok_or_else(|| {
            TakeoffError::validation(
                pk_field,
                format!(
                    "Row {} has no value for key field '{pk_field}'",
                    first_row + idx + 1
                ),
            )
        })?;
        if !seen.insert(pk.clone()) {
            return Err(TakeoffError::validation(
                pk_field,
                format!("Duplicate key value '{pk}' in upload"),
            ));
        }
    }
    Ok(())
}

pub fn batch_pk_values(rows: &[Document], pk_field: &str) -> Vec<String> {
    rows.iter().filter_map(|row| pk_string(row, pk_field)).collect()
}

/// Fetch the stored rows matching a batch's key values in one round trip.
pub async fn fetch_existing(
    store: &StoreHandle,
    project_id: Uuid,
    pk_field: &str,
    pk_values: &[String],
) -> TakeoffResult<Vec<Document>> {
    if pk_values.is_empty() {
        return Ok(Vec::new());
    }

    let filter = doc! {
        pk_field: { "$in": pk_values },
        row::PROJECT_FIELD: project_id.to_string(),
    };
    let mut cursor = store.collection().find(filter, None).await?;

    let mut rows = Vec::new();
    while let Some(row) = cursor.try_next().await? {
        rows.push(row);
    }
    Ok(rows)
}

/// Partition one batch of incoming rows against the stored rows that share
/// their key values. Pure: nothing is written here.
pub fn diff_batch(
    incoming: Vec<Document>,
    existing: &[Document],
    roles: &RoleMap,
    super_admin: bool,
) -> TakeoffResult<DiffedBatch> {
    ensure_unique_pks(&incoming, &roles.pk_field)?;

    let stored: HashMap<String, &Document> = existing
        .iter()
        .filter_map(|row| pk_string(row, &roles.pk_field).map(|pk| (pk, row)))
        .collect();

    let mut batch = DiffedBatch::default();
    let now = mongodb::bson::DateTime::now();

    for row in incoming {
        // unique and present, checked above
        let pk = pk_string(&row, &roles.pk_field).unwrap_or_default();

        match stored.get(&pk) {
            Some(old) => {
                let eval = evaluate(Some(old), &row, roles, super_admin);
                let mut candidate = row;
                candidate.extend(eval.updates);

                let changed: Vec<String> = candidate
                    .iter()
                    .filter(|(key, _)| !is_reserved_field(key.as_str()))
                    .filter(|(key, value)| {
                        old.get(key.as_str()).unwrap_or(&Bson::Null) != *value
                    })
                    .map(|(key, _)| key.clone())
                    .collect();

                if changed.is_empty() {
                    batch.unchanged += 1;
                    continue;
                }

                let mut set = field_snapshot(&candidate, changed.iter().map(String::as_str));
                set.insert(UPDATED_AT_FIELD, now);

                batch.updates.push(RowChange {
                    row_id: old.get(ROW_ID_FIELD).cloned().unwrap_or(Bson::Null),
                    pk_value: pk,
                    old_snapshot: field_snapshot(old, changed.iter().map(String::as_str)),
                    new_snapshot: field_snapshot(
                        &candidate,
                        changed.iter().map(String::as_str),
                    ),
                    set,
                    alert: eval.alert,
                });
            }
            None => {
                let eval = evaluate(None, &row, roles, super_admin);
                let mut document = row;
                document.extend(eval.updates);

                let row_id = Uuid::new_v4().to_string();
                document.insert(ROW_ID_FIELD, row_id.clone());
                document.insert(CREATED_AT_FIELD, now);
                document.insert(UPDATED_AT_FIELD, now);

                batch.inserts.push(InsertRow {
                    document,
                    row_id,
                    pk_value: pk,
                    alert: eval.alert,
                });
            }
        }
    }

    Ok(batch)
}
