//! Intake orchestration.
//!
//! `TakeoffService` ties the parser, schema derivation, store registry, and
//! repositories together into the operations callers actually invoke:
//! project creation from a first upload, incremental bulk uploads, single-row
//! quantity edits, listings, CSV export, and cascade delete.
//!
//! Side-effect ordering per changed row is fixed: evaluate, write the audit
//! log entry, write the alert if one was raised, then write the row itself.
//! A failed log or alert write never blocks the row write; it is counted in
//! the outcome's `audit_failures` instead, so callers can tell "data saved,
//! audit incomplete" from "data not saved". A storage failure mid-batch
//! surfaces as a partial-batch error carrying the counts committed so far.

use std::collections::HashSet;
use std::io::Write;

use mongodb::bson::{doc, Bson, Document};
use mongodb::options::FindOptions;
use mongodb::Database;
use uuid::Uuid;

use futures::TryStreamExt;

use takeoff_database::{
    generate_store_name, AlertRepository, LogRepository, ProjectRepository, StoreHandle,
    StoreRegistry,
};
use takeoff_models::normalize::normalize_header;
use takeoff_models::row::{
    field_snapshot, pk_string, BatchOutcome, RowQuantityUpdate, RowQuery, PROJECT_FIELD,
    ROW_ID_FIELD, UPDATED_AT_FIELD,
};
use takeoff_models::{
    Actor, AlertRecord, AlertView, CreateProjectRequest, DerivedSchema, LogEntry, LogView,
    Project, ProjectMetadataUpdate, Provenance, RoleMap,
};
use takeoff_utils::sheet::{ParsedSheet, SheetParser};
use takeoff_utils::{
    validate_file_size, validate_file_type, validate_model, IngestConfig, TakeoffError,
    TakeoffResult,
};

use crate::evaluate::{evaluate, AlertDraft};
use crate::export;
use crate::ingest;
use crate::upsert::{self, DiffedBatch};

/// Result of creating a project from its first upload.
#[derive(Debug)]
pub struct ProjectUploadOutcome {
    pub project: Project,
    pub outcome: BatchOutcome,
}

/// One page of a project's rows, shaped by the effective header selection.
#[derive(Debug)]
pub struct RowPage {
    pub rows: Vec<Document>,
    pub headers: Vec<String>,
    pub total: u64,
}

#[derive(Clone)]
pub struct TakeoffService {
    projects: ProjectRepository,
    alerts: AlertRepository,
    logs: LogRepository,
    stores: StoreRegistry,
    parser: SheetParser,
    config: IngestConfig,
}

impl TakeoffService {
    pub fn new(db: Database, config: IngestConfig) -> Self {
        Self {
            projects: ProjectRepository::new(&db),
            alerts: AlertRepository::new(&db),
            logs: LogRepository::new(&db),
            stores: StoreRegistry::new(db),
            parser: SheetParser::new(),
            config,
        }
    }

    /// Create a project from its first spreadsheet.
    ///
    /// Derives the schema from the file's headers, provisions an isolated
    /// store under a fresh generated name, loads the rows, and only then
    /// persists the project record. A failure anywhere before that last step
    /// leaves no project behind.
    pub async fn create_project_with_upload(
        &self,
        request: CreateProjectRequest,
        filename: &str,
        data: &[u8],
        actor: Actor,
        provenance: Provenance,
    ) -> TakeoffResult<ProjectUploadOutcome> {
        if !actor.super_admin {
            return Err(TakeoffError::authorization(
                "Only a super admin can create a project",
            ));
        }
        validate_model(&request)?;
        self.validate_upload(filename, data)?;

        let sheet = self.parser.parse_bytes(filename, data, None)?;
        let schema = DerivedSchema::derive(&sheet.raw_headers, &request.roles)?;

        let store_name = generate_store_name(&self.projects).await?;
        let project = Project::new(
            &request,
            sheet.raw_headers.clone(),
            schema,
            store_name.clone(),
            Some(actor.id),
        );

        // headers and non-emptiness are validated before the store exists,
        // so a bad first file provisions nothing
        self.coerce(&sheet, &project)?;

        let store = self.stores.provision(&store_name).await?;
        let outcome = self
            .apply_rows(&store, &project, &sheet, &actor, &provenance, "Bulk upload")
            .await?;
        self.projects.create(&project).await?;

        tracing::info!(
            project = %project.id,
            store = %store_name,
            inserted = outcome.inserted,
            "Created project from upload"
        );
        Ok(ProjectUploadOutcome { project, outcome })
    }

    /// Incremental bulk upload into an existing project.
    ///
    /// The file's headers must all resolve against the project's fixed
    /// schema; rows are then upserted by natural key, logging one audit
    /// entry per row that actually changed.
    pub async fn bulk_upload(
        &self,
        project_id: Uuid,
        filename: &str,
        data: &[u8],
        actor: Actor,
        provenance: Provenance,
    ) -> TakeoffResult<BatchOutcome> {
        let project = self.projects.require(project_id).await?;
        self.validate_upload(filename, data)?;

        let sheet = self.parser.parse_bytes(filename, data, None)?;

        let store = self.stores.get_or_provision(&project.store_name).await?;
        let outcome = self
            .apply_rows(&store, &project, &sheet, &actor, &provenance, "Bulk update")
            .await?;

        tracing::info!(
            project = %project.id,
            inserted = outcome.inserted,
            updated = outcome.updated,
            "Bulk upload applied"
        );
        Ok(outcome)
    }

    /// Edit the quantity roles of one row.
    ///
    /// Supplying a quantity whose role is not designated on the project is a
    /// schema error. Balances are recomputed, the change is logged, an alert
    /// is raised on a negative balance, and an edit that changes nothing
    /// writes nothing.
    pub async fn update_row(
        &self,
        project_id: Uuid,
        row_id: &str,
        update: RowQuantityUpdate,
        actor: Actor,
        provenance: Provenance,
    ) -> TakeoffResult<Document> {
        if update.is_empty() {
            return Err(TakeoffError::validation(
                "update",
                "No quantities supplied",
            ));
        }

        let project = self.projects.require(project_id).await?;
        let roles = &project.schema.roles;
        let incoming = Self::quantity_update_doc(&update, roles)?;

        let store = self.stores.get(&project.store_name).await?;
        let filter = doc! {
            ROW_ID_FIELD: row_id,
            PROJECT_FIELD: project_id.to_string(),
        };
        let mut row = store
            .collection()
            .find_one(filter.clone(), None)
            .await?
            .ok_or_else(|| TakeoffError::not_found(format!("row '{row_id}'")))?;

        let eval = evaluate(Some(&row), &incoming, roles, actor.super_admin);

        let changed: Vec<String> = eval
            .updates
            .iter()
            .filter(|(key, value)| row.get(key.as_str()).unwrap_or(&Bson::Null) != *value)
            .map(|(key, _)| key.clone())
            .collect();
        if changed.is_empty() {
            return Ok(row);
        }

        let pk_value = pk_string(&row, &roles.pk_field).unwrap_or_else(|| row_id.to_string());
        let old_snapshot = field_snapshot(&row, changed.iter().map(String::as_str));
        let new_snapshot = field_snapshot(&eval.updates, changed.iter().map(String::as_str));

        let mut audit_failures = 0usize;
        let entry = LogEntry::new(
            &actor,
            project.id,
            pk_value.clone(),
            "Single update",
            old_snapshot,
            new_snapshot.clone(),
            &provenance,
        );
        if let Err(error) = self.logs.create(&entry).await {
            tracing::error!(%error, row = row_id, "Audit log write failed");
            audit_failures += 1;
        }

        if let Some(draft) = &eval.alert {
            if self
                .persist_alert(draft, project.id, row_id.to_string(), pk_value.clone())
                .await
                .is_err()
            {
                audit_failures += 1;
            }
        }

        let mut set = new_snapshot.clone();
        set.insert(UPDATED_AT_FIELD, mongodb::bson::DateTime::now());
        store
            .collection()
            .update_one(filter, doc! { "$set": set.clone() }, None)
            .await?;

        if audit_failures > 0 {
            tracing::warn!(row = row_id, audit_failures, "Row saved with incomplete audit trail");
        }

        for (key, value) in set {
            row.insert(key, value);
        }
        Ok(row)
    }

    /// List a project's rows, projected to the effective header selection.
    ///
    /// A selection supplied here is normalized, validated against the
    /// schema, and persisted on the project for subsequent listings.
    pub async fn list_rows(&self, project_id: Uuid, query: RowQuery) -> TakeoffResult<RowPage> {
        let project = self.projects.require(project_id).await?;

        let selection = match &query.selected_headers {
            Some(raw) => {
                let tokens = Self::resolve_headers(raw, &project.schema)?;
                self.projects
                    .set_selected_headers(project_id, &tokens)
                    .await?;
                Some(tokens)
            }
            None => project.selected_headers.clone(),
        };
        let headers = selection
            .unwrap_or_else(|| project.schema.field_names().map(str::to_string).collect());

        let sort = match &query.sort_by {
            Some(raw) => {
                let token = normalize_header(raw);
                if !project.schema.has_field(&token) {
                    return Err(TakeoffError::schema(format!(
                        "Sort field '{raw}' does not match any field of the project schema"
                    )));
                }
                let direction = if query.descending { -1 } else { 1 };
                Some(doc! { token: direction })
            }
            None => None,
        };

        let mut projection = Document::new();
        for header in &headers {
            projection.insert(header, 1);
        }

        let store = self.stores.get(&project.store_name).await?;
        let filter = doc! { PROJECT_FIELD: project_id.to_string() };

        let total = store
            .collection()
            .count_documents(filter.clone(), None)
            .await?;

        let limit = query.limit.unwrap_or(50).max(1);
        let page = query.page.unwrap_or(1).max(1);
        let options = FindOptions::builder()
            .skip(page.saturating_sub(1).saturating_mul(limit as u64))
            .limit(limit)
            .sort(sort)
            .projection(projection)
            .build();

        let mut cursor = store.collection().find(filter, options).await?;
        let mut rows = Vec::new();
        while let Some(row) = cursor.try_next().await? {
            rows.push(row);
        }

        Ok(RowPage { rows, headers, total })
    }

    /// Export a project's rows as CSV into `out`, one row at a time as the
    /// storage cursor yields them. The full export is never held in memory.
    pub async fn export_rows_csv<W: Write>(
        &self,
        project_id: Uuid,
        headers: Option<Vec<String>>,
        out: &mut W,
    ) -> TakeoffResult<()> {
        let project = self.projects.require(project_id).await?;

        let headers = match headers {
            Some(raw) => Self::resolve_headers(&raw, &project.schema)?,
            None => project
                .selected_headers
                .clone()
                .unwrap_or_else(|| project.schema.field_names().map(str::to_string).collect()),
        };

        let store = self.stores.get(&project.store_name).await?;
        let filter = doc! { PROJECT_FIELD: project_id.to_string() };
        let mut cursor = store.collection().find(filter, None).await?;

        Self::write_csv(out, &export::csv_header_row(&headers))?;
        while let Some(row) = cursor.try_next().await? {
            Self::write_csv(out, &export::csv_row(&headers, &row))?;
        }
        Ok(())
    }

    fn write_csv<W: Write>(out: &mut W, line: &str) -> TakeoffResult<()> {
        out.write_all(line.as_bytes())
            .map_err(|e| TakeoffError::internal(format!("CSV write failed: {e}")))
    }

    pub async fn get_project(&self, project_id: Uuid) -> TakeoffResult<Project> {
        self.projects.require(project_id).await
    }

    pub async fn list_projects(
        &self,
        page: Option<u64>,
        limit: Option<i64>,
    ) -> TakeoffResult<(Vec<Project>, u64)> {
        self.projects.list(page, limit).await
    }

    /// Update a project's descriptive metadata. Headers, roles, and the
    /// store binding have no update path.
    pub async fn update_project(
        &self,
        project_id: Uuid,
        update: ProjectMetadataUpdate,
    ) -> TakeoffResult<Project> {
        validate_model(&update)?;
        self.projects
            .update_metadata(project_id, &update)
            .await?
            .ok_or_else(|| TakeoffError::not_found(format!("project {project_id}")))
    }

    /// Cascade delete: the project record, its row store, and every alert
    /// and log entry that references it.
    pub async fn delete_project(&self, project_id: Uuid, actor: Actor) -> TakeoffResult<()> {
        if !actor.super_admin {
            return Err(TakeoffError::authorization(
                "Only a super admin can delete a project",
            ));
        }
        let project = self.projects.require(project_id).await?;

        self.stores.drop_store(&project.store_name).await?;
        let alerts = self.alerts.delete_for_project(project_id).await?;
        let logs = self.logs.delete_for_project(project_id).await?;
        self.projects.delete(project_id).await?;

        tracing::info!(
            project = %project_id,
            store = %project.store_name,
            alerts,
            logs,
            "Deleted project and cascaded side records"
        );
        Ok(())
    }

    /// List alerts, newest first, joined with project display names.
    pub async fn list_alerts(
        &self,
        project_id: Option<Uuid>,
        page: Option<u64>,
        limit: Option<i64>,
    ) -> TakeoffResult<(Vec<AlertView>, u64)> {
        let (alerts, total) = self.alerts.list(project_id, page, limit).await?;
        let ids: Vec<Uuid> = alerts.iter().map(|a| a.project_id).collect();
        let names = self.projects.display_names(&ids).await?;

        let views = alerts
            .into_iter()
            .map(|alert| {
                let project_name = names.get(&alert.project_id).cloned();
                AlertView { alert, project_name }
            })
            .collect();
        Ok((views, total))
    }

    /// List audit log entries, newest first, joined with project display
    /// names.
    pub async fn list_logs(
        &self,
        project_id: Option<Uuid>,
        page: Option<u64>,
        limit: Option<i64>,
    ) -> TakeoffResult<(Vec<LogView>, u64)> {
        let (entries, total) = self.logs.list(project_id, page, limit).await?;
        let ids: Vec<Uuid> = entries.iter().map(|e| e.project_id).collect();
        let names = self.projects.display_names(&ids).await?;

        let views = entries
            .into_iter()
            .map(|entry| {
                let project_name = names.get(&entry.project_id).cloned();
                LogView { entry, project_name }
            })
            .collect();
        Ok((views, total))
    }

    fn validate_upload(&self, filename: &str, data: &[u8]) -> TakeoffResult<()> {
        validate_file_type(filename, &self.config.allowed_extensions)?;
        validate_file_size(data.len() as u64, self.config.max_upload_bytes)
    }

    /// Map a quantity edit onto the project's designated role fields. A
    /// quantity whose role is undesignated cannot be addressed at all.
    fn quantity_update_doc(
        update: &RowQuantityUpdate,
        roles: &RoleMap,
    ) -> TakeoffResult<Document> {
        let mut incoming = Document::new();
        let pairs = [
            ("issued_qty", update.issued_qty, &roles.issued_qty_field),
            ("consumed_qty", update.consumed_qty, &roles.consumed_qty_field),
            ("required_qty", update.required_qty, &roles.required_qty_field),
        ];
        for (role, value, field) in pairs {
            if let Some(value) = value {
                let field = field.as_deref().ok_or_else(|| {
                    TakeoffError::schema(format!(
                        "Project has no designated {role} field"
                    ))
                })?;
                incoming.insert(field, Bson::Double(value));
            }
        }
        Ok(incoming)
    }

    /// Normalize a free-form header selection and validate every token
    /// against the schema. Duplicates collapse, order is preserved.
    fn resolve_headers(raw: &[String], schema: &DerivedSchema) -> TakeoffResult<Vec<String>> {
        if raw.is_empty() {
            return Err(TakeoffError::validation(
                "selected_headers",
                "Header selection cannot be empty",
            ));
        }
        let mut tokens = Vec::with_capacity(raw.len());
        for header in raw {
            let token = normalize_header(header);
            if !schema.has_field(&token) {
                return Err(TakeoffError::schema(format!(
                    "Header '{header}' does not match any field of the project schema"
                )));
            }
            if !tokens.contains(&token) {
                tokens.push(token);
            }
        }
        Ok(tokens)
    }

    /// Apply an upload to a store in bounded batches. The sheet is walked
    /// twice: a first pass over natural keys only, so duplicates anywhere in
    /// the file are caught before any write, then a second pass that coerces
    /// and applies one batch at a time. At no point is more than one batch
    /// of coerced rows held in memory. Ordering per changed row: log entry,
    /// alert, then the row write.
    async fn apply_rows(
        &self,
        store: &StoreHandle,
        project: &Project,
        sheet: &ParsedSheet,
        actor: &Actor,
        provenance: &Provenance,
        description: &str,
    ) -> TakeoffResult<BatchOutcome> {
        let roles = &project.schema.roles;

        let mut seen = HashSet::new();
        let mut first_row = 0;
        for batch in self.coerce(sheet, project)? {
            upsert::ensure_unique_pks_with(&batch, &roles.pk_field, &mut seen, first_row)?;
            first_row += batch.len();
        }
        drop(seen);

        let mut outcome = BatchOutcome::default();
        for batch in self.coerce(sheet, project)? {
            let pk_values = upsert::batch_pk_values(&batch, &roles.pk_field);
            let existing =
                upsert::fetch_existing(store, project.id, &roles.pk_field, &pk_values)
                    .await
                    .map_err(|e| Self::partial(&outcome, e))?;

            let diffed = upsert::diff_batch(batch, &existing, roles, actor.super_admin)
                .map_err(|e| Self::partial(&outcome, e))?;

            self.apply_diffed(store, project, diffed, actor, provenance, description, &mut outcome)
                .await?;
        }

        Ok(outcome)
    }

    fn coerce<'a>(
        &self,
        sheet: &'a ParsedSheet,
        project: &'a Project,
    ) -> TakeoffResult<ingest::CoercedBatches<'a>> {
        ingest::coerce_batches(
            sheet,
            &project.schema,
            project.id,
            self.config.header_rows,
            self.config.batch_size,
        )
    }

    #[allow(clippy::too_many_arguments)]
    async fn apply_diffed(
        &self,
        store: &StoreHandle,
        project: &Project,
        diffed: DiffedBatch,
        actor: &Actor,
        provenance: &Provenance,
        description: &str,
        outcome: &mut BatchOutcome,
    ) -> TakeoffResult<()> {
        if !diffed.inserts.is_empty() {
            let documents: Vec<Document> =
                diffed.inserts.iter().map(|i| i.document.clone()).collect();
            store
                .collection()
                .insert_many(documents, None)
                .await
                .map_err(|e| Self::partial(outcome, e.into()))?;
            outcome.inserted += diffed.inserts.len();

            for insert in &diffed.inserts {
                if let Some(draft) = &insert.alert {
                    if self
                        .persist_alert(draft, project.id, insert.row_id.clone(), insert.pk_value.clone())
                        .await
                        .is_err()
                    {
                        outcome.audit_failures += 1;
                    }
                }
            }
        }

        for change in diffed.updates {
            let entry = LogEntry::new(
                actor,
                project.id,
                change.pk_value.clone(),
                description,
                change.old_snapshot.clone(),
                change.new_snapshot.clone(),
                provenance,
            );
            if let Err(error) = self.logs.create(&entry).await {
                tracing::error!(%error, pk = %change.pk_value, "Audit log write failed");
                outcome.audit_failures += 1;
            }

            if let Some(draft) = &change.alert {
                if self
                    .persist_alert(
                        draft,
                        project.id,
                        change.row_id_string(),
                        change.pk_value.clone(),
                    )
                    .await
                    .is_err()
                {
                    outcome.audit_failures += 1;
                }
            }

            store
                .collection()
                .update_one(
                    doc! { ROW_ID_FIELD: change.row_id.clone() },
                    doc! { "$set": change.set.clone() },
                    None,
                )
                .await
                .map_err(|e| Self::partial(outcome, e.into()))?;
            outcome.updated += 1;
        }

        Ok(())
    }

    async fn persist_alert(
        &self,
        draft: &AlertDraft,
        project_id: Uuid,
        row_id: String,
        pk_value: String,
    ) -> TakeoffResult<()> {
        let alert = AlertRecord::new(
            project_id,
            row_id,
            pk_value,
            draft.issued_qty,
            draft.consumed_qty,
            draft.balance_qty,
            draft.balance_to_issue,
        );
        self.alerts.create(&alert).await.map_err(|error| {
            tracing::error!(%error, pk = %alert.pk_value, "Alert write failed");
            error
        })
    }

    /// Wrap a mid-batch failure so the caller learns how much committed
    /// before the batch stopped. Nothing-committed failures pass through.
    fn partial(outcome: &BatchOutcome, error: TakeoffError) -> TakeoffError {
        if outcome.inserted + outcome.updated > 0 {
            TakeoffError::partial_batch(outcome.inserted, outcome.updated, error.to_string())
        } else {
            error
        }
    }
}
