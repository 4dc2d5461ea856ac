//! Project Repository
//!
//! Fixed-shape project metadata collection. Descriptive fields are the only
//! mutable part of a project; headers, roles, and the store binding have no
//! update path here by design.

use std::collections::HashMap;

use chrono::Utc;
use futures::TryStreamExt;
use mongodb::{bson::doc, Collection, Database};
use uuid::Uuid;

use takeoff_models::{Project, ProjectMetadataUpdate};
use takeoff_utils::{TakeoffError, TakeoffResult};

use super::find_page_options;

pub const PROJECTS_COLLECTION: &str = "projects";

#[derive(Clone)]
pub struct ProjectRepository {
    collection: Collection<Project>,
}

impl ProjectRepository {
    pub fn new(db: &Database) -> Self {
        Self {
            collection: db.collection(PROJECTS_COLLECTION),
        }
    }

    pub async fn create(&self, project: &Project) -> TakeoffResult<()> {
        self.collection.insert_one(project, None).await?;
        Ok(())
    }

    pub async fn find_by_id(&self, id: Uuid) -> TakeoffResult<Option<Project>> {
        Ok(self
            .collection
            .find_one(doc! {"id": id.to_string()}, None)
            .await?)
    }

    /// Find a project or fail with a not-found error.
    pub async fn require(&self, id: Uuid) -> TakeoffResult<Project> {
        self.find_by_id(id)
            .await?
            .ok_or_else(|| TakeoffError::not_found(format!("project {id}")))
    }

    pub async fn store_name_exists(&self, store_name: &str) -> TakeoffResult<bool> {
        Ok(self
            .collection
            .find_one(doc! {"store_name": store_name}, None)
            .await?
            .is_some())
    }

    /// List projects with a total count, newest first.
    pub async fn list(
        &self,
        page: Option<u64>,
        limit: Option<i64>,
    ) -> TakeoffResult<(Vec<Project>, u64)> {
        let total = self.collection.count_documents(None, None).await?;

        let options = find_page_options(page, limit, doc! {"created_at": -1});
        let mut cursor = self.collection.find(None, options).await?;
        let mut projects = Vec::new();
        while let Some(project) = cursor.try_next().await? {
            projects.push(project);
        }

        Ok((projects, total))
    }

    /// Update descriptive metadata only; returns the updated project.
    pub async fn update_metadata(
        &self,
        id: Uuid,
        update: &ProjectMetadataUpdate,
    ) -> TakeoffResult<Option<Project>> {
        let Some(mut project) = self.find_by_id(id).await? else {
            return Ok(None);
        };

        if let Some(name) = &update.name {
            project.name = name.clone();
        }
        if let Some(code) = &update.code {
            project.code = Some(code.clone());
        }
        if let Some(description) = &update.description {
            project.description = Some(description.clone());
        }
        if let Some(owner) = &update.owner {
            project.owner = Some(owner.clone());
        }
        if let Some(consultant) = &update.consultant {
            project.consultant = Some(consultant.clone());
        }
        if let Some(work_order) = &update.work_order {
            project.work_order = Some(work_order.clone());
        }
        if let Some(po_date) = update.po_date {
            project.po_date = Some(po_date);
        }
        if let Some(finished_date) = update.finished_date {
            project.finished_date = Some(finished_date);
        }
        project.updated_at = Utc::now();

        self.collection
            .replace_one(doc! {"id": id.to_string()}, &project, None)
            .await?;
        Ok(Some(project))
    }

    /// Persist a user-chosen display header subset for reuse.
    pub async fn set_selected_headers(&self, id: Uuid, headers: &[String]) -> TakeoffResult<()> {
        self.collection
            .update_one(
                doc! {"id": id.to_string()},
                doc! {"$set": {
                    "selected_headers": headers.to_vec(),
                    "updated_at": Utc::now().to_rfc3339(),
                }},
                None,
            )
            .await?;
        Ok(())
    }

    pub async fn delete(&self, id: Uuid) -> TakeoffResult<bool> {
        let result = self
            .collection
            .delete_one(doc! {"id": id.to_string()}, None)
            .await?;
        Ok(result.deleted_count > 0)
    }

    /// Display names for a set of projects, used to populate alert and log
    /// listings.
    pub async fn display_names(&self, ids: &[Uuid]) -> TakeoffResult<HashMap<Uuid, String>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let id_strings: Vec<String> = ids.iter().map(|id| id.to_string()).collect();
        let mut cursor = self
            .collection
            .find(doc! {"id": {"$in": id_strings}}, None)
            .await?;

        let mut names = HashMap::new();
        while let Some(project) = cursor.try_next().await? {
            names.insert(project.id, project.name);
        }
        Ok(names)
    }
}
