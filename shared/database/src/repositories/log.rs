//! Log Repository
//!
//! Immutable audit trail. Entries are written once, one per logical row
//! mutation, and never updated afterward.

use futures::TryStreamExt;
use mongodb::{bson::doc, Collection, Database};
use uuid::Uuid;

use takeoff_models::LogEntry;
use takeoff_utils::TakeoffResult;

use super::find_page_options;

pub const LOGS_COLLECTION: &str = "logs";

#[derive(Clone)]
pub struct LogRepository {
    collection: Collection<LogEntry>,
}

impl LogRepository {
    pub fn new(db: &Database) -> Self {
        Self {
            collection: db.collection(LOGS_COLLECTION),
        }
    }

    pub async fn create(&self, entry: &LogEntry) -> TakeoffResult<()> {
        self.collection.insert_one(entry, None).await?;
        Ok(())
    }

    pub async fn insert_many(&self, entries: &[LogEntry]) -> TakeoffResult<()> {
        if entries.is_empty() {
            return Ok(());
        }
        self.collection.insert_many(entries, None).await?;
        Ok(())
    }

    /// List log entries with a total count, newest first, optionally scoped
    /// to a project.
    pub async fn list(
        &self,
        project_id: Option<Uuid>,
        page: Option<u64>,
        limit: Option<i64>,
    ) -> TakeoffResult<(Vec<LogEntry>, u64)> {
        let filter = project_id.map(|id| doc! {"project_id": id.to_string()});

        let total = self.collection.count_documents(filter.clone(), None).await?;
        let options = find_page_options(page, limit, doc! {"created_at": -1});
        let mut cursor = self.collection.find(filter, options).await?;

        let mut entries = Vec::new();
        while let Some(entry) = cursor.try_next().await? {
            entries.push(entry);
        }
        Ok((entries, total))
    }

    /// Cascade delete for a project.
    pub async fn delete_for_project(&self, project_id: Uuid) -> TakeoffResult<u64> {
        let result = self
            .collection
            .delete_many(doc! {"project_id": project_id.to_string()}, None)
            .await?;
        Ok(result.deleted_count)
    }
}
