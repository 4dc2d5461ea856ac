//! Alert Repository
//!
//! Append-only over-consumption alerts. Alerts are created as a side effect
//! of writes that produce a negative balance and are read-only afterward.

use futures::TryStreamExt;
use mongodb::{bson::doc, Collection, Database};
use uuid::Uuid;

use takeoff_models::AlertRecord;
use takeoff_utils::TakeoffResult;

use super::find_page_options;

pub const ALERTS_COLLECTION: &str = "alerts";

#[derive(Clone)]
pub struct AlertRepository {
    collection: Collection<AlertRecord>,
}

impl AlertRepository {
    pub fn new(db: &Database) -> Self {
        Self {
            collection: db.collection(ALERTS_COLLECTION),
        }
    }

    pub async fn create(&self, alert: &AlertRecord) -> TakeoffResult<()> {
        self.collection.insert_one(alert, None).await?;
        Ok(())
    }

    /// List alerts with a total count, newest first, optionally scoped to a
    /// project.
    pub async fn list(
        &self,
        project_id: Option<Uuid>,
        page: Option<u64>,
        limit: Option<i64>,
    ) -> TakeoffResult<(Vec<AlertRecord>, u64)> {
        let filter = project_id.map(|id| doc! {"project_id": id.to_string()});

        let total = self.collection.count_documents(filter.clone(), None).await?;
        let options = find_page_options(page, limit, doc! {"raised_at": -1});
        let mut cursor = self.collection.find(filter, options).await?;

        let mut alerts = Vec::new();
        while let Some(alert) = cursor.try_next().await? {
            alerts.push(alert);
        }
        Ok((alerts, total))
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
