//! Dynamic store provisioning.
//!
//! Every project owns an isolated collection of rows whose shape is only
//! known at runtime, so stores are bound by name rather than by a compiled
//! model. Handles are memoized per process: binding the same name twice with
//! a redefinition is driver-dependent behavior (error or silent no-op), and
//! the registry exists so nothing ever depends on that ambiguity. A store is
//! provisioned once, under one schema, and never redefined.

use std::collections::HashMap;
use std::sync::Arc;

use mongodb::{
    bson::{doc, Document},
    Collection, Database,
};
use rand::Rng;
use tokio::sync::RwLock;

use takeoff_utils::{TakeoffError, TakeoffResult};

use crate::repositories::ProjectRepository;

pub const STORE_NAME_PREFIX: &str = "mto_";

/// Bound handle to one project's row store.
#[derive(Debug, Clone)]
pub struct StoreHandle {
    name: String,
    collection: Collection<Document>,
}

impl StoreHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn collection(&self) -> &Collection<Document> {
        &self.collection
    }
}

/// Process-wide cache of store bindings, keyed by store name.
///
/// Created on first provision, looked up thereafter, never silently
/// redefined; lives for the duration of the process.
#[derive(Clone)]
pub struct StoreRegistry {
    db: Database,
    handles: Arc<RwLock<HashMap<String, StoreHandle>>>,
}

impl StoreRegistry {
    pub fn new(db: Database) -> Self {
        Self {
            db,
            handles: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    fn handle(&self, name: &str) -> StoreHandle {
        StoreHandle {
            name: name.to_string(),
            collection: self.db.collection::<Document>(name),
        }
    }

    /// Provision a brand-new store. Fails if the name is already bound in
    /// this process or the collection already exists, preventing accidental
    /// schema clobbering. The write lock is held across the existence check
    /// and the create, so two concurrent provisions of the same name cannot
    /// both pass the check.
    pub async fn provision(&self, name: &str) -> TakeoffResult<StoreHandle> {
        let mut handles = self.handles.write().await;
        if handles.contains_key(name) {
            return Err(TakeoffError::conflict(format!(
                "Store '{name}' is already provisioned"
            )));
        }

        let existing = self.db.list_collection_names(doc! {"name": name}).await?;
        if !existing.is_empty() {
            return Err(TakeoffError::conflict(format!(
                "Collection '{name}' already exists"
            )));
        }

        self.db.create_collection(name, None).await?;
        tracing::info!(store = name, "Provisioned dynamic store");

        let handle = self.handle(name);
        handles.insert(name.to_string(), handle.clone());
        Ok(handle)
    }

    /// Return the cached handle for `name`, binding it first if this process
    /// has not seen the store yet. Creates the collection only when it does
    /// not exist; an existing store is never redefined.
    pub async fn get_or_provision(&self, name: &str) -> TakeoffResult<StoreHandle> {
        if let Some(handle) = self.handles.read().await.get(name) {
            return Ok(handle.clone());
        }

        let mut handles = self.handles.write().await;
        // a racing caller may have bound the name while we waited
        if let Some(handle) = handles.get(name) {
            return Ok(handle.clone());
        }

        let existing = self.db.list_collection_names(doc! {"name": name}).await?;
        if existing.is_empty() {
            self.db.create_collection(name, None).await?;
            tracing::info!(store = name, "Provisioned dynamic store");
        }

        let handle = self.handle(name);
        handles.insert(name.to_string(), handle.clone());
        Ok(handle)
    }

    /// Look up an already-provisioned store without creating anything.
    pub async fn get(&self, name: &str) -> TakeoffResult<StoreHandle> {
        if let Some(handle) = self.handles.read().await.get(name) {
            return Ok(handle.clone());
        }

        let existing = self.db.list_collection_names(doc! {"name": name}).await?;
        if existing.is_empty() {
            return Err(TakeoffError::not_found(format!("store '{name}'")));
        }

        let handle = self.handle(name);
        self.handles
            .write()
            .await
            .insert(name.to_string(), handle.clone());
        Ok(handle)
    }

    /// Drop a store and forget its binding. Used by project cascade delete.
    pub async fn drop_store(&self, name: &str) -> TakeoffResult<()> {
        self.handles.write().await.remove(name);
        self.db.collection::<Document>(name).drop(None).await?;
        tracing::info!(store = name, "Dropped dynamic store");
        Ok(())
    }
}

/// Generate a globally unique store name: the `mto_` prefix plus a random
/// six-digit suffix, retried on collision against existing project records.
pub async fn generate_store_name(projects: &ProjectRepository) -> TakeoffResult<String> {
    generate_store_name_with(projects, || {
        rand::thread_rng().gen_range(100_000..1_000_000)
    })
    .await
}

async fn generate_store_name_with<F>(
    projects: &ProjectRepository,
    mut digits: F,
) -> TakeoffResult<String>
where
    F: FnMut() -> u32,
{
    loop {
        let candidate = format!("{STORE_NAME_PREFIX}{}", digits());

        if !projects.store_name_exists(&candidate).await? {
            return Ok(candidate);
        }
        tracing::debug!(candidate, "Store name collision, retrying");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use takeoff_models::{CreateProjectRequest, DerivedSchema, Project, RoleHints};

    async fn database() -> Database {
        let url = std::env::var("MONGODB_URL")
            .unwrap_or_else(|_| "mongodb://localhost:27017".to_string());
        let name = format!("takeoff_test_{}", uuid::Uuid::new_v4().simple());
        crate::connect(&url, &name, std::time::Duration::from_secs(5))
            .await
            .expect("MongoDB must be running for integration tests")
    }

    fn project(store_name: &str) -> Project {
        let request = CreateProjectRequest {
            name: "Store Test".to_string(),
            code: None,
            description: None,
            owner: None,
            consultant: None,
            work_order: None,
            po_date: None,
            finished_date: None,
            roles: RoleHints {
                pk: "Ident".to_string(),
                ..RoleHints::default()
            },
        };
        let headers = vec!["Ident".to_string()];
        let schema = DerivedSchema::derive(&headers, &request.roles).unwrap();
        Project::new(&request, headers, schema, store_name.to_string(), None)
    }

    #[tokio::test]
    #[ignore] // Requires a running MongoDB
    async fn test_provision_conflicts_on_existing_name() {
        let db = database().await;
        let registry = StoreRegistry::new(db.clone());

        registry.provision("mto_100001").await.unwrap();
        let err = registry.provision("mto_100001").await.unwrap_err();
        assert_eq!(err.error_code(), "CONFLICT");

        // a fresh registry has no cached binding but the collection exists
        let other = StoreRegistry::new(db.clone());
        let err = other.provision("mto_100001").await.unwrap_err();
        assert_eq!(err.error_code(), "CONFLICT");

        db.drop(None).await.unwrap();
    }

    #[tokio::test]
    #[ignore] // Requires a running MongoDB
    async fn test_get_or_provision_reuses_the_store() {
        let db = database().await;
        let registry = StoreRegistry::new(db.clone());

        let first = registry.get_or_provision("mto_100002").await.unwrap();
        first
            .collection()
            .insert_one(doc! {"ident": "A-1"}, None)
            .await
            .unwrap();

        let second = registry.get_or_provision("mto_100002").await.unwrap();
        assert_eq!(second.name(), first.name());
        assert_eq!(
            second.collection().count_documents(None, None).await.unwrap(),
            1
        );

        // a second registry binds the existing collection without wiping it
        let other = StoreRegistry::new(db.clone());
        let rebound = other.get_or_provision("mto_100002").await.unwrap();
        assert_eq!(
            rebound.collection().count_documents(None, None).await.unwrap(),
            1
        );

        db.drop(None).await.unwrap();
    }

    #[tokio::test]
    #[ignore] // Requires a running MongoDB
    async fn test_store_name_generation_retries_on_collision() {
        let db = database().await;
        let projects = ProjectRepository::new(&db);
        projects.create(&project("mto_111111")).await.unwrap();

        let mut candidates = [111_111u32, 222_222].into_iter();
        let name = generate_store_name_with(&projects, || {
            candidates.next().expect("ran out of candidates")
        })
        .await
        .unwrap();
        assert_eq!(name, "mto_222222");

        db.drop(None).await.unwrap();
    }
}
