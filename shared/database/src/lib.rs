//! # Material take-off persistence layer
//!
//! MongoDB-backed storage: a connection helper, typed repositories for the
//! fixed-shape collections (projects, alerts, logs), and the dynamic store
//! registry that binds each project to its isolated row collection.

pub mod mongodb;
pub mod repositories;
pub mod store;

pub use mongodb::{connect, health_check};
pub use repositories::{AlertRepository, LogRepository, ProjectRepository};
pub use store::{generate_store_name, StoreHandle, StoreRegistry, STORE_NAME_PREFIX};
