//! Repository module for database CRUD operations
//!
//! Typed repository implementations for the fixed-shape collections:
//! projects, alerts, and audit logs. Per-project row stores are handled by
//! the store registry, not a repository, since their shape is dynamic.

pub mod alert;
pub mod log;
pub mod project;

pub use alert::AlertRepository;
pub use log::LogRepository;
pub use project::ProjectRepository;

use mongodb::{bson::Document, options::FindOptions};

/// Shared pagination defaults: one-based pages, 50 rows per page.
pub(crate) fn find_page_options(
    page: Option<u64>,
    limit: Option<i64>,
    sort: Document,
) -> FindOptions {
    let limit = limit.unwrap_or(50).max(1);
    let page = page.unwrap_or(1).max(1);
    let skip = page.saturating_sub(1).saturating_mul(limit as u64);

    FindOptions::builder()
        .skip(skip)
        .limit(limit)
        .sort(sort)
        .build()
}
