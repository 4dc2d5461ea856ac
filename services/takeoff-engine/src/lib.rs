//! # Material take-off engine
//!
//! Core intake pipeline for dynamically shaped MTO data: schema-aware row
//! coercion, upsert-with-diff by natural key, derived balance evaluation
//! with over-consumption alerts, CSV export, and the service facade that
//! orchestrates them against per-project stores.

pub mod evaluate;
pub mod export;
pub mod ingest;
pub mod service;
pub mod upsert;

pub use evaluate::{evaluate, AlertDraft, Evaluation};
pub use service::{ProjectUploadOutcome, RowPage, TakeoffService};
pub use upsert::{diff_batch, DiffedBatch, InsertRow, RowChange};
