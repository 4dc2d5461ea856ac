//! Audit log entries.
//!
//! Every mutation produces one log entry per changed row, carrying the
//! actor, request provenance, and an old/new field snapshot pair captured
//! before the row was overwritten. Entries are immutable once written and
//! carry an integrity hash so tampering is detectable after the fact.

use chrono::{DateTime, Utc};
use mongodb::bson::Document;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The authenticated operator performing a mutation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Actor {
    pub id: Uuid,
    pub super_admin: bool,
}

/// Where the request came from, recorded verbatim on the audit trail.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Provenance {
    pub host: Option<String>,
    pub agent: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LogEntry {
    pub id: Uuid,
    pub actor_id: Uuid,
    pub host: Option<String>,
    pub agent: Option<String>,
    /// Free-text operation description, e.g. "Single update" or "Bulk update".
    pub description: String,
    pub project_id: Uuid,
    /// Natural key value of the row that was touched.
    pub pk_value: String,
    /// Pre-change field snapshot over the changed fields.
    pub old_values: Document,
    /// Post-change field snapshot over the same fields.
    pub new_values: Document,
    pub hash: String,
    pub created_at: DateTime<Utc>,
}

impl LogEntry {
    pub fn new(
        actor: &Actor,
        project_id: Uuid,
        pk_value: String,
        description: &str,
        old_values: Document,
        new_values: Document,
        provenance: &Provenance,
    ) -> Self {
        let created_at = Utc::now();
        let id = Uuid::new_v4();
        let hash = Self::calculate_hash(
            id,
            actor.id,
            project_id,
            &pk_value,
            &old_values,
            &new_values,
            &created_at,
        );

        Self {
            id,
            actor_id: actor.id,
            host: provenance.host.clone(),
            agent: provenance.agent.clone(),
            description: description.to_string(),
            project_id,
            pk_value,
            old_values,
            new_values,
            hash,
            created_at,
        }
    }

    fn calculate_hash(
        id: Uuid,
        actor_id: Uuid,
        project_id: Uuid,
        pk_value: &str,
        old_values: &Document,
        new_values: &Document,
        created_at: &DateTime<Utc>,
    ) -> String {
        use sha2::{Digest, Sha256};

        let mut hasher = Sha256::new();
        hasher.update(id.to_string().as_bytes());
        hasher.update(actor_id.to_string().as_bytes());
        hasher.update(project_id.to_string().as_bytes());
        hasher.update(pk_value.as_bytes());
        hasher.update(serde_json::to_string(old_values).unwrap_or_default().as_bytes());
        hasher.update(serde_json::to_string(new_values).unwrap_or_default().as_bytes());
        hasher.update(created_at.to_rfc3339().as_bytes());

        hex::encode(hasher.finalize())
    }

    pub fn verify_integrity(&self) -> bool {
        let calculated = Self::calculate_hash(
            self.id,
            self.actor_id,
            self.project_id,
            &self.pk_value,
            &self.old_values,
            &self.new_values,
            &self.created_at,
        );
        calculated == self.hash
    }
}

/// Log entry joined with its project's display name for listings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogView {
    #[serde(flatten)]
    pub entry: LogEntry,
    pub project_name: Option<String>,
}
