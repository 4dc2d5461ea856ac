//! Project domain model.
//!
//! A project describes one engineering job and the shape of its tabular
//! data. The header list, role designations, and store binding are fixed
//! when the project is created from its first spreadsheet; only descriptive
//! metadata may change afterwards.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::schema::{DerivedSchema, RoleHints};

#[derive(Debug, Clone, Serialize, Deserialize, Validate, PartialEq)]
pub struct Project {
    pub id: Uuid,
    #[validate(length(min = 1, max = 255, message = "Project name must be between 1 and 255 characters"))]
    pub name: String,
    pub code: Option<String>,
    pub description: Option<String>,
    pub owner: Option<String>,
    pub consultant: Option<String>,
    pub work_order: Option<String>,
    pub po_date: Option<NaiveDate>,
    pub finished_date: Option<NaiveDate>,

    /// Original header strings, in spreadsheet order. Immutable.
    pub headers: Vec<String>,
    /// Derived field list and role map. Immutable.
    pub schema: DerivedSchema,
    /// Name of the isolated store holding this project's rows. Immutable.
    pub store_name: String,
    /// User-chosen display subset, persisted for reuse across listings.
    pub selected_headers: Option<Vec<String>>,

    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Project {
    pub fn new(
        request: &CreateProjectRequest,
        headers: Vec<String>,
        schema: DerivedSchema,
        store_name: String,
        created_by: Option<Uuid>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: request.name.clone(),
            code: request.code.clone(),
            description: request.description.clone(),
            owner: request.owner.clone(),
            consultant: request.consultant.clone(),
            work_order: request.work_order.clone(),
            po_date: request.po_date,
            finished_date: request.finished_date,
            headers,
            schema,
            store_name,
            selected_headers: None,
            created_by,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Request to create a project together with its first spreadsheet upload.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, PartialEq)]
pub struct CreateProjectRequest {
    #[validate(length(min = 1, max = 255, message = "Project name must be between 1 and 255 characters"))]
    pub name: String,
    #[validate(length(max = 64))]
    pub code: Option<String>,
    #[validate(length(max = 2000))]
    pub description: Option<String>,
    #[validate(length(max = 255))]
    pub owner: Option<String>,
    #[validate(length(max = 255))]
    pub consultant: Option<String>,
    #[validate(length(max = 64))]
    pub work_order: Option<String>,
    pub po_date: Option<NaiveDate>,
    pub finished_date: Option<NaiveDate>,
    #[validate]
    pub roles: RoleHints,
}

/// Descriptive metadata update. Headers, roles, and the store binding have
/// no update path by design.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate, PartialEq)]
pub struct ProjectMetadataUpdate {
    #[validate(length(min = 1, max = 255))]
    pub name: Option<String>,
    #[validate(length(max = 64))]
    pub code: Option<String>,
    #[validate(length(max = 2000))]
    pub description: Option<String>,
    #[validate(length(max = 255))]
    pub owner: Option<String>,
    #[validate(length(max = 255))]
    pub consultant: Option<String>,
    #[validate(length(max = 64))]
    pub work_order: Option<String>,
    pub po_date: Option<NaiveDate>,
    pub finished_date: Option<NaiveDate>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::DerivedSchema;

    fn request() -> CreateProjectRequest {
        CreateProjectRequest {
            name: "Pipeline North".to_string(),
            code: Some("PL-N".to_string()),
            description: None,
            owner: Some("Operator".to_string()),
            consultant: None,
            work_order: None,
            po_date: None,
            finished_date: None,
            roles: RoleHints {
                pk: "Ident".to_string(),
                ..RoleHints::default()
            },
        }
    }

    #[test]
    fn test_project_carries_fixed_schema() {
        let headers = vec!["Ident".to_string(), "Issued Qty".to_string()];
        let schema = DerivedSchema::derive(&headers, &request().roles).unwrap();
        let project = Project::new(&request(), headers.clone(), schema, "mto_123456".into(), None);

        assert_eq!(project.headers, headers);
        assert_eq!(project.schema.roles.pk_field, "ident");
        assert_eq!(project.store_name, "mto_123456");
        assert!(project.selected_headers.is_none());
    }

    #[test]
    fn test_request_validation() {
        use validator::Validate;

        let ok = request();
        assert!(ok.validate().is_ok());

        let mut bad = request();
        bad.name = String::new();
        assert!(bad.validate().is_err());

        let mut bad = request();
        bad.roles.pk = String::new();
        assert!(bad.validate().is_err());
    }
}
