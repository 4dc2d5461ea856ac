use serde::{Deserialize, Serialize};
use thiserror::Error;

use takeoff_models::SchemaError;

#[derive(Error, Debug, Clone, Serialize, Deserialize)]
pub enum TakeoffError {
    #[error("Validation error: {field} - {message}")]
    Validation { field: String, message: String },

    #[error("Schema error: {message}")]
    Schema { message: String },

    #[error("Not found: {resource}")]
    NotFound { resource: String },

    #[error("Conflict: {message}")]
    Conflict { message: String },

    #[error("Authorization error: {message}")]
    Authorization { message: String },

    #[error("Partial batch failure after {inserted} inserts and {updated} updates: {message}")]
    PartialBatch {
        inserted: usize,
        updated: usize,
        message: String,
    },

    #[error("Storage unavailable: {message}")]
    StorageUnavailable { message: String },

    #[error("Database error: {message}")]
    Database { message: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Internal server error: {message}")]
    Internal { message: String },
}

impl TakeoffError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn schema(message: impl Into<String>) -> Self {
        Self::Schema {
            message: message.into(),
        }
    }

    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    pub fn authorization(message: impl Into<String>) -> Self {
        Self::Authorization {
            message: message.into(),
        }
    }

    pub fn partial_batch(inserted: usize, updated: usize, message: impl Into<String>) -> Self {
        Self::PartialBatch {
            inserted,
            updated,
            message: message.into(),
        }
    }

    pub fn storage_unavailable(message: impl Into<String>) -> Self {
        Self::StorageUnavailable {
            message: message.into(),
        }
    }

    pub fn database(message: impl Into<String>) -> Self {
        Self::Database {
            message: message.into(),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "VALIDATION_ERROR",
            Self::Schema { .. } => "SCHEMA_ERROR",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::Conflict { .. } => "CONFLICT",
            Self::Authorization { .. } => "AUTHORIZATION_ERROR",
            Self::PartialBatch { .. } => "PARTIAL_BATCH_FAILURE",
            Self::StorageUnavailable { .. } => "STORAGE_UNAVAILABLE",
            Self::Database { .. } => "DATABASE_ERROR",
            Self::Configuration { .. } => "CONFIGURATION_ERROR",
            Self::Internal { .. } => "INTERNAL_SERVER_ERROR",
        }
    }

    pub fn http_status_code(&self) -> u16 {
        match self {
            Self::Validation { .. } => 400,
            Self::Schema { .. } => 422,
            Self::NotFound { .. } => 404,
            Self::Conflict { .. } => 409,
            Self::Authorization { .. } => 403,
            Self::PartialBatch { .. } => 500,
            Self::StorageUnavailable { .. } => 503,
            Self::Database { .. } => 500,
            Self::Configuration { .. } => 500,
            Self::Internal { .. } => 500,
        }
    }
}

pub type TakeoffResult<T> = Result<T, TakeoffError>;

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
    pub message: String,
    pub details: Option<serde_json::Value>,
}

impl From<TakeoffError> for ErrorResponse {
    fn from(error: TakeoffError) -> Self {
        Self {
            error: error.to_string(),
            code: error.error_code().to_string(),
            message: error.to_string(),
            details: None,
        }
    }
}

// Conversion from common error types
impl From<mongodb::error::Error> for TakeoffError {
    fn from(error: mongodb::error::Error) -> Self {
        use mongodb::error::ErrorKind;

        match *error.kind {
            ErrorKind::ServerSelection { .. } => Self::storage_unavailable(error.to_string()),
            _ => Self::database(error.to_string()),
        }
    }
}

impl From<SchemaError> for TakeoffError {
    fn from(error: SchemaError) -> Self {
        Self::schema(error.to_string())
    }
}

impl From<serde_json::Error> for TakeoffError {
    fn from(error: serde_json::Error) -> Self {
        Self::validation("JSON", error.to_string())
    }
}
