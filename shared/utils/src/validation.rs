use crate::error::{TakeoffError, TakeoffResult};
use validator::{Validate, ValidationErrors};

pub fn validate_model<T: Validate>(model: &T) -> TakeoffResult<()> {
    match model.validate() {
        Ok(()) => Ok(()),
        Err(errors) => {
            let error_messages = format_validation_errors(&errors);
            Err(TakeoffError::validation("model", error_messages))
        }
    }
}

pub fn format_validation_errors(errors: &ValidationErrors) -> String {
    let mut messages = Vec::new();

    for (field, field_errors) in errors.field_errors() {
        for error in field_errors {
            let message = match &error.code {
                std::borrow::Cow::Borrowed("length") => {
                    format!("Length validation failed for field '{}'", field)
                }
                std::borrow::Cow::Borrowed("range") => {
                    format!("Value out of range for field '{}'", field)
                }
                std::borrow::Cow::Borrowed("required") => {
                    format!("Field '{}' is required", field)
                }
                _ => format!("Validation failed for field '{}': {}", field, error.code),
            };
            messages.push(message);
        }
    }

    messages.join(", ")
}

pub fn validate_file_type(file_name: &str, allowed_types: &[String]) -> TakeoffResult<()> {
    let extension = std::path::Path::new(file_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or("")
        .to_lowercase();

    if !allowed_types.iter().any(|t| t == &extension) {
        return Err(TakeoffError::validation(
            "file_type",
            format!(
                "File type '{}' not allowed. Allowed types: {}",
                extension,
                allowed_types.join(", ")
            ),
        ));
    }

    Ok(())
}

pub fn validate_file_size(file_size: u64, max_size: u64) -> TakeoffResult<()> {
    if file_size > max_size {
        return Err(TakeoffError::validation(
            "file_size",
            format!(
                "File size {} bytes exceeds maximum allowed size {} bytes",
                file_size, max_size
            ),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn allowed() -> Vec<String> {
        vec!["xlsx".to_string(), "xls".to_string(), "csv".to_string()]
    }

    #[test]
    fn test_validate_file_type() {
        assert!(validate_file_type("takeoff.xlsx", &allowed()).is_ok());
        assert!(validate_file_type("TAKEOFF.CSV", &allowed()).is_ok());
        assert!(validate_file_type("takeoff.pdf", &allowed()).is_err());
        assert!(validate_file_type("no_extension", &allowed()).is_err());
    }

    #[test]
    fn test_validate_file_size() {
        assert!(validate_file_size(1024, 2048).is_ok());
        assert!(validate_file_size(4096, 2048).is_err());
    }

    #[test]
    fn test_validate_model_reports_field() {
        use takeoff_models::RoleHints;

        let hints = RoleHints::default();
        let err = validate_model(&hints).unwrap_err();
        assert_eq!(err.error_code(), "VALIDATION_ERROR");
    }
}
