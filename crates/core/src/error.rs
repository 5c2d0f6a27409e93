use std::collections::BTreeMap;

/// Field-level validation messages, keyed by field name.
///
/// Errors that are not tied to one field are filed under [`NON_FIELD_ERRORS`].
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
#[serde(transparent)]
pub struct FieldErrors(BTreeMap<String, Vec<String>>);

/// Key used for errors spanning several fields.
pub const NON_FIELD_ERRORS: &str = "non_field_errors";

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an error map holding a single message.
    pub fn single(field: impl Into<String>, message: impl Into<String>) -> Self {
        let mut errors = Self::new();
        errors.add(field, message);
        errors
    }

    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.0.entry(field.into()).or_default().push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, field: &str) -> Option<&[String]> {
        self.0.get(field).map(Vec::as_slice)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Vec<String>)> {
        self.0.iter()
    }
}

impl std::fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut first = true;
        for (field, messages) in &self.0 {
            if !first {
                write!(f, "; ")?;
            }
            first = false;
            write!(f, "{}: {}", field, messages.join(" "))?;
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("invalid input: {0}")]
    Validation(FieldErrors),
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },
    #[error("invalid page: {0}")]
    InvalidPage(String),
    #[error("authentication credentials were not provided or are invalid")]
    Unauthenticated,
    #[error("permission denied: {0}")]
    Permission(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("the database is busy, retry the request")]
    Busy,
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("database error: {0}")]
    Database(rusqlite::Error),
    #[error("failed to serialize record: {0}")]
    Serialization(serde_json::Error),
    #[error("failed to deserialize stored record: {0}")]
    Deserialization(serde_json::Error),
    #[error("failed to serialize YAML: {0}")]
    YamlSerialization(serde_yaml::Error),
    #[error("stored record is corrupt: {0}")]
    CorruptRecord(String),
    #[error("password hashing failed: {0}")]
    PasswordHash(String),
}

impl CoreError {
    /// Shorthand for a validation error on one field.
    pub fn field(field: impl Into<String>, message: impl Into<String>) -> Self {
        CoreError::Validation(FieldErrors::single(field, message))
    }

    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        CoreError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// True when the failure is transient and the caller may retry unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CoreError::Busy)
    }

    /// True for errors caused by the caller rather than the service.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            CoreError::Validation(_)
                | CoreError::NotFound { .. }
                | CoreError::InvalidPage(_)
                | CoreError::Unauthenticated
                | CoreError::Permission(_)
                | CoreError::Conflict(_)
        )
    }
}

impl From<rusqlite::Error> for CoreError {
    fn from(err: rusqlite::Error) -> Self {
        crate::store::translate(err)
    }
}

pub type CoreResult<T> = std::result::Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_errors_accumulate_per_field() {
        let mut errors = FieldErrors::new();
        errors.add("patient", "Patient is not active.");
        errors.add("patient", "Second message.");
        errors.add("facility", "This field is required.");

        assert_eq!(errors.get("patient").map(|m| m.len()), Some(2));
        assert!(errors.contains("facility"));
        assert_eq!(
            serde_json::to_value(&errors).expect("serialise"),
            serde_json::json!({
                "facility": ["This field is required."],
                "patient": ["Patient is not active.", "Second message."]
            })
        );
    }

    #[test]
    fn test_only_busy_is_retryable() {
        assert!(CoreError::Busy.is_retryable());
        assert!(!CoreError::Conflict("x".into()).is_retryable());
        assert!(CoreError::Unauthenticated.is_client_error());
        assert!(!CoreError::Busy.is_client_error());
    }
}
