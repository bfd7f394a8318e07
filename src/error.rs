use config_types::ModelError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ConfigError>;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("duplicate: {0}")]
    Duplicate(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    #[error("invalid delete: {0}")]
    InvalidDelete(String),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("version control: {0}")]
    VersionControl(String),

    #[error("serialization: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("internal: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<ModelError> for ConfigError {
    fn from(err: ModelError) -> Self {
        match err {
            ModelError::DuplicateBlock(_) | ModelError::DuplicateComponent(_) => {
                Self::Duplicate(err.to_string())
            }
            ModelError::BlankBlockName => Self::Validation(err.to_string()),
        }
    }
}

impl ConfigError {
    pub(crate) fn lock<E: std::fmt::Display>(err: E) -> Self {
        Self::Internal(anyhow::anyhow!("Lock: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_not_found() {
        let e = ConfigError::NotFound("TEST".into());
        assert_eq!(e.to_string(), "not found: TEST");
    }

    #[test]
    fn display_invalid_delete() {
        let e = ConfigError::InvalidDelete("Cannot delete currently active configuration".into());
        assert_eq!(
            e.to_string(),
            "invalid delete: Cannot delete currently active configuration"
        );
    }

    #[test]
    fn display_internal() {
        let e = ConfigError::Internal(anyhow::anyhow!("boom"));
        assert_eq!(e.to_string(), "internal: boom");
    }

    #[test]
    fn model_duplicate_maps_to_duplicate() {
        let e: ConfigError = ModelError::DuplicateBlock("A".into()).into();
        assert!(matches!(e, ConfigError::Duplicate(_)));
    }

    #[test]
    fn model_blank_maps_to_validation() {
        let e: ConfigError = ModelError::BlankBlockName.into();
        assert!(matches!(e, ConfigError::Validation(_)));
    }
}
