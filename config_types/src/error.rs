use thiserror::Error;

/// Invariant violations raised by the entity model itself.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelError {
    #[error("block name is not unique: {0}")]
    DuplicateBlock(String),

    #[error("component already part of the configuration: {0}")]
    DuplicateComponent(String),

    #[error("block name cannot be blank")]
    BlankBlockName,
}
