//! Error types for CRM operations

use crate::{EntityType, TenantId};
use thiserror::Error;
use uuid::Uuid;

/// Errors raised while computing or authorizing a position change.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ReorderError {
    /// Neither neighbor was supplied, the neighbors are out of order, or a
    /// neighbor is not a finite number.
    #[error("Invalid reorder input: {reason}")]
    InvalidReorderInput { reason: String },

    /// The acting tenant does not own the item being moved.
    #[error("Tenant {acting} is not allowed to modify {entity_type:?} owned by tenant {owner}")]
    Unauthorized {
        entity_type: EntityType,
        acting: TenantId,
        owner: TenantId,
    },
}

impl ReorderError {
    pub fn invalid(reason: impl Into<String>) -> Self {
        Self::InvalidReorderInput {
            reason: reason.into(),
        }
    }
}

/// Storage layer errors. Anything other than `NotFound` is a persistence
/// failure from the caller's point of view.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("Entity not found: {entity_type:?} with id {id}")]
    NotFound { entity_type: EntityType, id: Uuid },

    #[error("Insert failed for {entity_type:?}: {reason}")]
    InsertFailed { entity_type: EntityType, reason: String },

    #[error("Update failed for {entity_type:?} with id {id}: {reason}")]
    UpdateFailed {
        entity_type: EntityType,
        id: Uuid,
        reason: String,
    },

    #[error("Delete failed for {entity_type:?} with id {id}: {reason}")]
    DeleteFailed {
        entity_type: EntityType,
        id: Uuid,
        reason: String,
    },

    #[error("Transaction failed: {reason}")]
    TransactionFailed { reason: String },

    #[error("Storage lock poisoned")]
    LockPoisoned,

    #[error("Storage backend error: {reason}")]
    Backend { reason: String },
}

/// Validation errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Required field missing: {field}")]
    RequiredFieldMissing { field: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },
}

/// Master error type for all CRM errors.
#[derive(Debug, Clone, Error)]
pub enum CrmError {
    #[error("Reorder error: {0}")]
    Reorder(#[from] ReorderError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

impl CrmError {
    /// True for failures of the persistence collaborator (everything in
    /// the storage layer except a missing row).
    pub fn is_persistence_failure(&self) -> bool {
        matches!(self, CrmError::Storage(e) if !matches!(e, StorageError::NotFound { .. }))
    }
}

/// Result type alias for CRM operations.
pub type CrmResult<T> = Result<T, CrmError>;

// =============================================================================
// TESTS
// =============================================================================
