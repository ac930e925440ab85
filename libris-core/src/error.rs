//! Error types for the lifecycle engine
//!
//! Every failure a caller can see maps onto one [`ErrorKind`]. Validation and
//! duplicate failures leave no partial state; storage failures roll back the
//! enclosing transaction and are surfaced as-is, never retried here.

use crate::activation::TokenError;
use crate::identifiers::IdentifierError;
use crate::models::EntityKind;
use crate::privileges::Capability;
use thiserror::Error;
use uuid::Uuid;

/// Closed failure taxonomy exposed to the transport layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    ValidationFailure,
    DuplicateExact,
    DuplicateIdentifier,
    Forbidden,
    NotFound,
    TokenInvalid,
    StorageFailure,
    Cancelled,
}

/// Lifecycle engine error
#[derive(Debug, Error)]
pub enum CoreError {
    /// Identifier failed format or checksum validation
    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(#[from] IdentifierError),

    /// Draft or patch payload is structurally invalid
    #[error("Invalid draft: {0}")]
    InvalidDraft(String),

    /// A live work with the same title/subtitle/language already exists
    #[error("Duplicate of existing work {existing}")]
    DuplicateExact { existing: Uuid },

    /// An identifier on the draft is already attached to a live work
    #[error("Identifier {identifier} already belongs to work(s) {}", format_ids(.existing))]
    DuplicateIdentifier { identifier: String, existing: Vec<Uuid> },

    /// Actor lacks the capability the operation requires
    #[error("Forbidden: missing capability '{0}'")]
    Forbidden(Capability),

    /// Target record absent or in an incompatible state
    #[error("{kind} {id} not found: {reason}")]
    NotFound {
        kind: EntityKind,
        id: Uuid,
        reason: &'static str,
    },

    /// Activation link expired, forged or issued for another purpose
    #[error("Activation link expired or has an invalid signature")]
    TokenInvalid(#[from] TokenError),

    /// Transaction or query failure
    #[error("Storage failure: {0}")]
    Storage(#[from] sqlx::Error),

    /// Operation aborted before commit
    #[error("Operation cancelled before commit")]
    Cancelled,

    /// libris-common error other than storage
    #[error("Common error: {0}")]
    Common(libris_common::Error),
}

impl From<libris_common::Error> for CoreError {
    fn from(err: libris_common::Error) -> Self {
        match err {
            libris_common::Error::Database(db_err) => CoreError::Storage(db_err),
            other => CoreError::Common(other),
        }
    }
}

impl CoreError {
    /// Taxonomy bucket for this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            CoreError::InvalidIdentifier(_) | CoreError::InvalidDraft(_) => {
                ErrorKind::ValidationFailure
            }
            CoreError::DuplicateExact { .. } => ErrorKind::DuplicateExact,
            CoreError::DuplicateIdentifier { .. } => ErrorKind::DuplicateIdentifier,
            CoreError::Forbidden(_) => ErrorKind::Forbidden,
            CoreError::NotFound { .. } => ErrorKind::NotFound,
            CoreError::TokenInvalid(_) => ErrorKind::TokenInvalid,
            CoreError::Storage(_) | CoreError::Common(_) => ErrorKind::StorageFailure,
            CoreError::Cancelled => ErrorKind::Cancelled,
        }
    }

    /// True when resubmitting with different data can succeed
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::ValidationFailure | ErrorKind::DuplicateExact | ErrorKind::DuplicateIdentifier
        )
    }

    pub(crate) fn not_found(kind: EntityKind, id: Uuid) -> Self {
        CoreError::NotFound {
            kind,
            id,
            reason: "no such record",
        }
    }

    pub(crate) fn incompatible(kind: EntityKind, id: Uuid, reason: &'static str) -> Self {
        CoreError::NotFound { kind, id, reason }
    }

    pub(crate) fn corrupt(what: impl std::fmt::Display) -> Self {
        CoreError::Common(libris_common::Error::Internal(format!(
            "Invalid value in database: {}",
            what
        )))
    }
}

fn format_ids(ids: &[Uuid]) -> String {
    ids.iter().map(Uuid::to_string).collect::<Vec<_>>().join(", ")
}

/// Result type for lifecycle operations
pub type CoreResult<T> = Result<T, CoreError>;
