//! Error taxonomy shared by every core operation.

use serde::Serialize;
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Stable, client-visible classification of a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorKind {
    // input
    InvalidDto,
    BlockKindUnknown,
    InvalidBlockTree,
    DuplicateBlockId,
    RepeatedRootBlockInBlockGroup,
    OrphanBlock,
    FailedToUnmarshalSearchCursor,
    // auth
    Unauthenticated,
    WrongAccessToken,
    WrongRefreshToken,
    WrongPassword,
    PermissionDenied,
    // state
    EntityNotFound,
    NoChanges,
    MaximumDepthExceeded,
    InsertParentIntoItsChildren,
    // transactional
    FailedToCreate,
    FailedToUpdate,
    FailedToDelete,
    FailedToCommitTransaction,
    // plumbing
    Internal,
    Cancelled,
}

impl ErrorKind {
    /// Client errors are logged at warn level, everything else at error level.
    pub fn is_client_error(self) -> bool {
        !matches!(
            self,
            ErrorKind::FailedToCreate
                | ErrorKind::FailedToUpdate
                | ErrorKind::FailedToDelete
                | ErrorKind::FailedToCommitTransaction
                | ErrorKind::Internal
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug, Error)]
pub enum HubError {
    #[error("invalid input: {0}")]
    InvalidDto(String),

    #[error("unknown block type {0:?}")]
    BlockKindUnknown(String),

    #[error("invalid block tree: {0}")]
    InvalidBlockTree(String),

    #[error("block id {0} appears more than once")]
    DuplicateBlockId(Uuid),

    #[error("block group has {0} root blocks, expected exactly one")]
    RepeatedRootBlockInBlockGroup(usize),

    #[error("block {0} is not reachable from the root block")]
    OrphanBlock(Uuid),

    #[error("failed to decode search cursor: {0}")]
    FailedToUnmarshalSearchCursor(String),

    #[error("authentication required")]
    Unauthenticated,

    #[error("access token is invalid")]
    WrongAccessToken,

    #[error("permission denied on root shelf {0}")]
    PermissionDenied(Uuid),

    #[error("{entity} {id} not found")]
    EntityNotFound { entity: &'static str, id: Uuid },

    #[error("no changes: {0}")]
    NoChanges(String),

    #[error("depth {depth} exceeds the maximum of {max}")]
    MaximumDepthExceeded { depth: usize, max: usize },

    #[error("cannot move sub-shelf {source_id} into its own descendant {destination_id}")]
    InsertParentIntoItsChildren { source_id: Uuid, destination_id: Uuid },

    #[error("failed to create {0}")]
    FailedToCreate(String),

    #[error("failed to update {0}")]
    FailedToUpdate(String),

    #[error("failed to delete {0}")]
    FailedToDelete(String),

    #[error("failed to commit transaction: {0}")]
    FailedToCommitTransaction(#[source] rusqlite::Error),

    #[error("operation cancelled")]
    Cancelled,

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl HubError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            HubError::InvalidDto(_) => ErrorKind::InvalidDto,
            HubError::BlockKindUnknown(_) => ErrorKind::BlockKindUnknown,
            HubError::InvalidBlockTree(_) => ErrorKind::InvalidBlockTree,
            HubError::DuplicateBlockId(_) => ErrorKind::DuplicateBlockId,
            HubError::RepeatedRootBlockInBlockGroup(_) => ErrorKind::RepeatedRootBlockInBlockGroup,
            HubError::OrphanBlock(_) => ErrorKind::OrphanBlock,
            HubError::FailedToUnmarshalSearchCursor(_) => ErrorKind::FailedToUnmarshalSearchCursor,
            HubError::Unauthenticated => ErrorKind::Unauthenticated,
            HubError::WrongAccessToken => ErrorKind::WrongAccessToken,
            HubError::PermissionDenied(_) => ErrorKind::PermissionDenied,
            HubError::EntityNotFound { .. } => ErrorKind::EntityNotFound,
            HubError::NoChanges(_) => ErrorKind::NoChanges,
            HubError::MaximumDepthExceeded { .. } => ErrorKind::MaximumDepthExceeded,
            HubError::InsertParentIntoItsChildren { .. } => ErrorKind::InsertParentIntoItsChildren,
            HubError::FailedToCreate(_) => ErrorKind::FailedToCreate,
            HubError::FailedToUpdate(_) => ErrorKind::FailedToUpdate,
            HubError::FailedToDelete(_) => ErrorKind::FailedToDelete,
            HubError::FailedToCommitTransaction(_) => ErrorKind::FailedToCommitTransaction,
            HubError::Cancelled => ErrorKind::Cancelled,
            HubError::Database(_)
            | HubError::Pool(_)
            | HubError::Serialization(_)
            | HubError::Internal(_) => {
                ErrorKind::Internal
            }
        }
    }

    pub fn not_found(entity: &'static str, id: Uuid) -> Self {
        HubError::EntityNotFound { entity, id }
    }
}

pub type Result<T> = std::result::Result<T, HubError>;
