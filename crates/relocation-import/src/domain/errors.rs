//! # Domain Errors
//!
//! Error types for the import engine and the ports it talks to.

use shared_types::{KindName, PrimaryKey, RemapConflict, RpcImportError};
use thiserror::Error;

/// Failure that aborts an import run.
#[derive(Debug, Error)]
pub enum ImportingError {
    /// An importer rejected a batch.
    #[error("Importing failed: {0}")]
    Importer(RpcImportError),

    /// The requested filter cannot be used with the requested scope.
    #[error("Invalid filter: {0}")]
    FilterMisuse(String),

    /// The process runs in the control domain.
    #[error("Imports must be run in region or monolith deployments only")]
    WrongDomain,

    /// The snapshot bytes are not a record array.
    #[error("Snapshot could not be decoded: {0}")]
    Decode(String),

    /// The snapshot container could not be decrypted.
    #[error(transparent)]
    Decrypt(#[from] DecryptError),

    /// Clearing existing state before a full restore failed.
    #[error("Existing state could not be reset before importing: {0}")]
    StoreReset(StoreError),

    /// The live store failed outside of the reset step.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A tenant's outbox shard could not be drained.
    #[error("Outbox shard for tenant {tenant_id} not drained after {attempts} attempt(s): {source}")]
    OutboxDrain {
        /// Tenant whose shard failed.
        tenant_id: PrimaryKey,
        /// Attempts made, the failing one included.
        attempts: u32,
        /// Last error.
        source: OutboxError,
    },

    /// Committing the final tenant names failed.
    #[error(transparent)]
    Naming(#[from] NamingError),

    /// An importer returned a translation that contradicts an earlier one.
    #[error(transparent)]
    RemapConflict(#[from] RemapConflict),

    /// A kind in the dependency graph has no registered importer.
    #[error("No importer registered for {0}")]
    MissingImporter(KindName),

    /// An importer reported an ordinal range without the matching bounds.
    #[error("Malformed import result for {kind}: {reason}")]
    MalformedImportResult {
        /// Kind of the batch.
        kind: KindName,
        /// Missing piece.
        reason: String,
    },

    /// The dependency graph is not usable.
    #[error("Invalid dependency graph: {0}")]
    InvalidGraph(String),

    /// A configuration value is out of range.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl ImportingError {
    /// Classification of the importer failure, if this is one.
    pub fn rpc_error(&self) -> Option<&RpcImportError> {
        match self {
            ImportingError::Importer(err) => Some(err),
            _ => None,
        }
    }
}

/// Live store failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// `begin` while a transaction is open, or `commit`/`rollback` without one.
    #[error("Transaction state error: {0}")]
    Transaction(String),

    /// Any other storage failure.
    #[error("Database error: {0}")]
    Database(String),
}

/// Regional outbox failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OutboxError {
    /// Flushing the shard failed; worth retrying.
    #[error("Outbox flush failed: {0}")]
    Flush(String),

    /// The store under the outbox failed; worth retrying.
    #[error("Outbox database error: {0}")]
    Database(String),

    /// Anything else.
    #[error("Outbox error: {0}")]
    Permanent(String),
}

impl OutboxError {
    /// Whether the drain may be retried.
    pub fn is_transient(&self) -> bool {
        matches!(self, OutboxError::Flush(_) | OutboxError::Database(_))
    }
}

/// Naming commit failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Naming commit failed: {0}")]
pub struct NamingError(pub String);

/// Control plane transport failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The remote side does not serve the method.
    #[error("Unknown method: {0}")]
    UnknownMethod(String),

    /// The call did not complete.
    #[error("Call failed: {0}")]
    Unavailable(String),
}

/// Snapshot decryption failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Snapshot could not be decrypted: {0}")]
pub struct DecryptError(pub String);
