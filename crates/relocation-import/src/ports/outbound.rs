//! # Outbound Ports
//!
//! Traits for the collaborators the engine drives: per-kind importers, the
//! live store, the regional outbox, the naming service and the control plane
//! transport.

use async_trait::async_trait;
use parking_lot::Mutex;
use shared_types::{ChunkReplica, ImportOk, ImportRequest, KindName, PrimaryKey, RpcImportError};
use std::collections::BTreeMap;

use crate::domain::{DecryptError, NamingError, OutboxError, StoreError, TransportError};

/// Validates and persists one batch of one kind - outbound port.
///
/// Implementations may run in-process or forward the request to the domain
/// owning the kind.
#[async_trait]
pub trait Importer: Send + Sync {
    /// Import the batch and report the translations it produced.
    async fn import_batch(&self, request: ImportRequest) -> Result<ImportOk, RpcImportError>;
}

/// Live store of the current domain - outbound port.
#[async_trait]
pub trait LiveStore: Send + Sync {
    /// Open the enclosing transaction.
    async fn begin(&self) -> Result<(), StoreError>;

    /// Commit the enclosing transaction.
    async fn commit(&self) -> Result<(), StoreError>;

    /// Discard everything written since `begin`.
    async fn rollback(&self) -> Result<(), StoreError>;

    /// Delete every record of `kind`.
    async fn clear_kind(&self, kind: &KindName) -> Result<(), StoreError>;

    /// Restart the identifier sequence of `kind`.
    async fn reset_sequence(&self, kind: &KindName) -> Result<(), StoreError>;

    /// Replica previously written for `(import_uuid, kind, min_ordinal)`.
    async fn find_chunk_replica(
        &self,
        import_uuid: &str,
        kind: &KindName,
        min_ordinal: u64,
    ) -> Result<Option<ChunkReplica>, StoreError>;

    /// Persist a replica.
    async fn insert_chunk_replica(&self, replica: ChunkReplica) -> Result<(), StoreError>;
}

/// Backlog of regional side effects, sharded per tenant - outbound port.
#[async_trait]
pub trait RegionOutbox: Send + Sync {
    /// Deliver every pending side effect of one tenant.
    async fn drain_shard(&self, tenant_id: PrimaryKey) -> Result<(), OutboxError>;
}

/// Global naming authority in the control domain - outbound port.
#[async_trait]
pub trait NamingService: Send + Sync {
    /// Commit `tenant id → final name` in one call.
    async fn bulk_commit_names(&self, names: BTreeMap<PrimaryKey, String>)
        -> Result<(), NamingError>;
}

/// Request/response channel into the control domain - outbound port.
#[async_trait]
pub trait ControlPlaneTransport: Send + Sync {
    /// Invoke `method` with an encoded payload.
    async fn call(&self, method: &str, payload: Vec<u8>) -> Result<Vec<u8>, TransportError>;
}

/// Snapshot container decryption.
pub trait Decryptor: Send + Sync {
    /// Return the plain snapshot bytes.
    fn decrypt(&self, bytes: &[u8]) -> Result<Vec<u8>, DecryptError>;
}

/// Progress and error output of the invoking tool.
pub trait Printer: Send + Sync {
    /// Emit one message.
    fn echo(&self, text: &str, is_err: bool);
}

// =============================================================================
// Simple Implementations
// =============================================================================

/// Printer that discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopPrinter;

impl Printer for NoopPrinter {
    fn echo(&self, _text: &str, _is_err: bool) {}
}

/// Printer that keeps every message, for tests and embedders.
#[derive(Debug, Default)]
pub struct CollectingPrinter {
    lines: Mutex<Vec<(String, bool)>>,
}

impl CollectingPrinter {
    /// Create an empty printer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every message with its error flag.
    pub fn lines(&self) -> Vec<(String, bool)> {
        self.lines.lock().clone()
    }

    /// Messages emitted as errors.
    pub fn errors(&self) -> Vec<String> {
        self.lines
            .lock()
            .iter()
            .filter(|(_, is_err)| *is_err)
            .map(|(text, _)| text.clone())
            .collect()
    }
}

impl Printer for CollectingPrinter {
    fn echo(&self, text: &str, is_err: bool) {
        self.lines.lock().push((text.to_string(), is_err));
    }
}

/// Decryptor for snapshots that are not encrypted.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlaintextDecryptor;

impl Decryptor for PlaintextDecryptor {
    fn decrypt(&self, bytes: &[u8]) -> Result<Vec<u8>, DecryptError> {
        Ok(bytes.to_vec())
    }
}
