//! # Value Objects
//!
//! Batches, per-run context and the mutable state a run accumulates.

use serde::{Deserialize, Serialize};
use shared_types::{Filter, ImportFlags, ImportScope, KindName, PrimaryKeyMap, Record};

/// Contiguous same-kind slice of the snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    /// Kind of every record.
    pub kind: KindName,
    /// Records in source order.
    pub records: Vec<Record>,
    /// Same-kind records emitted before this chunk.
    pub offset: u64,
}

impl Chunk {
    /// Ordinal of the first record (1-based).
    pub fn min_ordinal(&self) -> u64 {
        self.offset + 1
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the chunk has no records.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Immutable settings of one run.
#[derive(Debug, Clone)]
pub struct RunContext {
    /// Breadth of the run.
    pub scope: ImportScope,
    /// Flags; `import_uuid` is always set.
    pub flags: ImportFlags,
    /// Active filters, derived ones included.
    pub filters: Vec<Filter>,
}

impl RunContext {
    /// Run identifier.
    pub fn import_uuid(&self) -> &str {
        self.flags.import_uuid.as_deref().unwrap_or_default()
    }
}

/// Counters reported at the end of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStats {
    /// Batches handed to an importer, deferred replays included.
    pub batches_dispatched: usize,
    /// Batches skipped because their kind is unknown or out of scope.
    pub batches_skipped: usize,
    /// Records dropped for belonging to an unknown kind.
    pub records_dropped: usize,
    /// Fields stripped for being undeclared.
    pub fields_dropped: usize,
    /// Deferred batches replayed after naming reconciliation.
    pub deferred_replayed: usize,
    /// Chunk replicas written locally.
    pub replicas_written: usize,
    /// Tenants whose names were committed.
    pub tenants_reconciled: usize,
}

/// State owned by the single active run.
#[derive(Debug, Default)]
pub struct RunState {
    /// Translations accumulated so far.
    pub pk_map: PrimaryKeyMap,
    /// Batches of the deferred kind, in source order.
    pub deferred: Vec<Chunk>,
    /// Counters.
    pub stats: RunStats,
}

/// Result of a completed run.
#[derive(Debug, Clone)]
pub struct ImportReport {
    /// Run identifier.
    pub import_uuid: String,
    /// Final translations.
    pub pk_map: PrimaryKeyMap,
    /// Counters.
    pub stats: RunStats,
}

impl From<(RunContext, RunState)> for ImportReport {
    fn from((ctx, state): (RunContext, RunState)) -> Self {
        Self {
            import_uuid: ctx.import_uuid().to_string(),
            pk_map: state.pk_map,
            stats: state.stats,
        }
    }
}
