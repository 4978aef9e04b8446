//! # In-Memory Adapters
//!
//! Store, outbox, naming service and a generic per-kind importer kept
//! entirely in memory. Used by tests and by embedders without a backend.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Map, Value};
use shared_types::{
    ChunkReplica, Domain, ImportFlags, ImportOk, ImportRequest, InstanceId, KindName, PrimaryKey,
    PrimaryKeyMap, Provenance, Record, RpcImportError, RpcImportErrorKind,
};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::Arc;

use crate::domain::{KindDescriptor, NamingError, OutboxError, StoreError};
use crate::ports::{Importer, LiveStore, NamingService, RegionOutbox};

// =============================================================================
// Journal
// =============================================================================

/// Cross-adapter event, used to check ordering between collaborators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JournalEntry {
    /// An importer received a batch.
    Imported {
        /// Kind of the batch.
        kind: KindName,
        /// First ordinal of the batch.
        min_ordinal: u64,
    },
    /// A tenant's outbox shard was drained.
    Drained(PrimaryKey),
    /// Names were committed for these tenants.
    NamesCommitted(Vec<PrimaryKey>),
}

/// Shared, append-only event log.
#[derive(Debug, Default)]
pub struct Journal {
    entries: Mutex<Vec<JournalEntry>>,
}

impl Journal {
    /// Create an empty journal behind an `Arc`.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Append an entry.
    pub fn record(&self, entry: JournalEntry) {
        self.entries.lock().push(entry);
    }

    /// Snapshot of every entry.
    pub fn entries(&self) -> Vec<JournalEntry> {
        self.entries.lock().clone()
    }

    /// Index of the first entry matching `pred`.
    pub fn position(&self, pred: impl Fn(&JournalEntry) -> bool) -> Option<usize> {
        self.entries.lock().iter().position(pred)
    }

    /// Batches imported for `kind`, as min ordinals in dispatch order.
    pub fn imported(&self, kind: &str) -> Vec<u64> {
        self.entries
            .lock()
            .iter()
            .filter_map(|e| match e {
                JournalEntry::Imported { kind: k, min_ordinal } if k.as_str() == kind => {
                    Some(*min_ordinal)
                }
                _ => None,
            })
            .collect()
    }
}

// =============================================================================
// Store
// =============================================================================

/// Operation applied to an `InMemoryStore` through the `LiveStore` port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreOperation {
    /// Transaction opened.
    Begin,
    /// Transaction committed.
    Commit,
    /// Transaction rolled back.
    Rollback,
    /// Kind cleared.
    Clear(KindName),
    /// Sequence reset.
    ResetSequence(KindName),
}

#[derive(Debug, Clone, Default)]
struct Tables {
    rows: BTreeMap<KindName, BTreeMap<PrimaryKey, Record>>,
    sequences: BTreeMap<KindName, PrimaryKey>,
    replicas: Vec<ChunkReplica>,
}

impl Tables {
    fn next_id(&mut self, kind: &KindName) -> PrimaryKey {
        let next = self.sequences.entry(kind.clone()).or_insert(0);
        *next += 1;
        *next
    }
}

/// In-memory live store with one level of transaction.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    tables: Mutex<Tables>,
    checkpoint: Mutex<Option<Tables>>,
    operations: Mutex<Vec<StoreOperation>>,
    fail_clear: Mutex<Option<KindName>>,
}

impl InMemoryStore {
    /// Create an empty store behind an `Arc`.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Put a pre-existing row in place, keeping its identifier.
    pub fn seed(&self, record: Record) {
        let mut tables = self.tables.lock();
        let seq = tables.sequences.entry(record.kind.clone()).or_insert(0);
        *seq = (*seq).max(record.pk);
        tables
            .rows
            .entry(record.kind.clone())
            .or_default()
            .insert(record.pk, record);
    }

    /// Insert a row under a freshly allocated identifier.
    pub fn insert(&self, kind: &KindName, fields: Map<String, Value>) -> PrimaryKey {
        let mut tables = self.tables.lock();
        let id = tables.next_id(kind);
        tables.rows.entry(kind.clone()).or_default().insert(
            id,
            Record {
                kind: kind.clone(),
                pk: id,
                fields,
            },
        );
        id
    }

    /// Replace the fields of an existing row.
    pub fn overwrite(&self, kind: &KindName, id: PrimaryKey, fields: Map<String, Value>) {
        if let Some(row) = self
            .tables
            .lock()
            .rows
            .get_mut(kind)
            .and_then(|rows| rows.get_mut(&id))
        {
            row.fields = fields;
        }
    }

    /// Identifier of the row of `kind` whose `field` equals `value`.
    pub fn find_by_field(&self, kind: &KindName, field: &str, value: &str) -> Option<PrimaryKey> {
        self.tables.lock().rows.get(kind).and_then(|rows| {
            rows.values()
                .find(|r| r.str_field(field) == Some(value))
                .map(|r| r.pk)
        })
    }

    /// Row by identifier.
    pub fn get(&self, kind: &str, id: PrimaryKey) -> Option<Record> {
        self.tables
            .lock()
            .rows
            .get(&KindName::new(kind))
            .and_then(|rows| rows.get(&id).cloned())
    }

    /// All rows of `kind` in identifier order.
    pub fn rows(&self, kind: &str) -> Vec<Record> {
        self.tables
            .lock()
            .rows
            .get(&KindName::new(kind))
            .map(|rows| rows.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of rows of `kind`.
    pub fn count(&self, kind: &str) -> usize {
        self.tables
            .lock()
            .rows
            .get(&KindName::new(kind))
            .map_or(0, BTreeMap::len)
    }

    /// Every replica written.
    pub fn replicas(&self) -> Vec<ChunkReplica> {
        self.tables.lock().replicas.clone()
    }

    /// Operations applied through the `LiveStore` port.
    pub fn operations(&self) -> Vec<StoreOperation> {
        self.operations.lock().clone()
    }

    /// Whether a transaction is open.
    pub fn in_transaction(&self) -> bool {
        self.checkpoint.lock().is_some()
    }

    /// Make clearing `kind` fail.
    pub fn fail_clear_of(&self, kind: impl Into<KindName>) {
        *self.fail_clear.lock() = Some(kind.into());
    }

    fn log(&self, op: StoreOperation) {
        self.operations.lock().push(op);
    }
}

#[async_trait]
impl LiveStore for InMemoryStore {
    async fn begin(&self) -> Result<(), StoreError> {
        let mut checkpoint = self.checkpoint.lock();
        if checkpoint.is_some() {
            return Err(StoreError::Transaction("already in a transaction".into()));
        }
        *checkpoint = Some(self.tables.lock().clone());
        self.log(StoreOperation::Begin);
        Ok(())
    }

    async fn commit(&self) -> Result<(), StoreError> {
        if self.checkpoint.lock().take().is_none() {
            return Err(StoreError::Transaction("no transaction to commit".into()));
        }
        self.log(StoreOperation::Commit);
        Ok(())
    }

    async fn rollback(&self) -> Result<(), StoreError> {
        let saved = self
            .checkpoint
            .lock()
            .take()
            .ok_or_else(|| StoreError::Transaction("no transaction to roll back".into()))?;
        *self.tables.lock() = saved;
        self.log(StoreOperation::Rollback);
        Ok(())
    }

    async fn clear_kind(&self, kind: &KindName) -> Result<(), StoreError> {
        if self.fail_clear.lock().as_ref() == Some(kind) {
            return Err(StoreError::Database(format!("{kind} is locked")));
        }
        self.tables.lock().rows.remove(kind);
        self.log(StoreOperation::Clear(kind.clone()));
        Ok(())
    }

    async fn reset_sequence(&self, kind: &KindName) -> Result<(), StoreError> {
        self.tables.lock().sequences.remove(kind);
        self.log(StoreOperation::ResetSequence(kind.clone()));
        Ok(())
    }

    async fn find_chunk_replica(
        &self,
        import_uuid: &str,
        kind: &KindName,
        min_ordinal: u64,
    ) -> Result<Option<ChunkReplica>, StoreError> {
        Ok(self
            .tables
            .lock()
            .replicas
            .iter()
            .find(|r| r.import_uuid == import_uuid && &r.kind == kind && r.min_ordinal == min_ordinal)
            .cloned())
    }

    async fn insert_chunk_replica(&self, replica: ChunkReplica) -> Result<(), StoreError> {
        self.tables.lock().replicas.push(replica);
        Ok(())
    }
}

// =============================================================================
// Outbox
// =============================================================================

/// In-memory regional outbox with scripted failures.
#[derive(Debug, Default)]
pub struct InMemoryRegionOutbox {
    pending: Mutex<BTreeMap<PrimaryKey, usize>>,
    failures: Mutex<VecDeque<OutboxError>>,
    calls: Mutex<Vec<PrimaryKey>>,
    journal: Option<Arc<Journal>>,
}

impl InMemoryRegionOutbox {
    /// Create an empty outbox.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record drains in `journal`.
    pub fn with_journal(mut self, journal: Arc<Journal>) -> Self {
        self.journal = Some(journal);
        self
    }

    /// Queue `count` side effects for a tenant.
    pub fn enqueue(&self, tenant_id: PrimaryKey, count: usize) {
        *self.pending.lock().entry(tenant_id).or_insert(0) += count;
    }

    /// Make the next drain call fail with `err`.
    pub fn fail_next(&self, err: OutboxError) {
        self.failures.lock().push_back(err);
    }

    /// Tenants passed to `drain_shard`, in call order.
    pub fn drain_calls(&self) -> Vec<PrimaryKey> {
        self.calls.lock().clone()
    }

    /// Side effects still queued for a tenant.
    pub fn pending_for(&self, tenant_id: PrimaryKey) -> usize {
        self.pending.lock().get(&tenant_id).copied().unwrap_or(0)
    }
}

#[async_trait]
impl RegionOutbox for InMemoryRegionOutbox {
    async fn drain_shard(&self, tenant_id: PrimaryKey) -> Result<(), OutboxError> {
        self.calls.lock().push(tenant_id);
        if let Some(err) = self.failures.lock().pop_front() {
            return Err(err);
        }
        self.pending.lock().remove(&tenant_id);
        if let Some(journal) = &self.journal {
            journal.record(JournalEntry::Drained(tenant_id));
        }
        Ok(())
    }
}

// =============================================================================
// Naming service
// =============================================================================

/// Naming service that records every commit.
#[derive(Debug, Default)]
pub struct RecordingNamingService {
    commits: Mutex<Vec<BTreeMap<PrimaryKey, String>>>,
    failure: Mutex<Option<NamingError>>,
    journal: Option<Arc<Journal>>,
}

impl RecordingNamingService {
    /// Create a service with no commits.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record commits in `journal`.
    pub fn with_journal(mut self, journal: Arc<Journal>) -> Self {
        self.journal = Some(journal);
        self
    }

    /// Make the next commit fail.
    pub fn fail_next(&self, err: NamingError) {
        *self.failure.lock() = Some(err);
    }

    /// Every committed mapping, in call order.
    pub fn commits(&self) -> Vec<BTreeMap<PrimaryKey, String>> {
        self.commits.lock().clone()
    }
}

#[async_trait]
impl NamingService for RecordingNamingService {
    async fn bulk_commit_names(
        &self,
        names: BTreeMap<PrimaryKey, String>,
    ) -> Result<(), NamingError> {
        if let Some(err) = self.failure.lock().take() {
            return Err(err);
        }
        if let Some(journal) = &self.journal {
            journal.record(JournalEntry::NamesCommitted(names.keys().copied().collect()));
        }
        self.commits.lock().push(names);
        Ok(())
    }
}

// =============================================================================
// Table importer
// =============================================================================

/// What to do when an incoming natural name is already taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollisionPolicy {
    /// Insert under a suffixed name.
    Rename,
    /// Reuse the existing row when `merge_users` is set, otherwise rename.
    MergeWhenFlagged,
    /// Overwrite the existing row when `overwrite_configs` is set,
    /// otherwise keep it.
    OverwriteWhenFlagged,
    /// Fail with an integrity error.
    Reject,
}

#[derive(Debug, Clone)]
struct NaturalKey {
    field: String,
    policy: CollisionPolicy,
}

/// Generic importer writing one kind into an `InMemoryStore`.
///
/// Foreign keys are rewritten through the request's remap slice; records
/// whose references were not imported are skipped, as are records rejected
/// by a filter. Ordinals count imported records only.
pub struct TableImporter {
    store: Arc<InMemoryStore>,
    descriptor: KindDescriptor,
    serving: Domain,
    natural_key: Option<NaturalKey>,
    fail_on: Mutex<BTreeSet<PrimaryKey>>,
    requests: Mutex<Vec<ImportRequest>>,
    journal: Option<Arc<Journal>>,
}

impl TableImporter {
    /// Importer for `descriptor`, serving one of the domains that own it.
    pub fn new(store: Arc<InMemoryStore>, descriptor: KindDescriptor) -> Self {
        let serving = descriptor
            .domains
            .iter()
            .next()
            .copied()
            .unwrap_or(Domain::Region);
        Self {
            store,
            descriptor,
            serving,
            natural_key: None,
            fail_on: Mutex::new(BTreeSet::new()),
            requests: Mutex::new(Vec::new()),
            journal: None,
        }
    }

    /// Pretend to run in `domain`.
    pub fn serving(mut self, domain: Domain) -> Self {
        self.serving = domain;
        self
    }

    /// Treat `field` as a unique natural name.
    pub fn natural_key(mut self, field: &str, policy: CollisionPolicy) -> Self {
        self.natural_key = Some(NaturalKey {
            field: field.to_string(),
            policy,
        });
        self
    }

    /// Record received batches in `journal`.
    pub fn with_journal(mut self, journal: Arc<Journal>) -> Self {
        self.journal = Some(journal);
        self
    }

    /// Fail with an integrity error when the record with source id `pk`
    /// is written.
    pub fn fail_on(&self, pk: PrimaryKey) {
        self.fail_on.lock().insert(pk);
    }

    /// Every request received.
    pub fn requests(&self) -> Vec<ImportRequest> {
        self.requests.lock().clone()
    }

    fn error(&self, kind: RpcImportErrorKind, ordinal: Option<u64>, reason: impl Into<String>) -> RpcImportError {
        RpcImportError::new(
            kind,
            InstanceId::new(self.descriptor.kind.clone(), ordinal),
            reason,
        )
    }

    fn remap_foreign_keys(
        &self,
        record: &Record,
        slice: &PrimaryKeyMap,
        own: &PrimaryKeyMap,
    ) -> Option<Map<String, Value>> {
        let mut fields = record.fields.clone();
        for (field, target) in &self.descriptor.foreign_keys {
            let Some(old) = record.int_field(field) else {
                continue;
            };
            let new = slice
                .get_new_id(target, old)
                .or_else(|| own.get_new_id(target, old))?;
            fields.insert(field.clone(), Value::from(new));
        }
        Some(fields)
    }

    fn write(
        &self,
        mut fields: Map<String, Value>,
        flags: &ImportFlags,
    ) -> Result<(PrimaryKey, Provenance, Option<String>), String> {
        let kind = &self.descriptor.kind;
        let Some(key) = &self.natural_key else {
            return Ok((self.store.insert(kind, fields), Provenance::Inserted, None));
        };
        let Some(name) = fields.get(&key.field).and_then(Value::as_str).map(str::to_string) else {
            return Ok((self.store.insert(kind, fields), Provenance::Inserted, None));
        };

        let Some(existing) = self.store.find_by_field(kind, &key.field, &name) else {
            return Ok((self.store.insert(kind, fields), Provenance::Inserted, Some(name)));
        };

        match key.policy {
            CollisionPolicy::Reject => Err(format!("{} {:?} already exists", key.field, name)),
            CollisionPolicy::MergeWhenFlagged if flags.merge_users => {
                Ok((existing, Provenance::Existing, Some(name)))
            }
            CollisionPolicy::OverwriteWhenFlagged if flags.overwrite_configs => {
                self.store.overwrite(kind, existing, fields);
                Ok((existing, Provenance::Overwritten, Some(name)))
            }
            CollisionPolicy::OverwriteWhenFlagged => Ok((existing, Provenance::Existing, Some(name))),
            CollisionPolicy::Rename | CollisionPolicy::MergeWhenFlagged => {
                let mut suffix = 1;
                let renamed = loop {
                    let candidate = format!("{name}-{suffix}");
                    if self.store.find_by_field(kind, &key.field, &candidate).is_none() {
                        break candidate;
                    }
                    suffix += 1;
                };
                fields.insert(key.field.clone(), Value::from(renamed.clone()));
                Ok((self.store.insert(kind, fields), Provenance::Inserted, Some(renamed)))
            }
        }
    }
}

#[async_trait]
impl Importer for TableImporter {
    async fn import_batch(&self, request: ImportRequest) -> Result<ImportOk, RpcImportError> {
        if let Some(journal) = &self.journal {
            journal.record(JournalEntry::Imported {
                kind: request.kind.clone(),
                min_ordinal: request.min_ordinal,
            });
        }
        self.requests.lock().push(request.clone());

        let kind = &self.descriptor.kind;
        if &request.kind != kind {
            return Err(RpcImportError::new(
                RpcImportErrorKind::UnknownModel,
                InstanceId::new(request.kind.clone(), None),
                format!("this importer serves {kind}"),
            ));
        }
        if !self.descriptor.domains.contains(&self.serving) {
            return Err(self.error(
                RpcImportErrorKind::IncorrectSiloModeForModel,
                None,
                format!("{kind} is not owned by the {:?} domain", self.serving),
            ));
        }

        let mut mapped = PrimaryKeyMap::new();
        let mut ok = ImportOk::empty();
        let mut next_ordinal = request.min_ordinal;

        for (index, record) in request.records.iter().enumerate() {
            let position = request.min_ordinal + index as u64;
            if &record.kind != kind {
                return Err(self.error(
                    RpcImportErrorKind::UnexpectedModel,
                    Some(position),
                    format!("found {} in a {kind} batch", record.kind),
                ));
            }
            if !request.filters.iter().all(|f| f.admits(record)) {
                continue;
            }
            let Some(fields) = self.remap_foreign_keys(record, &request.pk_map, &mapped) else {
                tracing::trace!(kind = %kind, pk = record.pk, "Skipping record with unmapped reference");
                continue;
            };
            if self.fail_on.lock().contains(&record.pk) {
                return Err(self.error(
                    RpcImportErrorKind::IntegrityError,
                    Some(position),
                    "duplicate key value violates unique constraint",
                ));
            }

            let (new_id, provenance, name) = self
                .write(fields, &request.flags)
                .map_err(|reason| self.error(RpcImportErrorKind::IntegrityError, Some(position), reason))?;
            mapped
                .insert(kind, record.pk, new_id, provenance, name)
                .map_err(|e| self.error(RpcImportErrorKind::IntegrityError, Some(position), e.to_string()))?;

            let ordinal = next_ordinal;
            next_ordinal += 1;
            ok.min_ordinal.get_or_insert(ordinal);
            ok.max_ordinal = Some(ordinal);
            ok.min_source_pk = Some(ok.min_source_pk.map_or(record.pk, |m| m.min(record.pk)));
            ok.max_source_pk = Some(ok.max_source_pk.map_or(record.pk, |m| m.max(record.pk)));
            if provenance == Provenance::Inserted {
                ok.min_inserted_pk = Some(ok.min_inserted_pk.map_or(new_id, |m| m.min(new_id)));
                ok.max_inserted_pk = Some(ok.max_inserted_pk.map_or(new_id, |m| m.max(new_id)));
            }
        }

        ok.mapped_pks = mapped;
        Ok(ok)
    }
}
