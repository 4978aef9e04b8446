//! # Batch Import Dispatcher
//!
//! Hands one batch to its kind's importer with the slice of the remap table
//! the kind's dependencies need, then folds the result back in.
//!
//! For control-owned kinds imported from a region, a local chunk replica is
//! written so both sides of the domain boundary agree on what was imported.
//! Replica writes are idempotent per `(import_uuid, kind, min_ordinal)`.

use relocation_telemetry::{
    metric_inc, time_histogram, CONTROL_REPLICAS, IMPORT_BATCHES, IMPORT_BATCH_DURATION,
};
use shared_types::{
    ChunkReplica, DeploymentMode, ImportOk, ImportRequest, KindName, PrimaryKey, PrimaryKeyMap,
    Provenance, RpcImportErrorKind,
};
use std::collections::{BTreeMap, BTreeSet};

use super::registry::ImporterRegistry;
use crate::domain::{Chunk, DependencyGraph, ImportingError, RunContext, RunState};
use crate::ports::{LiveStore, Printer};

/// Guidance printed after an integrity conflict.
pub const INTEGRITY_REMEDIATION: &str = ">> Are you restoring from a snapshot taken by the same version?\n\
>> Are you restoring onto a clean deployment?\n\
>> If so then this IntegrityError is likely a defect in the importer of this kind, please report it.";

/// What happened to one batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The importer accepted the batch.
    Imported {
        /// Records that produced a translation.
        mapped: usize,
    },
    /// The kind is unknown or outside the run's scope.
    Skipped,
}

/// Dispatches batches for one run.
pub struct BatchDispatcher<'a> {
    graph: &'a DependencyGraph,
    registry: &'a ImporterRegistry,
    store: &'a dyn LiveStore,
    deployment: DeploymentMode,
    printer: &'a dyn Printer,
}

impl<'a> BatchDispatcher<'a> {
    /// Create a dispatcher.
    pub fn new(
        graph: &'a DependencyGraph,
        registry: &'a ImporterRegistry,
        store: &'a dyn LiveStore,
        deployment: DeploymentMode,
        printer: &'a dyn Printer,
    ) -> Self {
        Self {
            graph,
            registry,
            store,
            deployment,
            printer,
        }
    }

    /// Import one batch and extend `state.pk_map` with its translations.
    pub async fn dispatch(
        &self,
        ctx: &RunContext,
        state: &mut RunState,
        chunk: Chunk,
    ) -> Result<DispatchOutcome, ImportingError> {
        let min_ordinal = chunk.min_ordinal();

        let Some(descriptor) = self.graph.get(&chunk.kind) else {
            tracing::debug!(kind = %chunk.kind, "Skipping batch of unknown kind");
            return Ok(self.skip(state, &chunk.kind));
        };
        if !ctx.scope.includes(descriptor.relocation_scope) {
            tracing::debug!(
                kind = %chunk.kind,
                scope = %ctx.scope,
                "Skipping batch outside of the import scope"
            );
            return Ok(self.skip(state, &chunk.kind));
        }
        let importer = self
            .registry
            .get(&chunk.kind)
            .ok_or_else(|| ImportingError::MissingImporter(chunk.kind.clone()))?;

        let request = ImportRequest {
            kind: chunk.kind.clone(),
            scope: ctx.scope,
            flags: ctx.flags.clone(),
            filters: ctx.filters.clone(),
            pk_map: state.pk_map.partition(&descriptor.dependencies(), None),
            records: chunk.records,
            min_ordinal,
        };

        tracing::debug!(
            kind = %chunk.kind,
            min_ordinal,
            import_uuid = ctx.import_uuid(),
            "Dispatching batch"
        );

        let result = {
            let _timer = time_histogram!(IMPORT_BATCH_DURATION);
            importer.import_batch(request).await
        };

        let ok = match result {
            Ok(ok) => ok,
            Err(err) => {
                metric_inc!(IMPORT_BATCHES, &[chunk.kind.as_str(), "failed"]);
                tracing::error!(
                    kind = %chunk.kind,
                    min_ordinal,
                    error_kind = %err.kind,
                    "Importer rejected batch"
                );
                self.printer.echo(&err.pretty(), true);
                if err.get_kind() == RpcImportErrorKind::IntegrityError {
                    self.printer.echo(INTEGRITY_REMEDIATION, true);
                }
                return Err(ImportingError::Importer(err));
            }
        };

        check_bounds(&chunk.kind, &ok)?;

        let mapped = ok.mapped_pks.len();
        state.pk_map.extend(ok.mapped_pks.clone())?;

        // Replicas only follow translations the run accepted
        if self.deployment == DeploymentMode::Region && descriptor.is_control_owned() {
            if self.write_replica(ctx, &chunk.kind, &ok).await? {
                state.stats.replicas_written += 1;
            }
        }

        state.stats.batches_dispatched += 1;
        metric_inc!(IMPORT_BATCHES, &[chunk.kind.as_str(), "imported"]);

        if let (Some(min), Some(max)) = (ok.min_ordinal, ok.max_ordinal) {
            self.printer
                .echo(&format!("Imported {} #{min}..#{max}", chunk.kind), false);
        }

        Ok(DispatchOutcome::Imported { mapped })
    }

    fn skip(&self, state: &mut RunState, kind: &KindName) -> DispatchOutcome {
        state.stats.batches_skipped += 1;
        metric_inc!(IMPORT_BATCHES, &[kind.as_str(), "skipped"]);
        DispatchOutcome::Skipped
    }

    /// Write the replica unless one exists. Returns whether it was written.
    async fn write_replica(
        &self,
        ctx: &RunContext,
        kind: &KindName,
        ok: &ImportOk,
    ) -> Result<bool, ImportingError> {
        let Some(replica) = build_replica(ctx.import_uuid(), kind, ok) else {
            return Ok(false);
        };

        let existing = self
            .store
            .find_chunk_replica(&replica.import_uuid, kind, replica.min_ordinal)
            .await?;
        if existing.is_some() {
            tracing::info!(
                kind = %kind,
                min_ordinal = replica.min_ordinal,
                import_uuid = ctx.import_uuid(),
                "Control chunk replica already exists"
            );
            metric_inc!(CONTROL_REPLICAS, &["already_present"]);
            return Ok(false);
        }

        self.store.insert_chunk_replica(replica).await?;
        metric_inc!(CONTROL_REPLICAS, &["written"]);
        Ok(true)
    }
}

/// A reported ordinal range must come with its identifier bounds.
fn check_bounds(kind: &KindName, ok: &ImportOk) -> Result<(), ImportingError> {
    if ok.min_ordinal.is_none() {
        return Ok(());
    }
    let missing = [
        ("max_ordinal", ok.max_ordinal.is_none()),
        ("min_source_pk", ok.min_source_pk.is_none()),
        ("max_source_pk", ok.max_source_pk.is_none()),
    ]
    .into_iter()
    .filter(|(_, absent)| *absent)
    .map(|(name, _)| name)
    .collect::<Vec<_>>();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(ImportingError::MalformedImportResult {
            kind: kind.clone(),
            reason: format!("min_ordinal is set but {} is not", missing.join(", ")),
        })
    }
}

/// Replica describing a successful control-side import, if anything was
/// imported.
pub fn build_replica(import_uuid: &str, kind: &KindName, ok: &ImportOk) -> Option<ChunkReplica> {
    let (min_ordinal, max_ordinal, min_source_pk, max_source_pk) = match (
        ok.min_ordinal,
        ok.max_ordinal,
        ok.min_source_pk,
        ok.max_source_pk,
    ) {
        (Some(a), Some(b), Some(c), Some(d)) => (a, b, c, d),
        _ => return None,
    };

    let kinds = BTreeSet::from([kind.clone()]);
    let by_provenance = |provenance: Provenance| -> PrimaryKeyMap {
        ok.mapped_pks
            .partition(&kinds, Some(&BTreeSet::from([provenance])))
    };
    let ids = |map: &PrimaryKeyMap| -> BTreeMap<PrimaryKey, PrimaryKey> {
        map.entries(kind).map(|(old, e)| (old, e.new_id)).collect()
    };

    let inserted = by_provenance(Provenance::Inserted);
    let existing = by_provenance(Provenance::Existing);
    let overwritten = by_provenance(Provenance::Overwritten);

    Some(ChunkReplica {
        import_uuid: import_uuid.to_string(),
        kind: kind.clone(),
        min_ordinal,
        max_ordinal,
        min_source_pk,
        max_source_pk,
        min_inserted_pk: ok.min_inserted_pk,
        max_inserted_pk: ok.max_inserted_pk,
        inserted_map: ids(&inserted),
        existing_map: ids(&existing),
        overwrite_map: ids(&overwritten),
        inserted_identifiers: inserted
            .entries(kind)
            .filter_map(|(old, e)| e.natural_name.clone().map(|name| (old, name)))
            .collect(),
    })
}
