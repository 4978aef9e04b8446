//! # Snapshot Import Service
//!
//! Application service orchestrating one import run:
//!
//! 1. Reject runs in the control domain and misused filters.
//! 2. Decrypt, decode and sanitize the snapshot.
//! 3. Pass 1: build the scope filters.
//! 4. Pass 2: chunk and dispatch every batch, holding back the deferred kind.
//!    Single-store deployments run this pass in one transaction, after
//!    clearing existing state for full restores.
//! 5. Reconcile tenant names across domains.
//! 6. Replay the deferred batches.

use async_trait::async_trait;
use relocation_telemetry::log_event;
use shared_types::{DeploymentMode, Filter, ImportFlags, ImportScope, KindName, Record};
use std::collections::BTreeSet;
use std::sync::Arc;
use uuid::Uuid;

use super::dispatcher::BatchDispatcher;
use super::reconciler::NamingReconciler;
use super::registry::ImporterRegistry;
use crate::algorithms::filter_builder::{SLUG_FIELD, USERNAME_FIELD};
use crate::algorithms::{build_filters, decode_snapshot, sanitize, validate_filter, Chunker};
use crate::config::ImportConfig;
use crate::domain::{DependencyGraph, ImportReport, ImportingError, RunContext, RunState};
use crate::ports::{Decryptor, LiveStore, NamingService, Printer, RegionOutbox, SnapshotImportApi};

/// Snapshot Import Service - orchestrates import runs.
pub struct SnapshotImportService {
    /// Configuration.
    config: ImportConfig,
    /// Kinds in dependency order.
    graph: Arc<DependencyGraph>,
    /// Importer of every kind.
    registry: ImporterRegistry,
    /// Store of the current domain.
    store: Arc<dyn LiveStore>,
    /// Regional side-effect backlog.
    outbox: Arc<dyn RegionOutbox>,
    /// Control-domain naming authority.
    naming: Arc<dyn NamingService>,
    /// Container decryption, if snapshots are encrypted.
    decryptor: Option<Arc<dyn Decryptor>>,
}

impl SnapshotImportService {
    /// Create a new import service.
    pub fn new(
        config: ImportConfig,
        graph: Arc<DependencyGraph>,
        registry: ImporterRegistry,
        store: Arc<dyn LiveStore>,
        outbox: Arc<dyn RegionOutbox>,
        naming: Arc<dyn NamingService>,
    ) -> Self {
        Self {
            config,
            graph,
            registry,
            store,
            outbox,
            naming,
            decryptor: None,
        }
    }

    /// Decrypt snapshots with `decryptor` before decoding.
    pub fn with_decryptor(mut self, decryptor: Arc<dyn Decryptor>) -> Self {
        self.decryptor = Some(decryptor);
        self
    }

    /// Get configuration.
    pub fn config(&self) -> &ImportConfig {
        &self.config
    }

    /// Internal: decrypt and decode into sanitized records.
    fn read_snapshot(
        &self,
        snapshot: &[u8],
        state: &mut RunState,
    ) -> Result<Vec<Record>, ImportingError> {
        let records = match &self.decryptor {
            Some(decryptor) => decode_snapshot(&decryptor.decrypt(snapshot)?)?,
            None => decode_snapshot(snapshot)?,
        };
        let sanitized = sanitize(records, &self.graph);
        state.stats.records_dropped = sanitized.dropped_records;
        state.stats.fields_dropped = sanitized.dropped_fields;
        Ok(sanitized.records)
    }

    /// Internal: delete existing state in reverse dependency order.
    async fn reset_existing_state(&self, printer: &dyn Printer) -> Result<(), ImportingError> {
        for descriptor in self.graph.iter_reversed() {
            let cleared = match self.store.clear_kind(&descriptor.kind).await {
                Ok(()) if descriptor.uses_sequence => {
                    self.store.reset_sequence(&descriptor.kind).await
                }
                other => other,
            };
            if let Err(err) = cleared {
                printer.echo("Existing state could not be reset before importing", true);
                return Err(ImportingError::StoreReset(err));
            }
        }
        tracing::info!(kinds = self.graph.len(), "Cleared existing state");
        Ok(())
    }

    /// Internal: pass 2 over the snapshot, deferring the held-back kind.
    async fn main_pass(
        &self,
        ctx: &RunContext,
        state: &mut RunState,
        records: Vec<Record>,
        dispatcher: &BatchDispatcher<'_>,
    ) -> Result<(), ImportingError> {
        for chunk in Chunker::new(records, self.config.max_batch_size) {
            if chunk.kind == self.config.well_known.deferred {
                state.deferred.push(chunk);
                continue;
            }
            dispatcher.dispatch(ctx, state, chunk).await?;
        }
        Ok(())
    }

    /// Internal: main pass inside one store transaction.
    async fn transactional_pass(
        &self,
        ctx: &RunContext,
        state: &mut RunState,
        records: Vec<Record>,
        dispatcher: &BatchDispatcher<'_>,
        printer: &dyn Printer,
    ) -> Result<(), ImportingError> {
        self.store.begin().await?;

        let mut outcome = Ok(());
        if ctx.scope == ImportScope::Global {
            outcome = self.reset_existing_state(printer).await;
        }
        if outcome.is_ok() {
            outcome = self.main_pass(ctx, state, records, dispatcher).await;
        }

        match outcome {
            Ok(()) => {
                self.store.commit().await?;
                Ok(())
            }
            Err(err) => {
                if let Err(rollback_err) = self.store.rollback().await {
                    tracing::error!(error = %rollback_err, "Rollback failed");
                }
                Err(err)
            }
        }
    }

    async fn run(
        &self,
        snapshot: &[u8],
        scope: ImportScope,
        filter: Option<Filter>,
        flags: ImportFlags,
        printer: &dyn Printer,
    ) -> Result<ImportReport, ImportingError> {
        if self.config.deployment == DeploymentMode::Control {
            printer.echo(&ImportingError::WrongDomain.to_string(), true);
            return Err(ImportingError::WrongDomain);
        }
        self.config.validate()?;
        validate_filter(scope, filter.as_ref(), &self.config.well_known)?;

        let mut state = RunState::default();
        let records = self.read_snapshot(snapshot, &mut state)?;

        let import_uuid = flags
            .import_uuid
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().simple().to_string());
        let filters = build_filters(&records, filter.as_ref(), &self.config.well_known);
        let ctx = RunContext {
            scope,
            flags: flags.with_import_uuid(import_uuid.clone()),
            filters,
        };

        log_event!(
            info,
            import_uuid,
            "Starting import",
            scope = %scope,
            records = records.len(),
            dropped = state.stats.records_dropped
        );

        let dispatcher = BatchDispatcher::new(
            &self.graph,
            &self.registry,
            self.store.as_ref(),
            self.config.deployment,
            printer,
        );

        if self.config.single_transaction() {
            self.transactional_pass(&ctx, &mut state, records, &dispatcher, printer)
                .await?;
        } else {
            self.main_pass(&ctx, &mut state, records, &dispatcher).await?;
        }

        let reconciler = NamingReconciler::new(
            self.outbox.as_ref(),
            self.naming.as_ref(),
            self.config.max_shard_drain_attempts,
        );
        state.stats.tenants_reconciled = reconciler
            .reconcile(&state.pk_map, &self.config.well_known.organization)
            .await?;

        let deferred = std::mem::take(&mut state.deferred);
        for chunk in deferred {
            dispatcher.dispatch(&ctx, &mut state, chunk).await?;
            state.stats.deferred_replayed += 1;
        }

        log_event!(
            info,
            import_uuid,
            "Import complete",
            batches = state.stats.batches_dispatched,
            mapped = state.pk_map.len()
        );
        Ok(ImportReport::from((ctx, state)))
    }
}

fn allow_list(
    kind: &KindName,
    field: &str,
    values: Option<BTreeSet<String>>,
) -> Option<Filter> {
    values.map(|values| Filter::new(kind.clone(), field, values))
}

#[async_trait]
impl SnapshotImportApi for SnapshotImportService {
    async fn import_snapshot(
        &self,
        snapshot: &[u8],
        scope: ImportScope,
        filter: Option<Filter>,
        flags: ImportFlags,
        printer: &dyn Printer,
    ) -> Result<ImportReport, ImportingError> {
        self.run(snapshot, scope, filter, flags, printer).await
    }

    async fn import_in_user_scope(
        &self,
        snapshot: &[u8],
        usernames: Option<BTreeSet<String>>,
        flags: ImportFlags,
        printer: &dyn Printer,
    ) -> Result<ImportReport, ImportingError> {
        let filter = allow_list(&self.config.well_known.user, USERNAME_FIELD, usernames);
        self.run(snapshot, ImportScope::User, filter, flags, printer).await
    }

    async fn import_in_organization_scope(
        &self,
        snapshot: &[u8],
        slugs: Option<BTreeSet<String>>,
        flags: ImportFlags,
        printer: &dyn Printer,
    ) -> Result<ImportReport, ImportingError> {
        let filter = allow_list(&self.config.well_known.organization, SLUG_FIELD, slugs);
        self.run(snapshot, ImportScope::Organization, filter, flags, printer)
            .await
    }

    async fn import_in_config_scope(
        &self,
        snapshot: &[u8],
        usernames: Option<BTreeSet<String>>,
        flags: ImportFlags,
        printer: &dyn Printer,
    ) -> Result<ImportReport, ImportingError> {
        let filter = allow_list(&self.config.well_known.user, USERNAME_FIELD, usernames);
        self.run(snapshot, ImportScope::Config, filter, flags, printer).await
    }

    async fn import_in_global_scope(
        &self,
        snapshot: &[u8],
        flags: ImportFlags,
        printer: &dyn Printer,
    ) -> Result<ImportReport, ImportingError> {
        self.run(snapshot, ImportScope::Global, None, flags, printer).await
    }
}
