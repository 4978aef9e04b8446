//! # Cross-Domain Naming Reconciler
//!
//! Runs once after the main pass. Every imported tenant's pending regional
//! side effects are drained first, then the final names of all tenants are
//! committed to the control domain in a single call.

use relocation_telemetry::{metric_inc, NAMING_COMMITS, OUTBOX_DRAIN_RETRIES};
use shared_types::{KindName, PrimaryKey, PrimaryKeyMap};
use std::collections::BTreeMap;

use crate::domain::ImportingError;
use crate::ports::{NamingService, RegionOutbox};

/// Drains outbox shards and commits tenant names.
pub struct NamingReconciler<'a> {
    outbox: &'a dyn RegionOutbox,
    naming: &'a dyn NamingService,
    max_attempts: u32,
}

impl<'a> NamingReconciler<'a> {
    /// Create a reconciler retrying each drain up to `max_attempts` times.
    pub fn new(
        outbox: &'a dyn RegionOutbox,
        naming: &'a dyn NamingService,
        max_attempts: u32,
    ) -> Self {
        Self {
            outbox,
            naming,
            max_attempts: max_attempts.max(1),
        }
    }

    /// Reconcile every tenant of `tenant_kind` in `pk_map`.
    ///
    /// Returns the number of tenants whose names were committed.
    pub async fn reconcile(
        &self,
        pk_map: &PrimaryKeyMap,
        tenant_kind: &KindName,
    ) -> Result<usize, ImportingError> {
        let names = name_mapping(pk_map, tenant_kind);
        if names.is_empty() {
            return Ok(0);
        }

        for &tenant_id in names.keys() {
            self.drain_with_retry(tenant_id).await?;
        }

        let count = names.len();
        match self.naming.bulk_commit_names(names).await {
            Ok(()) => {
                metric_inc!(NAMING_COMMITS, &["committed"]);
                tracing::info!(tenants = count, "Committed final tenant names");
                Ok(count)
            }
            Err(err) => {
                metric_inc!(NAMING_COMMITS, &["failed"]);
                Err(err.into())
            }
        }
    }

    async fn drain_with_retry(&self, tenant_id: PrimaryKey) -> Result<(), ImportingError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.outbox.drain_shard(tenant_id).await {
                Ok(()) => return Ok(()),
                Err(err) if err.is_transient() && attempt < self.max_attempts => {
                    metric_inc!(OUTBOX_DRAIN_RETRIES);
                    tracing::warn!(tenant_id, attempt, error = %err, "Outbox drain failed, retrying");
                }
                Err(err) => {
                    tracing::error!(tenant_id, attempt, error = %err, "Outbox drain failed");
                    return Err(ImportingError::OutboxDrain {
                        tenant_id,
                        attempts: attempt,
                        source: err,
                    });
                }
            }
        }
    }
}

/// `new tenant id → final name` for every tenant in the table. A missing
/// name maps to the empty string.
pub fn name_mapping(pk_map: &PrimaryKeyMap, tenant_kind: &KindName) -> BTreeMap<PrimaryKey, String> {
    pk_map
        .entries(tenant_kind)
        .map(|(_, entry)| (entry.new_id, entry.natural_name.clone().unwrap_or_default()))
        .collect()
}
