//! # Snapshot Decoding
//!
//! Turns snapshot bytes into records the current schema understands.
//! Records of unknown kinds and undeclared fields are dropped, never fatal.

use relocation_telemetry::IMPORT_RECORDS_DROPPED;
use shared_types::Record;
use std::collections::BTreeSet;

use crate::domain::{DependencyGraph, ImportingError};

/// Records kept after sanitizing, with drop counts.
#[derive(Debug, Default)]
pub struct Sanitized {
    /// Records to import, in source order.
    pub records: Vec<Record>,
    /// Records dropped for belonging to an unknown kind.
    pub dropped_records: usize,
    /// Fields stripped from kept records.
    pub dropped_fields: usize,
}

/// Decode snapshot bytes as a JSON array of records.
pub fn decode_snapshot(bytes: &[u8]) -> Result<Vec<Record>, ImportingError> {
    serde_json::from_slice(bytes).map_err(|e| ImportingError::Decode(e.to_string()))
}

/// Drop unknown kinds and strip undeclared fields.
pub fn sanitize(records: Vec<Record>, graph: &DependencyGraph) -> Sanitized {
    let mut out = Sanitized::default();
    let mut unknown_kinds = BTreeSet::new();

    for mut record in records {
        let Some(descriptor) = graph.get(&record.kind) else {
            out.dropped_records += 1;
            unknown_kinds.insert(record.kind);
            continue;
        };

        let before = record.fields.len();
        record.fields.retain(|name, _| descriptor.declares_field(name));
        let stripped = before - record.fields.len();
        if stripped > 0 {
            tracing::debug!(kind = %record.kind, pk = record.pk, stripped, "Stripped undeclared fields");
            out.dropped_fields += stripped;
        }

        out.records.push(record);
    }

    for kind in &unknown_kinds {
        tracing::debug!(kind = %kind, "Dropped records of unknown kind");
    }
    if out.dropped_records > 0 {
        IMPORT_RECORDS_DROPPED
            .with_label_values(&["unknown_kind"])
            .inc_by(out.dropped_records as f64);
    }
    if out.dropped_fields > 0 {
        IMPORT_RECORDS_DROPPED
            .with_label_values(&["unknown_field"])
            .inc_by(out.dropped_fields as f64);
    }

    out
}
