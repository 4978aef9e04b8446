//! # Identifier Remap Table
//!
//! Correlates identifiers from the exporting deployment with the ones
//! assigned on import. Every downstream step (foreign-key rewriting,
//! bookkeeping, naming reconciliation) reads from this table.
//!
//! ## Invariants
//!
//! - The table only grows: an entry, once written, is never altered.
//! - Re-inserting an identical entry is a no-op; inserting a different one
//!   for the same `(kind, old id)` is a `RemapConflict`.

use crate::entities::{KindName, PrimaryKey};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

/// How an imported record came to exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Provenance {
    /// A new row was written.
    Inserted,
    /// The record was matched to a row that already existed.
    Existing,
    /// An existing row was overwritten with the record's contents.
    Overwritten,
}

/// Target of one translation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemapEntry {
    /// Identifier in the importing deployment.
    pub new_id: PrimaryKey,
    /// How the row came to exist.
    pub provenance: Provenance,
    /// Final natural name (slug, username), when the kind has one.
    pub natural_name: Option<String>,
}

/// Attempt to rewrite an existing translation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("remap conflict for {kind} old id {old_id}: {existing:?} would be replaced by {incoming:?}")]
pub struct RemapConflict {
    /// Kind of the conflicting entry.
    pub kind: KindName,
    /// Source identifier.
    pub old_id: PrimaryKey,
    /// Entry already in the table.
    pub existing: RemapEntry,
    /// Entry that tried to replace it.
    pub incoming: RemapEntry,
}

/// `(kind, old id) → (new id, provenance, natural name)`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrimaryKeyMap {
    mapping: BTreeMap<KindName, BTreeMap<PrimaryKey, RemapEntry>>,
}

impl PrimaryKeyMap {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Full entry for `(kind, old_id)`.
    pub fn get(&self, kind: &KindName, old_id: PrimaryKey) -> Option<&RemapEntry> {
        self.mapping.get(kind).and_then(|m| m.get(&old_id))
    }

    /// New identifier for `(kind, old_id)`.
    pub fn get_new_id(&self, kind: &KindName, old_id: PrimaryKey) -> Option<PrimaryKey> {
        self.get(kind, old_id).map(|e| e.new_id)
    }

    /// Provenance for `(kind, old_id)`.
    pub fn get_provenance(&self, kind: &KindName, old_id: PrimaryKey) -> Option<Provenance> {
        self.get(kind, old_id).map(|e| e.provenance)
    }

    /// Natural name for `(kind, old_id)`.
    pub fn get_natural_name(&self, kind: &KindName, old_id: PrimaryKey) -> Option<&str> {
        self.get(kind, old_id).and_then(|e| e.natural_name.as_deref())
    }

    /// Record one translation.
    pub fn insert(
        &mut self,
        kind: &KindName,
        old_id: PrimaryKey,
        new_id: PrimaryKey,
        provenance: Provenance,
        natural_name: Option<String>,
    ) -> Result<(), RemapConflict> {
        let entry = RemapEntry {
            new_id,
            provenance,
            natural_name,
        };
        self.check(kind, old_id, &entry)?;
        self.mapping
            .entry(kind.clone())
            .or_default()
            .insert(old_id, entry);
        Ok(())
    }

    /// Merge `other` into this table.
    ///
    /// Either every entry of `other` is merged or, on conflict, none is.
    pub fn extend(&mut self, other: PrimaryKeyMap) -> Result<(), RemapConflict> {
        for (kind, entries) in &other.mapping {
            for (old_id, entry) in entries {
                self.check(kind, *old_id, entry)?;
            }
        }
        for (kind, entries) in other.mapping {
            self.mapping.entry(kind).or_default().extend(entries);
        }
        Ok(())
    }

    /// Subset restricted to `kinds` and, if given, to `provenances`.
    pub fn partition(
        &self,
        kinds: &BTreeSet<KindName>,
        provenances: Option<&BTreeSet<Provenance>>,
    ) -> PrimaryKeyMap {
        let mapping = self
            .mapping
            .iter()
            .filter(|(kind, _)| kinds.contains(*kind))
            .map(|(kind, entries)| {
                let kept = entries
                    .iter()
                    .filter(|(_, e)| provenances.map_or(true, |p| p.contains(&e.provenance)))
                    .map(|(old, e)| (*old, e.clone()))
                    .collect::<BTreeMap<_, _>>();
                (kind.clone(), kept)
            })
            .filter(|(_, entries)| !entries.is_empty())
            .collect();
        PrimaryKeyMap { mapping }
    }

    /// Entries of one kind in old-id order.
    pub fn entries<'a>(
        &'a self,
        kind: &KindName,
    ) -> impl Iterator<Item = (PrimaryKey, &'a RemapEntry)> + 'a {
        self.mapping
            .get(kind)
            .into_iter()
            .flat_map(|m| m.iter().map(|(old, e)| (*old, e)))
    }

    /// Kinds with at least one entry.
    pub fn kinds(&self) -> impl Iterator<Item = &KindName> {
        self.mapping.keys()
    }

    /// Number of entries for one kind.
    pub fn len_for(&self, kind: &KindName) -> usize {
        self.mapping.get(kind).map_or(0, BTreeMap::len)
    }

    /// Total number of entries.
    pub fn len(&self) -> usize {
        self.mapping.values().map(BTreeMap::len).sum()
    }

    /// Whether the table holds no entry.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check(
        &self,
        kind: &KindName,
        old_id: PrimaryKey,
        incoming: &RemapEntry,
    ) -> Result<(), RemapConflict> {
        match self.get(kind, old_id) {
            Some(existing) if existing != incoming => Err(RemapConflict {
                kind: kind.clone(),
                old_id,
                existing: existing.clone(),
                incoming: incoming.clone(),
            }),
            _ => Ok(()),
        }
    }
}
