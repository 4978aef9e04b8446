//! # Kind Dependency Graph
//!
//! Every kind the deployment knows about, in dependency order: a kind only
//! references kinds that appear before it (or itself).

use shared_types::{Domain, KindName, RelocationScope};
use std::collections::{BTreeMap, BTreeSet};

use super::errors::ImportingError;

/// What the engine knows about one kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KindDescriptor {
    /// Kind name.
    pub kind: KindName,
    /// Foreign-key field → referenced kind.
    pub foreign_keys: BTreeMap<String, KindName>,
    /// Domains owning the kind.
    pub domains: BTreeSet<Domain>,
    /// Relocation scope declared by the kind.
    pub relocation_scope: RelocationScope,
    /// Fields the current schema declares. `None` accepts every field.
    pub known_fields: Option<BTreeSet<String>>,
    /// Whether the kind's identifiers come from a resettable sequence.
    pub uses_sequence: bool,
}

impl KindDescriptor {
    /// Region-owned kind with no foreign keys.
    pub fn new(kind: impl Into<KindName>, relocation_scope: RelocationScope) -> Self {
        Self {
            kind: kind.into(),
            foreign_keys: BTreeMap::new(),
            domains: BTreeSet::from([Domain::Region]),
            relocation_scope,
            known_fields: None,
            uses_sequence: true,
        }
    }

    /// Replace the owning domains.
    pub fn owned_by(mut self, domains: impl IntoIterator<Item = Domain>) -> Self {
        self.domains = domains.into_iter().collect();
        self
    }

    /// Declare a foreign key.
    pub fn foreign_key(mut self, field: &str, target: impl Into<KindName>) -> Self {
        self.foreign_keys.insert(field.to_string(), target.into());
        self
    }

    /// Restrict the accepted fields.
    pub fn known_fields<'a>(mut self, fields: impl IntoIterator<Item = &'a str>) -> Self {
        self.known_fields = Some(fields.into_iter().map(str::to_string).collect());
        self
    }

    /// Mark the kind as not backed by a sequence.
    pub fn without_sequence(mut self) -> Self {
        self.uses_sequence = false;
        self
    }

    /// Kinds this kind references.
    pub fn dependencies(&self) -> BTreeSet<KindName> {
        self.foreign_keys.values().cloned().collect()
    }

    /// Whether the control domain owns the kind.
    pub fn is_control_owned(&self) -> bool {
        self.domains.contains(&Domain::Control)
    }

    /// Whether the field is part of the current schema.
    pub fn declares_field(&self, field: &str) -> bool {
        self.known_fields
            .as_ref()
            .map_or(true, |fields| fields.contains(field))
    }
}

/// Kinds in dependency order.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    order: Vec<KindDescriptor>,
    index: BTreeMap<KindName, usize>,
}

impl DependencyGraph {
    /// Build a graph from descriptors already in dependency order.
    ///
    /// Rejects duplicate kinds and foreign keys to kinds that come later or
    /// are missing.
    pub fn from_ordered(descriptors: Vec<KindDescriptor>) -> Result<Self, ImportingError> {
        let mut index = BTreeMap::new();
        for (position, descriptor) in descriptors.iter().enumerate() {
            if index.insert(descriptor.kind.clone(), position).is_some() {
                return Err(ImportingError::InvalidGraph(format!(
                    "{} declared twice",
                    descriptor.kind
                )));
            }
            for target in descriptor.foreign_keys.values() {
                if target != &descriptor.kind && !index.contains_key(target) {
                    return Err(ImportingError::InvalidGraph(format!(
                        "{} references {} which does not precede it",
                        descriptor.kind, target
                    )));
                }
            }
        }
        Ok(Self {
            order: descriptors,
            index,
        })
    }

    /// Descriptor of `kind`.
    pub fn get(&self, kind: &KindName) -> Option<&KindDescriptor> {
        self.index.get(kind).map(|&i| &self.order[i])
    }

    /// Whether `kind` is known.
    pub fn contains(&self, kind: &KindName) -> bool {
        self.index.contains_key(kind)
    }

    /// Descriptors in dependency order.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &KindDescriptor> {
        self.order.iter()
    }

    /// Descriptors in reverse dependency order (dependents first).
    pub fn iter_reversed(&self) -> impl Iterator<Item = &KindDescriptor> {
        self.order.iter().rev()
    }

    /// Number of kinds.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Whether the graph has no kinds.
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}
