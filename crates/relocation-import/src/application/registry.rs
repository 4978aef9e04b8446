//! # Importer Registry
//!
//! Maps each kind to the importer serving it. Populated once at startup.

use shared_types::KindName;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::ports::Importer;

/// Kind → importer.
#[derive(Clone, Default)]
pub struct ImporterRegistry {
    importers: BTreeMap<KindName, Arc<dyn Importer>>,
}

impl ImporterRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the importer of `kind`.
    pub fn register(&mut self, kind: impl Into<KindName>, importer: Arc<dyn Importer>) {
        self.importers.insert(kind.into(), importer);
    }

    /// Builder-style `register`.
    pub fn with(mut self, kind: impl Into<KindName>, importer: Arc<dyn Importer>) -> Self {
        self.register(kind, importer);
        self
    }

    /// Importer of `kind`.
    pub fn get(&self, kind: &KindName) -> Option<Arc<dyn Importer>> {
        self.importers.get(kind).cloned()
    }

    /// Whether `kind` has an importer.
    pub fn contains(&self, kind: &KindName) -> bool {
        self.importers.contains_key(kind)
    }

    /// Registered kinds.
    pub fn kinds(&self) -> impl Iterator<Item = &KindName> {
        self.importers.keys()
    }

    /// Number of registered kinds.
    pub fn len(&self) -> usize {
        self.importers.len()
    }

    /// Whether nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.importers.is_empty()
    }
}

impl std::fmt::Debug for ImporterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImporterRegistry")
            .field("kinds", &self.importers.keys().collect::<Vec<_>>())
            .finish()
    }
}
