//! # Core Snapshot Entities
//!
//! Defines the records a snapshot is made of and the run-level settings that
//! travel with every importer call.
//!
//! ## Clusters
//!
//! - **Snapshot**: `Record`, `KindName`, `FieldValue`
//! - **Scoping**: `ImportScope`, `RelocationScope`, `Filter`
//! - **Deployment**: `Domain`, `DeploymentMode`, `ImportFlags`
//! - **Bookkeeping**: `ChunkReplica`

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

// =============================================================================
// CLUSTER A: THE SNAPSHOT
// =============================================================================

/// Identifier of a record in the exporting (or importing) deployment.
pub type PrimaryKey = i64;

/// Name of an entity kind, e.g. `platform.user`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KindName(String);

impl KindName {
    /// Create a kind name.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Borrow the name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for KindName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for KindName {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for KindName {
    fn from(name: String) -> Self {
        Self(name)
    }
}

/// A single exported row.
///
/// Wire form: `{"model": "<kind>", "pk": <id>, "fields": {...}}`. The
/// record's position within its kind's run is its implicit source ordinal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Entity kind.
    #[serde(rename = "model")]
    pub kind: KindName,
    /// Identifier in the exporting deployment.
    pub pk: PrimaryKey,
    /// Column values, foreign keys included.
    #[serde(default)]
    pub fields: Map<String, Value>,
}

impl Record {
    /// Create a record without fields.
    pub fn new(kind: impl Into<KindName>, pk: PrimaryKey) -> Self {
        Self {
            kind: kind.into(),
            pk,
            fields: Map::new(),
        }
    }

    /// Builder-style field setter.
    pub fn with_field(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.fields.insert(name.to_string(), value.into());
        self
    }

    /// Raw field value.
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Field value usable in a `Filter`. The pseudo-field `pk` names the
    /// record identifier.
    pub fn field_value(&self, name: &str) -> Option<FieldValue> {
        if name == PK_FIELD {
            return Some(FieldValue::Int(self.pk));
        }
        self.fields.get(name).and_then(FieldValue::from_json)
    }

    /// String field, if present and a string.
    pub fn str_field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(Value::as_str)
    }

    /// Integer field, if present and an integer.
    pub fn int_field(&self, name: &str) -> Option<PrimaryKey> {
        self.fields.get(name).and_then(Value::as_i64)
    }
}

/// Pseudo-field naming a record's own identifier.
pub const PK_FIELD: &str = "pk";

/// A comparable scalar taken from a record field.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    /// Integer value (identifiers, foreign keys).
    Int(i64),
    /// String value (slugs, usernames, addresses).
    Str(String),
}

impl FieldValue {
    /// Convert a JSON scalar. Nulls, floats and compound values have no
    /// filterable form.
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n.as_i64().map(FieldValue::Int),
            Value::String(s) => Some(FieldValue::Str(s.clone())),
            _ => None,
        }
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        FieldValue::Int(v)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::Str(v.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        FieldValue::Str(v)
    }
}

// =============================================================================
// CLUSTER B: SCOPING
// =============================================================================

/// Breadth of one import run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ImportScope {
    /// Users and their personal data.
    User,
    /// Organizations plus the users that belong to them.
    Organization,
    /// Everything needed to administrate an installation.
    Config,
    /// The entire state.
    Global,
}

impl ImportScope {
    /// Relocation scopes of the kinds this import scope may touch.
    pub fn relocation_scopes(&self) -> &'static [RelocationScope] {
        match self {
            ImportScope::User => &[RelocationScope::User],
            ImportScope::Organization => &[RelocationScope::User, RelocationScope::Organization],
            ImportScope::Config => &[RelocationScope::User, RelocationScope::Config],
            ImportScope::Global => &[
                RelocationScope::User,
                RelocationScope::Organization,
                RelocationScope::Config,
                RelocationScope::Global,
            ],
        }
    }

    /// Whether a kind with the given relocation scope is eligible.
    pub fn includes(&self, scope: RelocationScope) -> bool {
        self.relocation_scopes().contains(&scope)
    }
}

impl fmt::Display for ImportScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ImportScope::User => "user",
            ImportScope::Organization => "organization",
            ImportScope::Config => "config",
            ImportScope::Global => "global",
        };
        f.write_str(name)
    }
}

/// Relocation scope declared by each kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RelocationScope {
    /// Never relocated.
    Excluded,
    /// Per-user data.
    User,
    /// Per-organization data.
    Organization,
    /// Installation configuration.
    Config,
    /// Only carried by full restores.
    Global,
}

/// Inclusion filter: a record of `kind` is imported only if its `field`
/// holds one of `values`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filter {
    /// Kind this filter constrains.
    pub kind: KindName,
    /// Field inspected (`pk` for the identifier).
    pub field: String,
    /// Allowed values.
    pub values: BTreeSet<FieldValue>,
}

impl Filter {
    /// Create a filter from any iterable of values.
    pub fn new<V: Into<FieldValue>>(
        kind: impl Into<KindName>,
        field: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        Self {
            kind: kind.into(),
            field: field.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    /// Whether this filter constrains records of `kind`.
    pub fn applies_to(&self, kind: &KindName) -> bool {
        &self.kind == kind
    }

    /// Whether `record` passes. Records of other kinds always pass.
    pub fn admits(&self, record: &Record) -> bool {
        if !self.applies_to(&record.kind) {
            return true;
        }
        record
            .field_value(&self.field)
            .map(|v| self.values.contains(&v))
            .unwrap_or(false)
    }
}

// =============================================================================
// CLUSTER C: DEPLOYMENT
// =============================================================================

/// A physical partition of the deployment that may own a kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Domain {
    /// The global, singular domain.
    Control,
    /// A tenant-data domain.
    Region,
}

/// Where the current process runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeploymentMode {
    /// Both domains share one process (and possibly one store).
    Monolith,
    /// A regional domain; control-owned kinds are reached remotely.
    Region,
    /// The control domain. Imports never run here.
    Control,
}

impl FromStr for DeploymentMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "monolith" => Ok(DeploymentMode::Monolith),
            "region" => Ok(DeploymentMode::Region),
            "control" => Ok(DeploymentMode::Control),
            other => Err(format!("unknown deployment mode: {other}")),
        }
    }
}

/// Behavior switches passed unchanged to every importer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportFlags {
    /// Reuse an existing user with the same username instead of renaming.
    pub merge_users: bool,
    /// Overwrite colliding configuration rows.
    pub overwrite_configs: bool,
    /// Import organizations hidden.
    pub hide_organizations: bool,
    /// Run-unique identifier used for idempotent bookkeeping.
    pub import_uuid: Option<String>,
}

impl ImportFlags {
    /// Return a copy carrying the given run identifier.
    pub fn with_import_uuid(mut self, import_uuid: impl Into<String>) -> Self {
        self.import_uuid = Some(import_uuid.into());
        self
    }
}

// =============================================================================
// CLUSTER D: BOOKKEEPING
// =============================================================================

/// Local copy of the chunk record a control-domain importer writes for a
/// batch it imported on behalf of a region.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkReplica {
    /// Run identifier.
    pub import_uuid: String,
    /// Kind of the imported batch.
    pub kind: KindName,
    /// First ordinal imported.
    pub min_ordinal: u64,
    /// Last ordinal imported.
    pub max_ordinal: u64,
    /// Smallest source identifier in the batch.
    pub min_source_pk: PrimaryKey,
    /// Largest source identifier in the batch.
    pub max_source_pk: PrimaryKey,
    /// Smallest newly inserted identifier, if anything was inserted.
    pub min_inserted_pk: Option<PrimaryKey>,
    /// Largest newly inserted identifier, if anything was inserted.
    pub max_inserted_pk: Option<PrimaryKey>,
    /// Old → new ids of inserted rows.
    pub inserted_map: BTreeMap<PrimaryKey, PrimaryKey>,
    /// Old → new ids of rows matched to existing ones.
    pub existing_map: BTreeMap<PrimaryKey, PrimaryKey>,
    /// Old → new ids of overwritten rows.
    pub overwrite_map: BTreeMap<PrimaryKey, PrimaryKey>,
    /// Old id → natural name of inserted rows that carry one.
    pub inserted_identifiers: BTreeMap<PrimaryKey, String>,
}
