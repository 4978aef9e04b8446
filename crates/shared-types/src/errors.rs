//! # Error Types
//!
//! Errors that cross the importer boundary.

use crate::entities::KindName;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Classification of an importer failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RpcImportErrorKind {
    /// Uniqueness or foreign-key violation while writing.
    IntegrityError,
    /// Any other storage failure.
    DatabaseError,
    /// The kind's own validation rejected a record.
    ValidationError,
    /// The batch could not be decoded.
    DeserializationFailed,
    /// The importer was called in a domain that does not own the kind.
    IncorrectSiloModeForModel,
    /// The importer does not know the requested kind.
    UnknownModel,
    /// The batch contains a kind other than the requested one.
    UnexpectedModel,
    /// The remote call itself failed.
    Transport,
    /// Anything else.
    Unknown,
}

impl fmt::Display for RpcImportErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Location of the offending record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceId {
    /// Kind being imported.
    pub model: KindName,
    /// Ordinal of the failing record, when known.
    pub ordinal: Option<u64>,
}

impl InstanceId {
    /// Create a location.
    pub fn new(model: impl Into<KindName>, ordinal: Option<u64>) -> Self {
        Self {
            model: model.into(),
            ordinal,
        }
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.ordinal {
            Some(ordinal) => write!(f, "{} #{}", self.model, ordinal),
            None => write!(f, "{}", self.model),
        }
    }
}

/// Structured failure returned by an importer.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{kind} on {on}: {reason}")]
pub struct RpcImportError {
    /// Classification.
    pub kind: RpcImportErrorKind,
    /// Where it happened.
    pub on: InstanceId,
    /// Human readable cause.
    pub reason: String,
}

impl RpcImportError {
    /// Create an error.
    pub fn new(kind: RpcImportErrorKind, on: InstanceId, reason: impl Into<String>) -> Self {
        Self {
            kind,
            on,
            reason: reason.into(),
        }
    }

    /// Classification accessor.
    pub fn get_kind(&self) -> RpcImportErrorKind {
        self.kind
    }

    /// Multi-line rendering for operator output.
    pub fn pretty(&self) -> String {
        format!(
            "ImportingError: {}\n  on: {}\n  reason: {}",
            self.kind, self.on, self.reason
        )
    }
}
