//! # Importer IPC Payloads
//!
//! Request/response pair exchanged with a kind's importer, whether it runs
//! in-process or behind a remote call into the owning domain.
//!
//! ## Design Rules
//!
//! - The request carries only the slice of the remap table that the kind's
//!   declared dependencies need.
//! - A response is either a remap delta with ordinal/id ranges, or a
//!   structured, kind-tagged error.

use crate::entities::{Filter, ImportFlags, ImportScope, KindName, PrimaryKey, Record};
use crate::errors::RpcImportError;
use crate::remap::PrimaryKeyMap;
use serde::{Deserialize, Serialize};

/// One batch handed to an importer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportRequest {
    /// Kind of every record in `records`.
    pub kind: KindName,
    /// Breadth of the run.
    pub scope: ImportScope,
    /// Run flags.
    pub flags: ImportFlags,
    /// Active inclusion filters.
    pub filters: Vec<Filter>,
    /// Translations of the kinds this kind depends on.
    pub pk_map: PrimaryKeyMap,
    /// Records of the batch, in source order.
    pub records: Vec<Record>,
    /// Ordinal of the first record of the batch (1-based).
    pub min_ordinal: u64,
}

/// Successful batch import.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportOk {
    /// Translations produced by this batch.
    pub mapped_pks: PrimaryKeyMap,
    /// First ordinal actually imported.
    pub min_ordinal: Option<u64>,
    /// Last ordinal actually imported.
    pub max_ordinal: Option<u64>,
    /// Smallest source identifier imported.
    pub min_source_pk: Option<PrimaryKey>,
    /// Largest source identifier imported.
    pub max_source_pk: Option<PrimaryKey>,
    /// Smallest identifier newly inserted.
    pub min_inserted_pk: Option<PrimaryKey>,
    /// Largest identifier newly inserted.
    pub max_inserted_pk: Option<PrimaryKey>,
}

impl ImportOk {
    /// Result of a batch in which nothing was imported.
    pub fn empty() -> Self {
        Self::default()
    }
}

/// Wire form of an importer result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "body", rename_all = "lowercase")]
pub enum ImportResponse {
    /// The batch was imported.
    Ok(ImportOk),
    /// The batch failed.
    Err(RpcImportError),
}

impl ImportResponse {
    /// Convert into a plain `Result`.
    pub fn into_result(self) -> Result<ImportOk, RpcImportError> {
        match self {
            ImportResponse::Ok(ok) => Ok(ok),
            ImportResponse::Err(err) => Err(err),
        }
    }
}

impl From<Result<ImportOk, RpcImportError>> for ImportResponse {
    fn from(result: Result<ImportOk, RpcImportError>) -> Self {
        match result {
            Ok(ok) => ImportResponse::Ok(ok),
            Err(err) => ImportResponse::Err(err),
        }
    }
}
