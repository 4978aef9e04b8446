//! # Inbound Ports
//!
//! API trait defining what the import engine can do.

use async_trait::async_trait;
use shared_types::{Filter, ImportFlags, ImportScope};
use std::collections::BTreeSet;

use super::outbound::Printer;
use crate::domain::{ImportReport, ImportingError};

/// Snapshot import API - inbound port.
///
/// Every call is one full pass over one snapshot.
#[async_trait]
pub trait SnapshotImportApi: Send + Sync {
    /// Import with an explicit scope and optional filter.
    ///
    /// The filter is validated against the scope before the snapshot is read.
    async fn import_snapshot(
        &self,
        snapshot: &[u8],
        scope: ImportScope,
        filter: Option<Filter>,
        flags: ImportFlags,
        printer: &dyn Printer,
    ) -> Result<ImportReport, ImportingError>;

    /// Import users, optionally only those with the given usernames.
    async fn import_in_user_scope(
        &self,
        snapshot: &[u8],
        usernames: Option<BTreeSet<String>>,
        flags: ImportFlags,
        printer: &dyn Printer,
    ) -> Result<ImportReport, ImportingError>;

    /// Import organizations and their members, optionally only the
    /// organizations with the given slugs.
    async fn import_in_organization_scope(
        &self,
        snapshot: &[u8],
        slugs: Option<BTreeSet<String>>,
        flags: ImportFlags,
        printer: &dyn Printer,
    ) -> Result<ImportReport, ImportingError>;

    /// Import administrative configuration and the users it needs,
    /// optionally only the given usernames.
    async fn import_in_config_scope(
        &self,
        snapshot: &[u8],
        usernames: Option<BTreeSet<String>>,
        flags: ImportFlags,
        printer: &dyn Printer,
    ) -> Result<ImportReport, ImportingError>;

    /// Restore the entire state.
    async fn import_in_global_scope(
        &self,
        snapshot: &[u8],
        flags: ImportFlags,
        printer: &dyn Printer,
    ) -> Result<ImportReport, ImportingError>;
}
