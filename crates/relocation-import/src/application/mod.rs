//! # Application Module
//!
//! Services orchestrating an import run.

pub mod dispatcher;
pub mod reconciler;
pub mod registry;
pub mod service;

pub use dispatcher::{build_replica, BatchDispatcher, DispatchOutcome, INTEGRITY_REMEDIATION};
pub use reconciler::{name_mapping, NamingReconciler};
pub use registry::ImporterRegistry;
pub use service::SnapshotImportService;
