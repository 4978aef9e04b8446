//! # Relocation Import
//!
//! Restores a serialized snapshot of a multi-tenant platform into a live
//! deployment split into one control domain and one or more regional
//! domains.
//!
//! **Architecture:** Hexagonal (DDD + Ports/Adapters)
//!
//! ## Purpose
//!
//! Import a snapshot in one full pass while keeping references intact:
//! - Records are imported in dependency order, in bounded same-kind batches
//! - Every old identifier is translated once and never rewritten
//! - Kinds owned by the control domain are imported through a remote call
//! - Tenant names are reconciled across domains before the tokens that
//!   depend on them are reissued
//!
//! ## Import Scopes
//!
//! | Scope | Kinds eligible |
//! |-------|----------------|
//! | User | user-scoped |
//! | Organization | user- and organization-scoped |
//! | Config | user- and config-scoped |
//! | Global | everything but excluded kinds |
//!
//! ## Module Structure
//!
//! ```text
//! relocation-import/
//! ├── domain/          # Chunk, RunState, DependencyGraph, errors
//! ├── algorithms/      # Decoding, scope filter building, chunking
//! ├── ports/           # API trait (inbound) + collaborator traits (outbound)
//! ├── adapters/        # In-memory store/outbox/naming, remote importer
//! ├── application/     # Dispatcher, naming reconciler, SnapshotImportService
//! └── config.rs        # ImportConfig
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod adapters;
pub mod algorithms;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;

// Re-exports
pub use adapters::{
    CollisionPolicy, InMemoryRegionOutbox, InMemoryStore, Journal, JournalEntry,
    LoopbackTransport, RecordingNamingService, RemoteImporter, StoreOperation, TableImporter,
};
pub use algorithms::{build_filters, chunk_records, decode_snapshot, sanitize, validate_filter, Chunker};
pub use application::{
    BatchDispatcher, DispatchOutcome, ImporterRegistry, NamingReconciler, SnapshotImportService,
};
pub use config::{
    ImportConfig, WellKnownKinds, DEFAULT_MAX_BATCH_SIZE, DEFAULT_MAX_SHARD_DRAIN_ATTEMPTS,
};
pub use domain::{
    Chunk, DecryptError, DependencyGraph, ImportReport, ImportingError, KindDescriptor,
    NamingError, OutboxError, RunContext, RunState, RunStats, StoreError, TransportError,
};
pub use ports::{
    CollectingPrinter, ControlPlaneTransport, Decryptor, Importer, LiveStore, NamingService,
    NoopPrinter, PlaintextDecryptor, Printer, RegionOutbox, SnapshotImportApi,
};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
