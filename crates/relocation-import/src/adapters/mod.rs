//! # Adapters Module
//!
//! Implementations of the outbound ports.

pub mod memory;
pub mod remote;

pub use memory::{
    CollisionPolicy, InMemoryRegionOutbox, InMemoryStore, Journal, JournalEntry,
    RecordingNamingService, StoreOperation, TableImporter,
};
pub use remote::{serve_import_request, LoopbackTransport, RemoteImporter, IMPORT_METHOD};
