//! # Shared Types Crate
//!
//! This crate contains every type that crosses the boundary between the
//! import engine and the per-kind importers, which may live in the control
//! domain and be reached only through a remote call.
//!
//! ## Design Principles
//!
//! - **Single Source of Truth**: records, scopes, flags, filters and the
//!   identifier remap table are defined once, here.
//! - **Wire Stability**: everything that travels to an importer is
//!   `Serialize + Deserialize`, so the same request can be served locally or
//!   over a transport.
//! - **Append-Only Remapping**: the `PrimaryKeyMap` never rewrites an entry.

pub mod entities;
pub mod errors;
pub mod ipc;
pub mod remap;

pub use entities::*;
pub use errors::*;
pub use ipc::*;
pub use remap::*;
