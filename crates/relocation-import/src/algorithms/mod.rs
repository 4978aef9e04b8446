//! # Algorithms Module
//!
//! Pure steps of an import run: decoding, filter building and chunking.

pub mod chunker;
pub mod filter_builder;
pub mod sanitize;

pub use chunker::{chunk_records, Chunker};
pub use filter_builder::{build_filters, validate_filter};
pub use sanitize::{decode_snapshot, sanitize, Sanitized};
