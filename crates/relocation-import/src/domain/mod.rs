//! # Domain Module
//!
//! Core domain types for the import engine.

pub mod errors;
pub mod graph;
pub mod value_objects;

pub use errors::*;
pub use graph::*;
pub use value_objects::*;
