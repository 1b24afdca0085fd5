//! # Types
//!
//! Data types shared by the resolver and its collaborators.

pub mod digest;
pub mod module;

// Re-export all public types
pub use digest::ContentDigest;
pub use module::{debug_file_name, Module, DEBUG_FILE_EXTENSION};
