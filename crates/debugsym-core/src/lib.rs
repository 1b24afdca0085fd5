//! # debugsym-core
//!
//! Debug-symbol resolution for offline crash-dump analysis.
//!
//! Given the shared libraries loaded in a dumped process, this crate finds
//! the separate debug file for each library binary that was copied out of
//! the dump and merges ("unstrips") it into that binary, so that later
//! symbolication sees function names and line numbers.
//!
//! - Debug files are cached under `<cache_root>/<sha256 of binary>/<name>.dbg`
//! - Missing entries are fetched through a [`Downloader`](platform::Downloader)
//! - Merging runs an external tool (`eu-unstrip` by default) against a staged
//!   copy of the binary, so an interrupted or failed merge never loses it
//!
//! The entry point is [`Resolver`](symbols::Resolver). Disk, network and
//! process access go through the traits in [`platform`].

pub mod config;
pub mod error;
pub mod platform;
pub mod symbols;
pub mod types;

// Re-export commonly used types
pub use config::ResolverConfig;
pub use error::{Result, SymbolError};
pub use symbols::{ModuleOutcome, ResolutionReport, Resolver};
pub use types::{ContentDigest, Module};
