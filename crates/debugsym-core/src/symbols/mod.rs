//! # Symbols
//!
//! Debug-symbol resolution pipeline, leaf-first:
//!
//! - [`hasher`]: content digest of a local binary
//! - [`cache`]: content-addressed debug file store
//! - [`fetcher`]: download of missing debug files
//! - [`patcher`]: staged merge of a debug file into its binary
//! - [`filter`]: module eligibility policy
//! - [`resolver`]: per-module orchestration, the public entry point
//! - [`inspect`]: debug-info checks on ELF files

pub mod cache;
pub mod fetcher;
pub mod filter;
pub mod hasher;
pub mod inspect;
pub mod patcher;
pub mod resolver;

pub use cache::DebugSymbolCache;
pub use fetcher::SymbolFetcher;
pub use filter::{ModuleFilter, NativeLibraryFilter};
pub use inspect::{inspect_file, DebugInfoSummary};
pub use patcher::BinaryPatcher;
pub use resolver::{ModuleOutcome, PatchStatus, ResolutionReport, Resolver};
