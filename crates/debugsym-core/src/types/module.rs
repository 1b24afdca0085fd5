//! Shared-library module records.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// File extension used for cached debug-symbol files.
pub const DEBUG_FILE_EXTENSION: &str = "dbg";

/// A shared library recorded as loaded in the analyzed dump.
///
/// Module records are produced by the dump parser and handed to the
/// [`Resolver`](crate::symbols::Resolver), which fills in
/// [`debug_symbol_path`](Module::debug_symbol_path) in place. Nothing else
/// writes that field.
///
/// ## Example
///
/// ```rust
/// use debugsym_core::types::Module;
///
/// let module = Module::new("somelib.so", "/lib/ruxit/somelib.so").with_local_path("./lib/ruxit/somelib.so");
/// assert_eq!(module.debug_file_name(), "somelib.dbg");
/// assert!(module.debug_symbol_path.is_none());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Module
{
    /// Local copy of the binary, absent when it was never materialized.
    #[serde(default)]
    pub local_path: Option<PathBuf>,
    /// Base file name, e.g. `somelib.so`.
    pub file_name: String,
    /// Runtime path recorded in the dump. Only used for eligibility.
    pub file_path: String,
    /// Cache path of the matching debug file, set by the resolver.
    #[serde(default)]
    pub debug_symbol_path: Option<PathBuf>,
}

impl Module
{
    /// Create a module record without a local binary.
    pub fn new(file_name: impl Into<String>, file_path: impl Into<String>) -> Self
    {
        Self {
            local_path: None,
            file_name: file_name.into(),
            file_path: file_path.into(),
            debug_symbol_path: None,
        }
    }

    /// Attach the path of the local binary copy.
    #[must_use]
    pub fn with_local_path(mut self, path: impl Into<PathBuf>) -> Self
    {
        self.local_path = Some(path.into());
        self
    }

    /// Name of the debug file in the cache: the file name with its last
    /// extension replaced by `.dbg` (`somelib.so` becomes `somelib.dbg`).
    pub fn debug_file_name(&self) -> String
    {
        debug_file_name(&self.file_name)
    }

    /// Whether the resolver found a debug file for this module.
    pub fn is_resolved(&self) -> bool
    {
        self.debug_symbol_path.is_some()
    }
}

impl fmt::Display for Module
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "{} ({})", self.file_name, self.file_path)
    }
}

/// Debug file name for a module file name.
pub fn debug_file_name(file_name: &str) -> String
{
    Path::new(file_name)
        .with_extension(DEBUG_FILE_EXTENSION)
        .to_string_lossy()
        .into_owned()
}
