//! # Error Types
//!
//! Error handling for symbol resolution.
//!
//! We use `thiserror` to generate the `Error` trait implementations and
//! readable messages. Only a few of these ever leave [`Resolver::resolve`]:
//! per-module problems (a failed hash, a failed merge) are logged and
//! recorded in the [`ResolutionReport`], while configuration problems that
//! affect every module are returned to the caller.
//!
//! [`Resolver::resolve`]: crate::symbols::Resolver::resolve
//! [`ResolutionReport`]: crate::symbols::ResolutionReport

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Main error type for symbol resolution.
///
/// ## Error Categories
///
/// 1. **Configuration errors**: InvalidConfig, CacheRootUnavailable
/// 2. **Cache key errors**: InvalidDigest
/// 3. **Patch errors**: MergeToolFailed, MergeToolTimedOut, MergeToolSpawn
/// 4. **Inspection errors**: InvalidBinary
/// 5. **I/O errors**: Io
#[derive(Error, Debug)]
pub enum SymbolError
{
    /// A [`ResolverConfig`](crate::config::ResolverConfig) value is unusable.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The cache root directory cannot be created or accessed.
    ///
    /// This affects every module identically, so it aborts the whole batch.
    #[error("Debug symbol cache root {path} is unusable: {source}")]
    CacheRootUnavailable
    {
        /// Configured cache root
        path: PathBuf,
        /// Underlying filesystem error
        #[source]
        source: std::io::Error,
    },

    /// A content digest cannot be used as a cache directory name.
    #[error("Invalid content digest: {0:?}")]
    InvalidDigest(String),

    /// The merge tool ran but reported failure.
    #[error("{tool} exited with {}", describe_exit(*.code))]
    MergeToolFailed
    {
        /// Merge tool program name
        tool: String,
        /// Exit code, `None` when the child was killed by a signal
        code: Option<i32>,
        /// Captured standard error of the tool
        stderr: String,
    },

    /// The merge tool did not finish in time and was killed.
    #[error("{tool} did not finish within {timeout:?}")]
    MergeToolTimedOut
    {
        /// Merge tool program name
        tool: String,
        /// Configured timeout
        timeout: Duration,
    },

    /// The merge tool could not be started at all.
    #[error("Failed to run {tool}: {source}")]
    MergeToolSpawn
    {
        /// Merge tool program name
        tool: String,
        /// Spawn error
        #[source]
        source: std::io::Error,
    },

    /// A file could not be parsed as an object file.
    #[error("Not a supported object file: {0}")]
    InvalidBinary(String),

    /// I/O error while staging or restoring a binary.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

fn describe_exit(code: Option<i32>) -> String
{
    match code {
        Some(code) => format!("status {code}"),
        None => "no status (terminated by signal)".to_string(),
    }
}

/// Convenience type alias for `Result<T, SymbolError>`
///
/// ```rust
/// use debugsym_core::error::Result;
/// fn foo() -> Result<()>
/// {
///     Ok(())
/// }
/// ```
pub type Result<T> = std::result::Result<T, SymbolError>;
