//! # Resolver Configuration
//!
//! Everything the resolver needs to know about its deployment is passed in
//! through [`ResolverConfig`] at construction time. There are no globals.
//!
//! ```rust
//! use std::time::Duration;
//!
//! use debugsym_core::config::ResolverConfig;
//!
//! let config = ResolverConfig::new("/var/cache/debugsym")
//!     .with_symbol_url_template("file:///mnt/symbols/{digest}/{name}")
//!     .with_max_concurrency(4)
//!     .with_download_timeout(Duration::from_secs(30));
//! assert!(config.validate().is_ok());
//! ```

use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use crate::error::{Result, SymbolError};

/// Default cache root when none is configured.
pub const DEFAULT_CACHE_ROOT: &str = "/debugsymbols";

/// Default merge tool (elfutils).
pub const DEFAULT_MERGE_TOOL: &str = "eu-unstrip";

/// Default upper bound for a single download.
pub const DEFAULT_DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(60);

/// Default upper bound for a single merge-tool run.
pub const DEFAULT_MERGE_TIMEOUT: Duration = Duration::from_secs(120);

/// Placeholder for the content digest in symbol URL templates.
pub const DIGEST_PLACEHOLDER: &str = "{digest}";

/// Resolver settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolverConfig
{
    /// Root of the content-addressed debug-symbol cache.
    pub cache_root: PathBuf,
    /// Symbol server URL template with `{digest}`, `{name}` and `{file}`
    /// placeholders. `None` disables downloads.
    pub symbol_url_template: Option<String>,
    /// Program invoked to merge a debug file into a stripped binary.
    pub merge_tool: String,
    /// Maximum number of modules resolved at the same time.
    pub max_concurrency: usize,
    /// Timeout for one download.
    pub download_timeout: Duration,
    /// Timeout for one merge-tool run.
    pub merge_timeout: Duration,
    /// Run the patch sequence right after a successful download.
    pub patch_after_download: bool,
    /// Treat a non-zero merge-tool exit status as a failed patch.
    pub verify_merge_status: bool,
}

impl Default for ResolverConfig
{
    fn default() -> Self
    {
        Self::new(DEFAULT_CACHE_ROOT)
    }
}

impl ResolverConfig
{
    /// Configuration with default settings and the given cache root.
    pub fn new(cache_root: impl Into<PathBuf>) -> Self
    {
        Self {
            cache_root: cache_root.into(),
            symbol_url_template: None,
            merge_tool: DEFAULT_MERGE_TOOL.to_string(),
            max_concurrency: default_concurrency(),
            download_timeout: DEFAULT_DOWNLOAD_TIMEOUT,
            merge_timeout: DEFAULT_MERGE_TIMEOUT,
            patch_after_download: true,
            verify_merge_status: true,
        }
    }

    #[must_use]
    pub fn with_symbol_url_template(mut self, template: impl Into<String>) -> Self
    {
        self.symbol_url_template = Some(template.into());
        self
    }

    #[must_use]
    pub fn with_merge_tool(mut self, tool: impl Into<String>) -> Self
    {
        self.merge_tool = tool.into();
        self
    }

    #[must_use]
    pub fn with_max_concurrency(mut self, jobs: usize) -> Self
    {
        self.max_concurrency = jobs;
        self
    }

    #[must_use]
    pub fn with_download_timeout(mut self, timeout: Duration) -> Self
    {
        self.download_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_merge_timeout(mut self, timeout: Duration) -> Self
    {
        self.merge_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_patch_after_download(mut self, enabled: bool) -> Self
    {
        self.patch_after_download = enabled;
        self
    }

    #[must_use]
    pub fn with_verify_merge_status(mut self, enabled: bool) -> Self
    {
        self.verify_merge_status = enabled;
        self
    }

    /// Cache root as a path.
    pub fn cache_root(&self) -> &Path
    {
        &self.cache_root
    }

    /// Check the settings without touching the filesystem.
    ///
    /// ## Errors
    ///
    /// Returns [`SymbolError::InvalidConfig`] for an empty cache root or
    /// merge tool, zero concurrency, a zero timeout, or a URL template
    /// without a `{digest}` placeholder.
    pub fn validate(&self) -> Result<()>
    {
        if self.cache_root.as_os_str().is_empty() {
            return Err(SymbolError::InvalidConfig("cache root is empty".into()));
        }
        if self.merge_tool.trim().is_empty() {
            return Err(SymbolError::InvalidConfig("merge tool is empty".into()));
        }
        if self.max_concurrency == 0 {
            return Err(SymbolError::InvalidConfig("max concurrency must be at least 1".into()));
        }
        if self.download_timeout.is_zero() || self.merge_timeout.is_zero() {
            return Err(SymbolError::InvalidConfig("timeouts must be non-zero".into()));
        }
        if let Some(template) = &self.symbol_url_template {
            if !template.contains(DIGEST_PLACEHOLDER) {
                return Err(SymbolError::InvalidConfig(format!(
                    "symbol URL template {template:?} has no {DIGEST_PLACEHOLDER} placeholder"
                )));
            }
        }
        Ok(())
    }
}

fn default_concurrency() -> usize
{
    thread::available_parallelism().map_or(4, std::num::NonZeroUsize::get)
}
