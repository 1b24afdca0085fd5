//! # Debug Symbol Cache
//!
//! Content-addressed, append-only store of debug-symbol files.
//!
//! Entries live at `<cache_root>/<content_digest>/<name>.dbg`. The digest is
//! computed from the stripped binary, so every module whose binary is
//! byte-identical maps onto the same entry, across modules and across
//! dumps. Entries are written once by a successful download and never
//! evicted.
//!
//! ## Usage
//!
//! ```rust
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! use debugsym_core::platform::LocalFilesystem;
//! use debugsym_core::symbols::DebugSymbolCache;
//! use debugsym_core::types::ContentDigest;
//!
//! let cache = DebugSymbolCache::new("/debugsymbols", Arc::new(LocalFilesystem));
//! let digest = ContentDigest::new("0123abcd").unwrap();
//! let path = cache.resolve_path(&digest, "somelib.dbg");
//! assert_eq!(path, Path::new("/debugsymbols/0123abcd/somelib.dbg"));
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, Weak};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::debug;

use crate::error::{Result, SymbolError};
use crate::platform::Filesystem;
use crate::types::ContentDigest;

/// Guard held while a digest's cache entry is being looked up or filled.
pub type DigestGuard = OwnedMutexGuard<()>;

/// Cache of debug-symbol files keyed by binary content digest.
///
/// ## Concurrency
///
/// [`lock`](Self::lock) hands out one async mutex per digest. The resolver
/// holds it across the existence check and the download, so at most one
/// download per digest is ever in flight and a module never observes an
/// entry while another task is still writing it.
pub struct DebugSymbolCache<F>
{
    root: PathBuf,
    fs: Arc<F>,
    in_flight: Mutex<HashMap<ContentDigest, Weak<AsyncMutex<()>>>>,
}

impl<F: Filesystem> DebugSymbolCache<F>
{
    /// Create a cache rooted at `root`.
    pub fn new(root: impl Into<PathBuf>, fs: Arc<F>) -> Self
    {
        Self {
            root: root.into(),
            fs,
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    /// Cache root directory.
    pub fn root(&self) -> &Path
    {
        &self.root
    }

    /// Path of the entry for `digest` and `debug_file_name`. Pure, no I/O.
    pub fn resolve_path(&self, digest: &ContentDigest, debug_file_name: &str) -> PathBuf
    {
        self.root.join(digest.as_str()).join(debug_file_name)
    }

    /// Whether an entry exists at `path`.
    pub async fn exists(&self, path: &Path) -> bool
    {
        self.fs.exists(path).await
    }

    /// Make sure the cache root exists.
    ///
    /// ## Errors
    ///
    /// Returns [`SymbolError::CacheRootUnavailable`] if the directory cannot
    /// be created.
    pub async fn ensure_root(&self) -> Result<()>
    {
        self.fs
            .create_dir_all(&self.root)
            .await
            .map_err(|source| SymbolError::CacheRootUnavailable {
                path: self.root.clone(),
                source,
            })
    }

    /// Acquire the single-flight lock for `digest`.
    pub async fn lock(&self, digest: &ContentDigest) -> DigestGuard
    {
        let slot = {
            let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
            in_flight.retain(|_, slot| slot.strong_count() > 0);
            if let Some(existing) = in_flight.get(digest).and_then(Weak::upgrade) {
                debug!(%digest, "Waiting for in-flight cache work");
                existing
            } else {
                let slot = Arc::new(AsyncMutex::new(()));
                in_flight.insert(digest.clone(), Arc::downgrade(&slot));
                slot
            }
        };
        slot.lock_owned().await
    }
}
