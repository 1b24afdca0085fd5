//! Debug-symbol retrieval from a symbol server.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::platform::{Downloader, Filesystem};
use crate::types::ContentDigest;

/// Downloads missing debug files into the cache.
///
/// The server location is a URL template; see
/// [`symbol_url`](Self::symbol_url) for the placeholders. Without a template
/// the fetcher is offline and every fetch fails immediately.
///
/// A missing debug file is an expected outcome, so [`fetch`](Self::fetch)
/// reports success as a plain `bool` and logs the reason for a failure.
pub struct SymbolFetcher<F, D>
{
    fs: Arc<F>,
    downloader: Arc<D>,
    url_template: Option<String>,
    timeout: Duration,
}

impl<F: Filesystem, D: Downloader> SymbolFetcher<F, D>
{
    /// Create a fetcher writing through `fs`.
    ///
    /// `url_template` of `None` makes the fetcher offline. `timeout` bounds
    /// each download; a download still running when it expires counts as a
    /// failure and its partial result is removed.
    pub fn new(fs: Arc<F>, downloader: Arc<D>, url_template: Option<String>, timeout: Duration) -> Self
    {
        Self {
            fs,
            downloader,
            url_template,
            timeout,
        }
    }

    /// Expand the URL template for one debug file.
    ///
    /// - `{digest}`: content digest of the stripped binary
    /// - `{name}`: debug file name, e.g. `somelib.dbg`
    /// - `{file}`: module file name, e.g. `somelib.so`
    pub fn symbol_url(&self, digest: &ContentDigest, debug_file_name: &str, file_name: &str) -> Option<String>
    {
        self.url_template.as_ref().map(|template| {
            template
                .replace("{digest}", digest.as_str())
                .replace("{name}", debug_file_name)
                .replace("{file}", file_name)
        })
    }

    /// Download the debug file for `digest` into `dest`.
    ///
    /// Returns `true` only if the downloader reported success within the
    /// timeout and a non-empty file now exists at `dest`.
    pub async fn fetch(&self, digest: &ContentDigest, file_name: &str, dest: &Path) -> bool
    {
        let debug_file_name = dest
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let Some(url) = self.symbol_url(digest, &debug_file_name, file_name) else {
            debug!(%digest, "No symbol server configured, skipping download");
            return false;
        };

        if let Some(parent) = dest.parent() {
            if let Err(err) = self.fs.create_dir_all(parent).await {
                warn!(dir = %parent.display(), "Cannot create cache directory: {err}");
                return false;
            }
        }

        debug!(%url, dest = %dest.display(), "Downloading debug symbols");
        match tokio::time::timeout(self.timeout, self.downloader.download(&url, dest)).await {
            Ok(true) => {}
            Ok(false) => {
                info!(%url, "Debug symbols not available");
                return false;
            }
            Err(_) => {
                warn!(%url, timeout = ?self.timeout, "Debug symbol download timed out");
                self.discard(dest).await;
                return false;
            }
        }

        match self.fs.file_info(dest).await {
            Some(file) if file.is_file && file.len > 0 => {
                info!(%url, bytes = file.len, "Downloaded debug symbols");
                true
            }
            _ => {
                warn!(%url, dest = %dest.display(), "Download reported success but left no usable file");
                self.discard(dest).await;
                false
            }
        }
    }

    async fn discard(&self, dest: &Path)
    {
        if self.fs.exists(dest).await {
            if let Err(err) = self.fs.remove(dest).await {
                warn!(dest = %dest.display(), "Cannot remove incomplete download: {err}");
            }
        }
    }
}
