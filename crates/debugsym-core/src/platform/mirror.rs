//! Symbol retrieval from a mounted mirror directory.

use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use super::Downloader;

/// [`Downloader`] that copies debug files out of a locally mounted symbol
/// mirror (NFS share, synced bucket, unpacked symbol archive).
///
/// Accepts `file://` URLs and plain filesystem paths. Any other scheme is
/// reported as a failed download. The copy lands in a `.partial` sibling of
/// the destination first and is renamed into place once complete, so a
/// reader never sees a half-written cache entry.
#[derive(Debug, Clone, Copy, Default)]
pub struct MirrorDownloader;

impl MirrorDownloader
{
    /// Map a URL onto a path inside the mirror.
    pub fn source_path(url: &str) -> Option<PathBuf>
    {
        if let Some(rest) = url.strip_prefix("file://") {
            return Some(PathBuf::from(rest));
        }
        if url.contains("://") {
            return None;
        }
        Some(PathBuf::from(url))
    }

    /// Whether a URL or URL template can be served from a mirror.
    pub fn supports(url: &str) -> bool
    {
        Self::source_path(url).is_some()
    }

    async fn copy_into_place(source: &Path, dest: &Path) -> io::Result<()>
    {
        let partial = partial_path(dest);
        if let Err(err) = tokio::fs::copy(source, &partial).await {
            let _ = tokio::fs::remove_file(&partial).await;
            return Err(err);
        }
        if let Err(err) = tokio::fs::rename(&partial, dest).await {
            let _ = tokio::fs::remove_file(&partial).await;
            return Err(err);
        }
        Ok(())
    }
}

impl Downloader for MirrorDownloader
{
    async fn download(&self, url: &str, dest: &Path) -> bool
    {
        let Some(source) = Self::source_path(url) else {
            warn!(url, "Unsupported URL scheme for mirror downloads");
            return false;
        };

        match Self::copy_into_place(&source, dest).await {
            Ok(()) => true,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                debug!(url, "Debug file not present in mirror");
                false
            }
            Err(err) => {
                warn!(url, dest = %dest.display(), "Mirror copy failed: {err}");
                false
            }
        }
    }
}

fn partial_path(dest: &Path) -> PathBuf
{
    let mut name = OsString::from(dest.as_os_str());
    name.push(".partial");
    PathBuf::from(name)
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_source_path_schemes()
    {
        assert_eq!(
            MirrorDownloader::source_path("file:///mnt/symbols/ab/x.dbg"),
            Some(PathBuf::from("/mnt/symbols/ab/x.dbg"))
        );
        assert_eq!(
            MirrorDownloader::source_path("/mnt/symbols/ab/x.dbg"),
            Some(PathBuf::from("/mnt/symbols/ab/x.dbg"))
        );
        assert_eq!(MirrorDownloader::source_path("https://symbols.example/ab/x.dbg"), None);
    }

    #[test]
    fn test_supports_templates()
    {
        assert!(MirrorDownloader::supports("file:///mnt/symbols/{digest}/{name}"));
        assert!(MirrorDownloader::supports("/mnt/symbols/{digest}/{name}"));
        assert!(!MirrorDownloader::supports("https://symbols.example/{digest}/{name}"));
        assert!(!MirrorDownloader::supports("s3://bucket/{digest}/{name}"));
    }

    #[tokio::test]
    async fn test_download_copies_and_leaves_no_partial()
    {
        let mirror = tempfile::tempdir().unwrap();
        let cache = tempfile::tempdir().unwrap();
        let source = mirror.path().join("x.dbg");
        std::fs::write(&source, b"debug info").unwrap();
        let dest = cache.path().join("x.dbg");

        let url = format!("file://{}", source.display());
        assert!(MirrorDownloader.download(&url, &dest).await);
        assert_eq!(std::fs::read(&dest).unwrap(), b"debug info");
        assert!(!partial_path(&dest).exists());
    }

    #[tokio::test]
    async fn test_missing_source_is_not_found()
    {
        let cache = tempfile::tempdir().unwrap();
        let dest = cache.path().join("x.dbg");
        assert!(!MirrorDownloader.download("/definitely/not/here.dbg", &dest).await);
        assert!(!dest.exists());
        assert!(!partial_path(&dest).exists());
    }

    #[tokio::test]
    async fn test_http_is_rejected()
    {
        let cache = tempfile::tempdir().unwrap();
        assert!(!MirrorDownloader.download("http://symbols.example/x.dbg", &cache.path().join("x.dbg")).await);
    }
}
