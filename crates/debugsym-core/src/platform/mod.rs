//! # Platform Capabilities
//!
//! The resolver never touches the disk, the network, or child processes
//! directly. It goes through three narrow capability traits defined here,
//! each carrying exactly the operations the resolver consumes:
//!
//! - [`Filesystem`]: existence checks, rename, delete, directory creation,
//!   content hashing and file metadata
//! - [`Downloader`]: fetch a URL into a destination file
//! - [`ProcessRunner`]: run a program and capture its output
//!
//! Production implementations live in the submodules:
//!
//! - [`local`]: [`LocalFilesystem`] on `tokio::fs` and [`SystemProcessRunner`]
//!   on `tokio::process`
//! - [`mirror`]: [`MirrorDownloader`], which serves `file://` URLs from a
//!   mounted symbol mirror
//!
//! A real HTTP transport is supplied by the embedding application through
//! [`Downloader`]. Tests substitute in-memory fakes for all three.
//!
//! The traits use return-position `impl Future` so the resolver can move
//! their futures onto tokio worker tasks; every returned future is `Send`.

use std::ffi::OsString;
use std::future::Future;
use std::io;
use std::path::Path;

use crate::types::ContentDigest;

pub mod local;
pub mod mirror;

pub use local::{LocalFilesystem, SystemProcessRunner};
pub use mirror::MirrorDownloader;

/// Metadata about an existing file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileInfo
{
    /// Size in bytes
    pub len: u64,
    /// Whether the path is a regular file
    pub is_file: bool,
}

/// Captured result of a finished child process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput
{
    /// Exit code, `None` when the process was terminated by a signal.
    pub code: Option<i32>,
    /// Captured standard output (lossy UTF-8)
    pub stdout: String,
    /// Captured standard error (lossy UTF-8)
    pub stderr: String,
}

impl ProcessOutput
{
    /// Output of a process that exited with `code`.
    pub fn exited(code: i32) -> Self
    {
        Self {
            code: Some(code),
            ..Self::default()
        }
    }

    /// Whether the process exited with status zero.
    pub fn success(&self) -> bool
    {
        self.code == Some(0)
    }
}

/// Filesystem operations used by the cache, fetcher and patcher.
pub trait Filesystem: Send + Sync + 'static
{
    /// Whether anything exists at `path`.
    fn exists(&self, path: &Path) -> impl Future<Output = bool> + Send;

    /// Rename `from` to `to`, replacing `to` if the platform allows it.
    fn rename(&self, from: &Path, to: &Path) -> impl Future<Output = io::Result<()>> + Send;

    /// Delete the file at `path`.
    fn remove(&self, path: &Path) -> impl Future<Output = io::Result<()>> + Send;

    /// Create `path` and all missing parents.
    fn create_dir_all(&self, path: &Path) -> impl Future<Output = io::Result<()>> + Send;

    /// Content digest of the file at `path`.
    fn content_digest(&self, path: &Path) -> impl Future<Output = io::Result<ContentDigest>> + Send;

    /// Metadata for `path`, `None` if it does not exist.
    fn file_info(&self, path: &Path) -> impl Future<Output = Option<FileInfo>> + Send;
}

/// Retrieves a remote file into a local destination.
///
/// Failure is routine: a missing debug file on the server is an expected
/// outcome, so implementations report it as `false` instead of an error.
pub trait Downloader: Send + Sync + 'static
{
    /// Download `url` into `dest`. Returns `true` only if the file was
    /// retrieved and fully written.
    fn download(&self, url: &str, dest: &Path) -> impl Future<Output = bool> + Send;
}

/// Runs external programs.
pub trait ProcessRunner: Send + Sync + 'static
{
    /// Run `program` with `args` to completion and capture its output.
    ///
    /// Dropping the returned future must terminate the child.
    fn run(&self, program: &str, args: &[OsString]) -> impl Future<Output = io::Result<ProcessOutput>> + Send;
}
