//! Local-machine capability implementations.

use std::ffi::OsString;
use std::io;
use std::path::Path;
use std::process::Stdio;

use tokio::process::Command;
use tracing::debug;

use super::{FileInfo, Filesystem, ProcessOutput, ProcessRunner};
use crate::symbols::hasher;
use crate::types::ContentDigest;

/// [`Filesystem`] backed by `tokio::fs`.
///
/// Hashing reads the whole file, so it runs on tokio's blocking pool.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFilesystem;

impl Filesystem for LocalFilesystem
{
    async fn exists(&self, path: &Path) -> bool
    {
        tokio::fs::try_exists(path).await.unwrap_or(false)
    }

    async fn rename(&self, from: &Path, to: &Path) -> io::Result<()>
    {
        tokio::fs::rename(from, to).await
    }

    async fn remove(&self, path: &Path) -> io::Result<()>
    {
        tokio::fs::remove_file(path).await
    }

    async fn create_dir_all(&self, path: &Path) -> io::Result<()>
    {
        tokio::fs::create_dir_all(path).await
    }

    async fn content_digest(&self, path: &Path) -> io::Result<ContentDigest>
    {
        let path = path.to_path_buf();
        tokio::task::spawn_blocking(move || hasher::hash_file(&path))
            .await
            .map_err(io::Error::other)?
    }

    async fn file_info(&self, path: &Path) -> Option<FileInfo>
    {
        let metadata = tokio::fs::metadata(path).await.ok()?;
        Some(FileInfo {
            len: metadata.len(),
            is_file: metadata.is_file(),
        })
    }
}

/// [`ProcessRunner`] backed by `tokio::process`.
///
/// Children are spawned with `kill_on_drop`, so a caller that stops polling
/// (for example after a timeout) terminates the process.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemProcessRunner;

impl ProcessRunner for SystemProcessRunner
{
    async fn run(&self, program: &str, args: &[OsString]) -> io::Result<ProcessOutput>
    {
        debug!(program, ?args, "Spawning process");
        let output = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await?;

        Ok(ProcessOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}
