//! # Binary Patcher
//!
//! Merges ("unstrips") a cached debug file into a module's local binary.
//!
//! The merge tool cannot write its output over its own input, so the
//! binary is staged first:
//!
//! 1. Clear a `<binary>.old` left behind by an interrupted earlier run.
//! 2. Rename `<binary>` to `<binary>.old`.
//! 3. Run `<tool> -o <binary> <binary>.old <debug file>`.
//! 4. Remove `<binary>.old`.
//!
//! The original bytes survive every failure the process itself lives
//! through:
//!
//! - If step 3 fails, `.old` is renamed back over `<binary>`, discarding any
//!   partial output.
//! - If the patch future is dropped during step 3 (the merge tool is killed
//!   with it), the same restore is spawned onto the runtime.
//! - If step 1 finds `.old` but no `<binary>`, the previous run died between
//!   steps 2 and 3 and `.old` is the only copy, so it is renamed back
//!   instead of deleted.
//! - If step 4 cannot remove `.old`, the merged binary is kept and the
//!   leftover is removed by step 1 of the next patch.
//!
//! A process killed outright during step 3 can leave a partial `<binary>`
//! next to `.old`; step 1 then cannot tell it from a merged one.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;
use tracing::{debug, error, info, warn};

use crate::error::{Result, SymbolError};
use crate::platform::{Filesystem, ProcessRunner};

/// Suffix of the staged copy of a binary during a patch.
pub const STAGING_SUFFIX: &str = ".old";

/// Path of the staged copy of `binary`.
pub fn staging_path(binary: &Path) -> PathBuf
{
    let mut staged = OsString::from(binary.as_os_str());
    staged.push(STAGING_SUFFIX);
    PathBuf::from(staged)
}

/// Arguments for the merge tool: `-o <binary> <staged> <debug file>`.
pub fn merge_args(binary: &Path, staged: &Path, debug_file: &Path) -> Vec<OsString>
{
    vec![
        OsString::from("-o"),
        binary.as_os_str().to_owned(),
        staged.as_os_str().to_owned(),
        debug_file.as_os_str().to_owned(),
    ]
}

/// Applies cached debug files to local binaries.
pub struct BinaryPatcher<F, P>
{
    fs: Arc<F>,
    runner: Arc<P>,
    tool: String,
    timeout: Duration,
    verify_status: bool,
}

impl<F: Filesystem, P: ProcessRunner> BinaryPatcher<F, P>
{
    /// Create a patcher.
    ///
    /// With `verify_status` unset, a non-zero exit of the merge tool is
    /// logged and otherwise treated as success.
    pub fn new(fs: Arc<F>, runner: Arc<P>, tool: impl Into<String>, timeout: Duration, verify_status: bool) -> Self
    {
        Self {
            fs,
            runner,
            tool: tool.into(),
            timeout,
            verify_status,
        }
    }

    /// Merge `debug_file` into the binary at `binary`.
    ///
    /// ## Errors
    ///
    /// - [`SymbolError::Io`] if clearing a leftover or staging the binary fails
    /// - [`SymbolError::MergeToolSpawn`], [`SymbolError::MergeToolTimedOut`]
    ///   or [`SymbolError::MergeToolFailed`] if the merge did not succeed; the
    ///   original binary is back in place in that case
    pub async fn patch(&self, binary: &Path, debug_file: &Path) -> Result<()>
    {
        let staged = staging_path(binary);
        self.clear_leftover(binary, &staged).await?;

        self.fs.rename(binary, &staged).await?;
        debug!(binary = %binary.display(), "Staged binary for merge");
        let mut restore_on_drop = RestoreOnDrop {
            fs: Arc::clone(&self.fs),
            binary: binary.to_path_buf(),
            staged: staged.clone(),
            armed: true,
        };

        let merged = self.merge(binary, &staged, debug_file).await;
        restore_on_drop.armed = false;
        match merged {
            Ok(()) => {
                if let Err(err) = self.fs.remove(&staged).await {
                    warn!(staged = %staged.display(), "Cannot remove staged binary after merge: {err}");
                }
                info!(binary = %binary.display(), debug_file = %debug_file.display(), "Merged debug symbols");
                Ok(())
            }
            Err(err) => {
                if let Err(restore) = self.fs.rename(&staged, binary).await {
                    error!(
                        binary = %binary.display(),
                        staged = %staged.display(),
                        "Cannot restore original binary after failed merge: {restore}"
                    );
                }
                Err(err)
            }
        }
    }

    /// Put back a binary that an interrupted patch left only as `.old`.
    ///
    /// Returns `true` if a binary was restored.
    pub async fn recover(&self, binary: &Path) -> bool
    {
        let staged = staging_path(binary);
        if self.fs.exists(binary).await || !self.fs.exists(&staged).await {
            return false;
        }
        match self.fs.rename(&staged, binary).await {
            Ok(()) => {
                warn!(binary = %binary.display(), "Restored binary left staged by an interrupted patch");
                true
            }
            Err(err) => {
                error!(staged = %staged.display(), "Cannot restore staged binary: {err}");
                false
            }
        }
    }

    async fn clear_leftover(&self, binary: &Path, staged: &Path) -> Result<()>
    {
        if !self.fs.exists(staged).await {
            return Ok(());
        }
        if self.fs.exists(binary).await {
            debug!(staged = %staged.display(), "Removing leftover staged binary");
            self.fs.remove(staged).await?;
        } else {
            warn!(binary = %binary.display(), "Restoring binary left staged by an interrupted patch");
            self.fs.rename(staged, binary).await?;
        }
        Ok(())
    }

    async fn merge(&self, binary: &Path, staged: &Path, debug_file: &Path) -> Result<()>
    {
        let args = merge_args(binary, staged, debug_file);
        let output = match tokio::time::timeout(self.timeout, self.runner.run(&self.tool, &args)).await {
            Ok(Ok(output)) => output,
            Ok(Err(source)) => {
                return Err(SymbolError::MergeToolSpawn {
                    tool: self.tool.clone(),
                    source,
                })
            }
            Err(_) => {
                return Err(SymbolError::MergeToolTimedOut {
                    tool: self.tool.clone(),
                    timeout: self.timeout,
                })
            }
        };

        if output.success() {
            return Ok(());
        }
        if !self.verify_status {
            warn!(tool = %self.tool, code = ?output.code, "Ignoring merge tool exit status");
            return Ok(());
        }
        Err(SymbolError::MergeToolFailed {
            tool: self.tool.clone(),
            code: output.code,
            stderr: output.stderr,
        })
    }
}

/// Puts the staged original back if a patch is dropped mid-merge.
struct RestoreOnDrop<F: Filesystem>
{
    fs: Arc<F>,
    binary: PathBuf,
    staged: PathBuf,
    armed: bool,
}

impl<F: Filesystem> Drop for RestoreOnDrop<F>
{
    fn drop(&mut self)
    {
        if !self.armed {
            return;
        }
        let Ok(handle) = Handle::try_current() else {
            error!(staged = %self.staged.display(), "Patch abandoned outside a runtime, original left staged");
            return;
        };
        warn!(binary = %self.binary.display(), "Patch abandoned mid-merge, restoring original binary");
        let fs = Arc::clone(&self.fs);
        let binary = std::mem::take(&mut self.binary);
        let staged = std::mem::take(&mut self.staged);
        handle.spawn(async move {
            if let Err(err) = fs.rename(&staged, &binary).await {
                error!(staged = %staged.display(), "Cannot restore original binary: {err}");
            }
        });
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_staging_path_appends_suffix()
    {
        assert_eq!(
            staging_path(Path::new("./lib/ruxit/somelib.so")),
            PathBuf::from("./lib/ruxit/somelib.so.old")
        );
    }

    #[test]
    fn test_merge_args_order()
    {
        let args = merge_args(
            Path::new("./lib/a.so"),
            Path::new("./lib/a.so.old"),
            Path::new("/debugsymbols/h/a.dbg"),
        );
        assert_eq!(args, ["-o", "./lib/a.so", "./lib/a.so.old", "/debugsymbols/h/a.dbg"]);
    }
}
