//! Module eligibility policy.
//!
//! Which modules are worth resolving is a deployment decision, so the
//! resolver takes the policy as an injected [`ModuleFilter`]. Modules without
//! a local binary are always skipped before the policy is consulted.

use std::path::{Component, Path};

use crate::types::Module;

/// Directory names treated as monitored library locations by default.
pub const DEFAULT_MONITORED_DIRS: &[&str] = &["ruxit"];

/// Decides whether a module takes part in resolution.
///
/// Implemented for any `Fn(&Module) -> bool`, so a closure works as a policy:
///
/// ```rust
/// use debugsym_core::symbols::ModuleFilter;
/// use debugsym_core::types::Module;
///
/// let only_libc = |module: &Module| module.file_name.starts_with("libc.");
/// assert!(only_libc.is_eligible(&Module::new("libc.so.6", "/usr/lib/libc.so.6")));
/// ```
pub trait ModuleFilter: Send + Sync
{
    /// Whether `module` should be resolved.
    fn is_eligible(&self, module: &Module) -> bool;
}

impl<F> ModuleFilter for F
where
    F: Fn(&Module) -> bool + Send + Sync,
{
    fn is_eligible(&self, module: &Module) -> bool
    {
        self(module)
    }
}

/// Default policy: native shared libraries loaded from a monitored directory.
///
/// A module's runtime `file_path` qualifies when
/// - its file name ends in `.so` or a versioned `.so.N[.M...]` suffix, and
/// - one of its parent directory components equals a monitored directory
///   name (default: [`DEFAULT_MONITORED_DIRS`]).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeLibraryFilter
{
    monitored_dirs: Vec<String>,
}

impl Default for NativeLibraryFilter
{
    fn default() -> Self
    {
        Self::new(DEFAULT_MONITORED_DIRS.iter().copied())
    }
}

impl NativeLibraryFilter
{
    /// Filter accepting libraries below any of `dirs`.
    pub fn new<I, S>(dirs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            monitored_dirs: dirs.into_iter().map(Into::into).collect(),
        }
    }

    /// Monitored directory names.
    pub fn monitored_dirs(&self) -> &[String]
    {
        &self.monitored_dirs
    }

    fn in_monitored_dir(&self, path: &Path) -> bool
    {
        let Some(parent) = path.parent() else {
            return false;
        };
        parent.components().any(|component| match component {
            Component::Normal(name) => self.monitored_dirs.iter().any(|dir| name == dir.as_str()),
            _ => false,
        })
    }
}

impl ModuleFilter for NativeLibraryFilter
{
    fn is_eligible(&self, module: &Module) -> bool
    {
        let path = Path::new(&module.file_path);
        let Some(name) = path.file_name().and_then(|name| name.to_str()) else {
            return false;
        };
        is_shared_object_name(name) && self.in_monitored_dir(path)
    }
}

/// `libfoo.so`, `libfoo.so.1`, `libfoo.so.1.2.3`.
fn is_shared_object_name(name: &str) -> bool
{
    if name.ends_with(".so") && name.len() > ".so".len() {
        return true;
    }
    let Some(idx) = name.rfind(".so.") else {
        return false;
    };
    let version = &name[idx + ".so.".len()..];
    idx > 0
        && !version.is_empty()
        && version.split('.').all(|part| !part.is_empty() && part.bytes().all(|b| b.is_ascii_digit()))
}

#[cfg(test)]
mod tests
{
    use super::*;

    fn module(file_path: &str) -> Module
    {
        let name = Path::new(file_path)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Module::new(name, file_path).with_local_path(format!(".{file_path}"))
    }

    #[test]
    fn test_default_accepts_monitored_libraries()
    {
        let filter = NativeLibraryFilter::default();
        assert!(filter.is_eligible(&module("/lib/ruxit/somelib.so")));
        assert!(filter.is_eligible(&module("/opt/ruxit/agent/lib64/liboneagent.so.1.2")));
    }

    #[test]
    fn test_default_rejects_other_paths()
    {
        let filter = NativeLibraryFilter::default();
        assert!(!filter.is_eligible(&module("some/path")));
        assert!(!filter.is_eligible(&module("/usr/lib/libc.so.6")));
        assert!(!filter.is_eligible(&module("/lib/ruxit/readme.txt")));
        assert!(!filter.is_eligible(&module("/lib/ruxit/libfoo.so.x")));
        assert!(!filter.is_eligible(&module("/ruxit.so")));
    }

    #[test]
    fn test_custom_dirs()
    {
        let filter = NativeLibraryFilter::new(["agent"]);
        assert!(filter.is_eligible(&module("/opt/agent/libx.so")));
        assert!(!filter.is_eligible(&module("/lib/ruxit/somelib.so")));
    }

    #[test]
    fn test_shared_object_names()
    {
        assert!(is_shared_object_name("a.so"));
        assert!(is_shared_object_name("libssl.so.3"));
        assert!(!is_shared_object_name(".so"));
        assert!(!is_shared_object_name("libssl.so."));
        assert!(!is_shared_object_name("archive.sox"));
    }
}
