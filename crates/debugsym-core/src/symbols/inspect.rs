//! Debug-info presence checks for ELF files.
//!
//! Used to confirm that an unstrip actually produced a binary carrying DWARF,
//! and to look at what a stripped binary says about its debug file.

use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use object::{Object, ObjectSection};

use crate::error::{Result, SymbolError};

/// Debug-related facts about one object file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DebugInfoSummary
{
    /// Container format, e.g. `Elf`.
    pub format: String,
    /// Names of the `.debug_*` sections present.
    pub debug_sections: Vec<String>,
    /// Whether a full symbol table (`.symtab`) is present.
    pub has_symtab: bool,
    /// GNU build id, hex encoded.
    pub build_id: Option<String>,
    /// File name recorded in `.gnu_debuglink`.
    pub debuglink: Option<String>,
}

impl DebugInfoSummary
{
    /// Whether DWARF line/info data is present.
    pub fn has_debug_info(&self) -> bool
    {
        self.debug_sections.iter().any(|name| name == ".debug_info")
    }
}

/// Inspect the object file at `path`.
///
/// ## Errors
///
/// Returns [`SymbolError::Io`] if the file cannot be read and
/// [`SymbolError::InvalidBinary`] if it is not a supported object file.
pub fn inspect_file(path: &Path) -> Result<DebugInfoSummary>
{
    let data = fs::read(path)?;
    inspect_bytes(&data).map_err(|err| match err {
        SymbolError::InvalidBinary(reason) => SymbolError::InvalidBinary(format!("{}: {reason}", path.display())),
        other => other,
    })
}

/// Inspect an object file held in memory.
///
/// ## Errors
///
/// Returns [`SymbolError::InvalidBinary`] if `data` does not parse.
pub fn inspect_bytes(data: &[u8]) -> Result<DebugInfoSummary>
{
    let file = object::File::parse(data).map_err(|err| SymbolError::InvalidBinary(err.to_string()))?;

    let mut debug_sections: Vec<String> = file
        .sections()
        .filter_map(|section| section.name().ok().map(str::to_string))
        .filter(|name| name.starts_with(".debug_") || name.starts_with(".zdebug_"))
        .collect();
    debug_sections.sort();
    debug_sections.dedup();

    let build_id = file.build_id().ok().flatten().map(|bytes| {
        bytes.iter().fold(String::with_capacity(bytes.len() * 2), |mut hex, byte| {
            let _ = write!(hex, "{byte:02x}");
            hex
        })
    });
    let debuglink = file
        .gnu_debuglink()
        .ok()
        .flatten()
        .map(|(name, _crc)| String::from_utf8_lossy(name).into_owned());

    Ok(DebugInfoSummary {
        format: format!("{:?}", file.format()),
        debug_sections,
        has_symtab: file.section_by_name(".symtab").is_some(),
        build_id,
        debuglink,
    })
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_rejects_non_object_data()
    {
        assert!(matches!(
            inspect_bytes(b"definitely not an ELF file"),
            Err(SymbolError::InvalidBinary(_))
        ));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_inspects_own_test_binary()
    {
        let exe = std::env::current_exe().unwrap();
        let summary = inspect_file(&exe).unwrap();
        assert_eq!(summary.format, "Elf");
    }

    #[test]
    fn test_missing_file_is_io_error()
    {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            inspect_file(&dir.path().join("missing")),
            Err(SymbolError::Io(_))
        ));
    }
}
