//! Content digests used as cache keys.

use std::fmt;
use std::str::FromStr;

use crate::error::SymbolError;

/// Hex-encoded content digest of a binary.
///
/// The digest becomes a directory name in the debug-symbol cache, so it must
/// be a single, non-empty path component. Construction through
/// [`ContentDigest::new`] or [`FromStr`] enforces that; the value itself is
/// opaque and never interpreted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContentDigest(String);

impl ContentDigest
{
    /// Validate and wrap a digest string.
    ///
    /// ## Errors
    ///
    /// Returns [`SymbolError::InvalidDigest`] for empty values, `.`/`..`, or
    /// values containing a path separator or NUL byte.
    pub fn new(value: impl Into<String>) -> Result<Self, SymbolError>
    {
        let value = value.into();
        let invalid = value.is_empty()
            || value == "."
            || value == ".."
            || value.chars().any(|c| c == '/' || c == '\\' || c == '\0');
        if invalid {
            return Err(SymbolError::InvalidDigest(value));
        }
        Ok(Self(value))
    }

    /// Wrap a hex string produced by the hasher, which is always valid.
    pub(crate) fn from_hex(hex: String) -> Self
    {
        Self(hex)
    }

    /// Digest as a string slice.
    pub fn as_str(&self) -> &str
    {
        &self.0
    }
}

impl FromStr for ContentDigest
{
    type Err = SymbolError;

    fn from_str(s: &str) -> Result<Self, Self::Err>
    {
        Self::new(s)
    }
}

impl AsRef<str> for ContentDigest
{
    fn as_ref(&self) -> &str
    {
        &self.0
    }
}

impl fmt::Display for ContentDigest
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        f.write_str(&self.0)
    }
}
