//! This module is semver exempt and its contents could change at any time.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Resolves `path` against `root` unless it is already absolute.
#[must_use]
pub fn in_root(root: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}

/// Strip the prefix `base` from `path`.
///
/// # Errors
///
/// If `base` is not a prefix of `path`, an error is returned.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use unimake_core::util::strip_prefix;
///
/// let path = Path::new("/a/b/c");
/// let base = Path::new("/a");
/// let stripped = strip_prefix(path, base).unwrap();
/// assert_eq!(stripped, Path::new("b/c"));
/// ```
pub fn strip_prefix<'a>(path: &'a Path, base: &Path) -> Result<&'a Path> {
    path.strip_prefix(base).with_context(|| {
        format!(
            "\
`base` is not a prefix of `path`
base: `{}`
path: `{}`",
            base.display(),
            path.display()
        )
    })
}
