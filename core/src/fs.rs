//! File operations shared by the build engine and the runner generator.

use crate::{BuildContext, util};
use anyhow::{Context as _, Result};
use log::debug;
use std::{
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
};

/// Byte limit applied when slurping C sources and headers.
pub const SOURCE_FILE_SIZE_LIMIT: u64 = 8 * 1024 * 1024;

/// The error returned when a file exceeds the read limit.
#[derive(Debug)]
pub struct FileTooBig {
    pub path: PathBuf,
    pub limit: u64,
}

impl std::fmt::Display for FileTooBig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "`{}` exceeds the {}-byte read limit",
            self.path.display(),
            self.limit
        )
    }
}

impl std::error::Error for FileTooBig {}

/// Reads a file in full, failing with [`FileTooBig`] beyond `limit` bytes.
pub fn read_entire_file(path: &Path, limit: u64) -> Result<Vec<u8>> {
    check_size(path, limit)?;
    fs::read(path).with_context(|| format!(r#"Failed to read "{}""#, path.display()))
}

fn check_size(path: &Path, limit: u64) -> Result<()> {
    let metadata = fs::metadata(path)
        .with_context(|| format!(r#"Failed to stat "{}""#, path.display()))?;
    if metadata.len() > limit {
        return Err(FileTooBig {
            path: path.to_path_buf(),
            limit,
        }
        .into());
    }
    Ok(())
}

/// Creates or truncates `path` (and any missing parent directories) and
/// writes `data`.
pub fn write_entire_file(context: &mut BuildContext, path: &Path, data: &[u8]) -> Result<()> {
    create_parent_directory(context, path)?;
    let absolute = util::in_root(context.root, path);
    fs::write(absolute, data).with_context(|| format!(r#"Failed to write "{}""#, path.display()))
}

/// Writes `data` only if it differs from the current contents of `path`
/// (a missing file counts as different). Keeps mtimes stable across
/// regenerations. Returns whether the file was written.
pub fn write_entire_file_if_changed(
    context: &mut BuildContext,
    path: &Path,
    data: &[u8],
    limit: u64,
) -> Result<bool> {
    let absolute = util::in_root(context.root, path);
    let existing = match fs::metadata(&absolute) {
        Ok(metadata) => {
            if metadata.len() > limit {
                return Err(FileTooBig {
                    path: path.to_path_buf(),
                    limit,
                }
                .into());
            }
            Some(
                fs::read(&absolute)
                    .with_context(|| format!(r#"Failed to read "{}""#, path.display()))?,
            )
        }
        Err(error) if error.kind() == ErrorKind::NotFound => None,
        Err(error) => {
            return Err(error)
                .with_context(|| format!(r#"Failed to stat "{}""#, path.display()));
        }
    };

    if existing.as_deref() == Some(data) {
        debug!("`{}` is unchanged", path.display());
        return Ok(false);
    }

    write_entire_file(context, path, data)?;
    Ok(true)
}

/// Creates `path` and any missing ancestors. Consults the `dir_exists` cache
/// to short-circuit repeated calls; an already existing directory is success.
pub fn create_directory(context: &mut BuildContext, path: &Path) -> Result<()> {
    if context.caches.dir_exists.contains(path) {
        return Ok(());
    }
    let absolute = util::in_root(context.root, path);
    fs::create_dir_all(absolute)
        .with_context(|| format!(r#"Failed to create "{}""#, path.display()))?;
    for ancestor in path.ancestors() {
        if ancestor.as_os_str().is_empty() {
            break;
        }
        context.caches.dir_exists.put(ancestor.to_path_buf(), ());
    }
    Ok(())
}

/// Creates the parent directory of `path` (and any missing ancestors).
pub fn create_parent_directory(context: &mut BuildContext, path: &Path) -> Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => create_directory(context, parent),
        _ => Ok(()),
    }
}

/// Removes `path` recursively. A missing path is success.
pub fn delete_directory(path: &Path) -> Result<()> {
    match fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(error) if error.kind() == ErrorKind::NotFound => Ok(()),
        Err(error) => {
            Err(error).with_context(|| format!(r#"Failed to remove "{}""#, path.display()))
        }
    }
}

/// Normalizes a path for use as a build-tree suffix by repeatedly stripping
/// leading `./` and trailing `/` (and their backslash forms on Windows).
#[must_use]
pub fn shorten_path(path: &Path) -> PathBuf {
    let mut shortened = path.to_string_lossy().into_owned();
    loop {
        let before = shortened.len();
        for prefix in CURRENT_DIR_PREFIXES {
            if let Some(rest) = shortened.strip_prefix(prefix) {
                shortened = rest.to_owned();
            }
        }
        for suffix in SEPARATOR_SUFFIXES {
            if let Some(rest) = shortened.strip_suffix(suffix) {
                shortened = rest.to_owned();
            }
        }
        if shortened.len() == before {
            return PathBuf::from(shortened);
        }
    }
}

#[cfg(not(windows))]
const CURRENT_DIR_PREFIXES: &[&str] = &["./"];
#[cfg(not(windows))]
const SEPARATOR_SUFFIXES: &[&str] = &["/"];

#[cfg(windows)]
const CURRENT_DIR_PREFIXES: &[&str] = &["./", ".\\"];
#[cfg(windows)]
const SEPARATOR_SUFFIXES: &[&str] = &["/", "\\"];
