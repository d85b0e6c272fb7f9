//! Lazy header-dependency scanning.
//!
//! The scanner discovers the transitive include graph of a source file by
//! tokenizing it, without emulating the preprocessor: every textual
//! `#include` is recorded, whether or not a surrounding conditional would
//! compile it.

use crate::{
    BuildContext,
    config::BuildConfig,
    fs::{SOURCE_FILE_SIZE_LIMIT, read_entire_file},
    tokenizer::{DIRECTIVE_WORDS, Tokenizer, directive_word},
    util,
};
use anyhow::{Context as _, Result};
use bstr::ByteSlice;
use indexmap::IndexSet;
use log::debug;
use std::{
    fs::File,
    io::ErrorKind,
    path::{Path, PathBuf},
    rc::Rc,
};

/// Returns the ordered set of resolved header paths that `file_path`
/// transitively includes, probing `config.include_dirs` in order. The result
/// is interned in the context's `included_deps` cache under `cache_key`.
///
/// Unresolved includes are not errors; they are memoized with an empty
/// dependency list so repeated scans do not retry them.
pub fn included_dependencies(
    context: &mut BuildContext,
    config: &BuildConfig,
    file_path: &Path,
    cache_key: &str,
) -> Result<Rc<Vec<PathBuf>>> {
    if let Some(deps) = context.caches.included_deps.get(cache_key) {
        return Ok(deps.clone());
    }

    let buf = read_entire_file(
        &util::in_root(context.root, file_path),
        SOURCE_FILE_SIZE_LIMIT,
    )?;
    let raw_includes = scan_raw_includes(&buf);

    // Tentative entry: an include cycle bottoms out on this instead of
    // recursing forever.
    context
        .caches
        .included_deps
        .put(cache_key.to_owned(), Rc::new(Vec::new()));

    let mut resolved = IndexSet::new();
    for raw in &raw_includes {
        let Some(path) = resolve_include(context, config, raw)? else {
            debug!("could not resolve include `{raw}`");
            if !context.caches.included_deps.contains(raw.as_str()) {
                context
                    .caches
                    .included_deps
                    .put(raw.clone(), Rc::new(Vec::new()));
            }
            continue;
        };
        resolved.insert(path.clone());
        let key = path.to_string_lossy().into_owned();
        let transitive = included_dependencies(context, config, &path, &key)?;
        for dep in transitive.iter() {
            resolved.insert(dep.clone());
        }
    }

    let deps = Rc::new(resolved.into_iter().collect::<Vec<_>>());
    context
        .caches
        .included_deps
        .put(cache_key.to_owned(), deps.clone());
    Ok(deps)
}

/// Collects the raw include forms (`add.h`, `x.h`) named by `buf`, in order.
fn scan_raw_includes(buf: &[u8]) -> Vec<String> {
    let mut raw_includes = Vec::new();
    let mut tokenizer = Tokenizer::new(buf);
    while let Some(token) = tokenizer.next_token() {
        let Some(word) = directive_word(token) else {
            continue;
        };
        if word == b"include" {
            let line = tokenizer.rest_of_line();
            let raw = line.trim_with(|c| c.is_whitespace() || matches!(c, '"' | '<' | '>'));
            if !raw.is_empty() {
                raw_includes.push(String::from_utf8_lossy(raw).into_owned());
            }
        } else if DIRECTIVE_WORDS.contains(&word) {
            let _: &[u8] = tokenizer.rest_of_directive();
        }
    }
    raw_includes
}

/// Probes the include search path for `raw`, returning the first directory
/// whose candidate opens as a file. `NotFound` on a candidate is expected;
/// other I/O errors propagate.
fn resolve_include(
    context: &BuildContext,
    config: &BuildConfig,
    raw: &str,
) -> Result<Option<PathBuf>> {
    for flag in &config.include_dirs {
        let dir = flag.strip_prefix("-I").unwrap_or(flag);
        let candidate = Path::new(dir).join(raw);
        match File::open(util::in_root(context.root, &candidate)) {
            Ok(file) => {
                if file.metadata()?.is_file() {
                    return Ok(Some(candidate));
                }
            }
            Err(error) if error.kind() == ErrorKind::NotFound => {}
            Err(error) => {
                return Err(error)
                    .with_context(|| format!(r#"Failed to open "{}""#, candidate.display()));
            }
        }
    }
    Ok(None)
}
