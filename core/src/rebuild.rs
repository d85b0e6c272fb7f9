//! Modification-time-driven rebuild decisions.

use crate::{BuildContext, util};
use anyhow::{Context as _, Result};
use log::debug;
use std::{
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
    time::SystemTime,
};

/// A possibly nested bag of dependency paths. Callers assemble one at the
/// use site instead of the engine accepting "any shape".
#[derive(Clone, Debug)]
pub enum DepTree {
    Leaf(PathBuf),
    List(Vec<DepTree>),
}

impl DepTree {
    /// An empty dependency bag.
    #[must_use]
    pub fn none() -> Self {
        DepTree::List(Vec::new())
    }

    pub fn leaves<I>(paths: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<PathBuf>,
    {
        DepTree::List(paths.into_iter().map(|path| DepTree::Leaf(path.into())).collect())
    }
}

impl From<&Path> for DepTree {
    fn from(path: &Path) -> Self {
        DepTree::Leaf(path.to_path_buf())
    }
}

impl From<PathBuf> for DepTree {
    fn from(path: PathBuf) -> Self {
        DepTree::Leaf(path)
    }
}

impl FromIterator<DepTree> for DepTree {
    fn from_iter<I: IntoIterator<Item = DepTree>>(iter: I) -> Self {
        DepTree::List(iter.into_iter().collect())
    }
}

/// Returns whether `target` is missing or strictly older than any dependency.
/// Equal mtimes count as up to date, so a build that just produced the target
/// is not redone on the immediately following invocation.
///
/// A positive decision drops the target's mtime cache entry, so that the step
/// about to produce a fresh target stats the newly written file next time.
pub fn needs_rebuild(context: &mut BuildContext, target: &Path, deps: &DepTree) -> Result<bool> {
    let Some(target_mtime) = mtime(context, target)? else {
        debug!("`{}` is missing", target.display());
        context.caches.mtime.clear_entry(target);
        return Ok(true);
    };

    if any_newer(context, deps, target_mtime)? {
        debug!("`{}` is out of date", target.display());
        context.caches.mtime.clear_entry(target);
        return Ok(true);
    }

    Ok(false)
}

fn any_newer(context: &mut BuildContext, deps: &DepTree, target_mtime: SystemTime) -> Result<bool> {
    match deps {
        DepTree::Leaf(path) => match mtime(context, path)? {
            Some(dep_mtime) => Ok(dep_mtime > target_mtime),
            // A missing dependency forces a rebuild; the toolchain then
            // reports the underlying problem.
            None => Ok(true),
        },
        DepTree::List(list) => {
            for dep in list {
                if any_newer(context, dep, target_mtime)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
    }
}

/// Stats `path` through the mtime cache. `None` means the path does not
/// exist; its absence is never cached.
pub fn mtime(context: &mut BuildContext, path: &Path) -> Result<Option<SystemTime>> {
    if let Some(&cached) = context.caches.mtime.get(path) {
        return Ok(Some(cached));
    }
    match fs::metadata(util::in_root(context.root, path)) {
        Ok(metadata) => {
            let modified = metadata.modified()?;
            context.caches.mtime.put(path.to_path_buf(), modified);
            Ok(Some(modified))
        }
        Err(error) if error.kind() == ErrorKind::NotFound => Ok(None),
        Err(error) => {
            Err(error).with_context(|| format!(r#"Failed to stat "{}""#, path.display()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{DepTree, needs_rebuild};
    use crate::{BuildContext, Unimake};
    use std::{
        fs::{self, File},
        path::Path,
        time::{Duration, SystemTime},
    };

    #[test]
    fn missing_target_needs_rebuild() {
        let tempdir = tempfile::tempdir().unwrap();
        let opts = Unimake::default();
        let mut context = BuildContext::new(&opts, tempdir.path());

        assert!(needs_rebuild(&mut context, Path::new("absent"), &DepTree::none()).unwrap());

        fs::write(tempdir.path().join("present"), "x").unwrap();
        assert!(!needs_rebuild(&mut context, Path::new("present"), &DepTree::none()).unwrap());
    }

    #[test]
    fn equal_mtimes_are_up_to_date() {
        let tempdir = tempfile::tempdir().unwrap();
        let opts = Unimake::default();
        let mut context = BuildContext::new(&opts, tempdir.path());

        let now = SystemTime::now();
        for name in ["target", "dep"] {
            let file = File::create(tempdir.path().join(name)).unwrap();
            file.set_modified(now).unwrap();
        }

        let deps = DepTree::from(Path::new("dep"));
        assert!(!needs_rebuild(&mut context, Path::new("target"), &deps).unwrap());
    }

    #[test]
    fn touching_a_dependency_forces_a_rebuild_and_drops_the_target_entry() {
        let tempdir = tempfile::tempdir().unwrap();
        let opts = Unimake::default();

        fs::write(tempdir.path().join("dep"), "x").unwrap();
        fs::write(tempdir.path().join("target"), "y").unwrap();

        let deps = DepTree::from(Path::new("dep"));
        {
            let mut context = BuildContext::new(&opts, tempdir.path());
            assert!(!needs_rebuild(&mut context, Path::new("target"), &deps).unwrap());
        }

        let future = SystemTime::now() + Duration::from_secs(10);
        File::options()
            .write(true)
            .open(tempdir.path().join("dep"))
            .unwrap()
            .set_modified(future)
            .unwrap();

        let mut context = BuildContext::new(&opts, tempdir.path());
        assert!(needs_rebuild(&mut context, Path::new("target"), &deps).unwrap());
        assert!(!context.caches.mtime.contains(Path::new("target")));
    }

    #[test]
    fn nested_dependency_bags_short_circuit() {
        let tempdir = tempfile::tempdir().unwrap();
        let opts = Unimake::default();
        let mut context = BuildContext::new(&opts, tempdir.path());

        fs::write(tempdir.path().join("target"), "x").unwrap();

        let deps = DepTree::List(vec![
            DepTree::none(),
            DepTree::leaves([Path::new("missing")]),
        ]);
        assert!(needs_rebuild(&mut context, Path::new("target"), &deps).unwrap());
    }
}
