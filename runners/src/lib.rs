//! Unity test-runner generation.
//!
//! For each test file `<dir>/<stem>.c`, a companion
//! `<dir>/runner/<stem>_runner.c` registers the file's test groups and cases
//! with the Unity fixture framework. A single aggregate file then dispatches
//! every discovered group. Files are only rewritten when their content
//! changes, so an unchanged test tree leaves the build tree's mtimes alone.

#![warn(clippy::expect_used)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::panic)]

use anyhow::{Result, anyhow};
use indexmap::IndexSet;
use log::debug;
use std::{
    fmt::Write as _,
    path::{Path, PathBuf},
};
use unimake_core::{
    BuildContext, RunnerGenerator, WarnFlags, Warning,
    fs::{SOURCE_FILE_SIZE_LIMIT, read_entire_file, write_entire_file_if_changed},
    util, warn,
};

mod scanner;
use scanner::{BANNER, scan_test_file};

/// The test groups discovered so far, in declaration order. Insertion order
/// defines the aggregate runner's dispatch order; re-declaring a group is
/// idempotent.
pub type GroupSet = IndexSet<String>;

/// The Unity fixture framework's runner generator.
pub struct Unity;

impl RunnerGenerator for Unity {
    fn generate(
        &self,
        context: &mut BuildContext<'_>,
        test_files: &[PathBuf],
        all_runner: &Path,
    ) -> Result<Vec<PathBuf>> {
        generate_runners(context, test_files, all_runner)
    }
}

/// Emits a runner next to each test file, then the aggregate runner at
/// `all_runner`. Returns every generated path, the aggregate last.
pub fn generate_runners(
    context: &mut BuildContext,
    test_files: &[PathBuf],
    all_runner: &Path,
) -> Result<Vec<PathBuf>> {
    let mut groups = GroupSet::new();
    let mut generated = Vec::with_capacity(test_files.len() + 1);

    for test_file in test_files {
        let buf = read_entire_file(
            &util::in_root(context.root, test_file),
            SOURCE_FILE_SIZE_LIMIT,
        )?;
        let output = scan_test_file(&buf, &mut groups);
        if !output.declared_any_group {
            warn(
                &context.light(),
                Warning::TestsNotFound,
                &format!("no test groups found in `{}`", test_file.display()),
                WarnFlags::empty(),
            )?;
        }

        let runner = runner_path(test_file)?;
        write_runner(context, &runner, output.content.as_bytes())?;
        generated.push(runner);
    }

    let aggregate = aggregate_runner(&groups);
    write_runner(context, all_runner, aggregate.as_bytes())?;
    generated.push(all_runner.to_path_buf());

    Ok(generated)
}

/// `<dir>/<stem><ext>` -> `<dir>/runner/<stem>_runner<ext>`.
fn runner_path(test_file: &Path) -> Result<PathBuf> {
    let stem = test_file
        .file_stem()
        .and_then(|stem| stem.to_str())
        .ok_or_else(|| anyhow!("`{}` has no usable file stem", test_file.display()))?;
    let file_name = match test_file.extension().and_then(|ext| ext.to_str()) {
        Some(extension) => format!("{stem}_runner.{extension}"),
        None => format!("{stem}_runner"),
    };
    let dir = test_file.parent().unwrap_or_else(|| Path::new(""));
    Ok(dir.join("runner").join(file_name))
}

fn aggregate_runner(groups: &GroupSet) -> String {
    let mut content = BANNER.to_owned();
    content.push_str("#include \"unity_fixture.h\"\n");
    content.push_str("\nvoid run_all_tests(void) {\n");
    for group in groups {
        #[allow(clippy::unwrap_used)]
        writeln!(content, "    RUN_TEST_GROUP({group});").unwrap();
    }
    content.push_str("}\n");
    content
}

fn write_runner(context: &mut BuildContext, path: &Path, content: &[u8]) -> Result<()> {
    if write_entire_file_if_changed(context, path, content, SOURCE_FILE_SIZE_LIMIT)? {
        (context.println)(&format!("Generated `{}`", path.display()));
    } else {
        debug!("`{}` is up to date", path.display());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::runner_path;
    use std::path::Path;

    #[test]
    fn runner_paths_are_siblings_under_runner() {
        assert_eq!(
            runner_path(Path::new("tests/test_add.c")).unwrap(),
            Path::new("tests/runner/test_add_runner.c")
        );
        assert_eq!(
            runner_path(Path::new("test_add.c")).unwrap(),
            Path::new("runner/test_add_runner.c")
        );
    }
}
