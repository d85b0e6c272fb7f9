//! The compile/archive/link drivers.
//!
//! Each driver derives its output path inside the build tree, asks the
//! rebuild decider whether the step may be skipped, and otherwise dispatches
//! the configured toolchain as a child process.

use crate::{
    BuildContext, Outcome,
    config::BuildConfig,
    exec::{CmdLine, CommandFailed, execute_sync, execute_sync_get_output},
    fs::{create_parent_directory, shorten_path},
    includes::included_dependencies,
    rebuild::{DepTree, needs_rebuild},
};
use anyhow::{Result, bail};
use std::{
    ffi::OsStr,
    path::{Path, PathBuf},
};

/// Compiles `src` into an object file, returning the object path. The step
/// is skipped when the object is newer than the source, `extra_deps`, and
/// every header the source transitively includes.
pub fn build_source(
    context: &mut BuildContext,
    config: &BuildConfig,
    src: &Path,
    extra_deps: &DepTree,
) -> Result<PathBuf> {
    if src.extension().and_then(OsStr::to_str) != Some("c") {
        bail!("building `{}` is not implemented", src.display());
    }

    let obj = with_extension_appended(
        &config.build_dir.join("obj").join(shorten_path(src)),
        &config.obj_extension,
    );

    let cache_key = src.to_string_lossy().into_owned();
    let headers = included_dependencies(context, config, src, &cache_key)?;

    let deps = DepTree::List(vec![
        DepTree::from(src),
        extra_deps.clone(),
        DepTree::leaves(headers.iter().cloned()),
    ]);

    if needs_rebuild(context, &obj, &deps)? {
        create_parent_directory(context, &obj)?;
        let mut cmd = CmdLine::from_prefix(&config.toolchain.cc);
        cmd.arg("-c").arg("-o").arg_path(&obj).arg_path(src);
        cmd.args(&config.cflags);
        cmd.args(&config.include_dirs);
        execute_sync(&context.light(), &cmd)?;
    }

    Ok(obj)
}

/// Compiles `srcs` and archives the objects into a static library, returning
/// the archive path.
///
/// The decision is made in two phases, before any object is rebuilt: first
/// the archive is checked against the sources and `extra_deps`, then against
/// each source's scanned headers. Checking up front keeps the freshly
/// written archive's mtime out of the cache until the decision is final.
pub fn build_library(
    context: &mut BuildContext,
    config: &BuildConfig,
    lib_name: &str,
    srcs: &[PathBuf],
    extra_deps: &DepTree,
) -> Result<PathBuf> {
    let archive = with_extension_appended(
        &config.build_dir.join("lib").join(shorten_path(Path::new(lib_name))),
        &config.lib_extension,
    );

    let direct = DepTree::List(vec![
        DepTree::leaves(srcs.iter().cloned()),
        extra_deps.clone(),
    ]);
    let mut rebuild = needs_rebuild(context, &archive, &direct)?;

    if !rebuild {
        for src in srcs {
            let cache_key = src.to_string_lossy().into_owned();
            let headers = included_dependencies(context, config, src, &cache_key)?;
            if needs_rebuild(context, &archive, &DepTree::leaves(headers.iter().cloned()))? {
                rebuild = true;
                break;
            }
        }
    }

    if rebuild {
        let mut objs = Vec::with_capacity(srcs.len());
        for src in srcs {
            objs.push(build_source(context, config, src, extra_deps)?);
        }

        create_parent_directory(context, &archive)?;
        let mut cmd = CmdLine::from_prefix(&config.toolchain.ar);
        cmd.arg("-rcs").arg_path(&archive);
        for obj in &objs {
            cmd.arg_path(obj);
        }
        execute_sync(&context.light(), &cmd)?;
    }

    Ok(archive)
}

/// Links `objs` into an executable, returning its path.
pub fn build_executable(
    context: &mut BuildContext,
    config: &BuildConfig,
    exe_name: &str,
    objs: &[PathBuf],
    extra_deps: &DepTree,
) -> Result<PathBuf> {
    let exe = with_extension_appended(
        &config.build_dir.join("bin").join(shorten_path(Path::new(exe_name))),
        &config.exec_extension,
    );

    let deps = DepTree::List(vec![
        DepTree::leaves(objs.iter().cloned()),
        extra_deps.clone(),
    ]);

    if needs_rebuild(context, &exe, &deps)? {
        create_parent_directory(context, &exe)?;
        let mut cmd = CmdLine::from_prefix(&config.toolchain.ld);
        cmd.arg("-o").arg_path(&exe);
        cmd.args(&config.ldflags);
        for obj in objs {
            cmd.arg_path(obj);
        }
        execute_sync(&context.light(), &cmd)?;
    }

    Ok(exe)
}

/// Converts a linked AVR executable into an Intel-hex image and prints the
/// section sizes. The objcopy step is skipped when the image is up to date.
pub fn build_firmware(
    context: &mut BuildContext,
    config: &BuildConfig,
    exe: &Path,
) -> Result<PathBuf> {
    let hex = exe.with_extension("hex");

    if needs_rebuild(context, &hex, &DepTree::from(exe))? {
        let mut cmd = CmdLine::from_prefix(&config.toolchain.objcopy);
        cmd.arg("-O").arg("ihex").arg_path(exe).arg_path(&hex);
        execute_sync(&context.light(), &cmd)?;
    }

    let mut cmd = CmdLine::from_prefix(&config.toolchain.size);
    cmd.arg_path(exe);
    let captured = execute_sync_get_output(&context.light(), &cmd)?;
    if captured.outcome != Outcome::Passed {
        return Err(CommandFailed::new(&cmd, captured.status).into());
    }
    let text = String::from_utf8_lossy(&captured.stdout);
    let trimmed = text.trim_end();
    if !trimmed.is_empty() {
        (context.println)(&trimmed.to_owned());
    }

    Ok(hex)
}

fn with_extension_appended(path: &Path, extension: &str) -> PathBuf {
    let mut os_string = path.to_path_buf().into_os_string();
    os_string.push(extension);
    PathBuf::from(os_string)
}

#[cfg(test)]
mod tests {
    use super::{build_source, with_extension_appended};
    use crate::{
        BuildContext, Unimake,
        config::{Arch, BuildConfig, Toml},
        rebuild::DepTree,
    };
    use std::path::Path;

    #[test]
    fn object_paths_append_the_extension() {
        assert_eq!(
            with_extension_appended(Path::new("build/host/obj/src/add.c"), ".o"),
            Path::new("build/host/obj/src/add.c.o")
        );
        assert_eq!(
            with_extension_appended(Path::new("build/host/bin/calc_tests"), ""),
            Path::new("build/host/bin/calc_tests")
        );
    }

    #[test]
    fn non_c_sources_are_rejected() {
        let tempdir = tempfile::tempdir().unwrap();
        let opts = Unimake::default();
        let mut context = BuildContext::new(&opts, tempdir.path());
        let config = BuildConfig::new(Arch::Host, None, &Toml::default());

        let error = build_source(
            &mut context,
            &config,
            Path::new("src/add.cpp"),
            &DepTree::none(),
        )
        .unwrap_err();
        assert!(error.to_string().contains("not implemented"));
    }
}
