use crate::{
    Outcome,
    build::{build_executable, build_firmware, build_library, build_source},
    cache::Caches,
    config::{self, Arch, BuildConfig},
    exec::{CmdLine, CommandFailed, execute_sync_get_output, execute_sync_get_output_timeout},
    fs::delete_directory,
    note,
    rebuild::DepTree,
    util,
    warn::{Flags as WarnFlags, Warning, warn},
};
use ansi_term::Style;
use anyhow::{Context as _, Result, anyhow, ensure};
use heck::ToKebabCase;
use std::{
    env::current_dir,
    ffi::OsStr,
    io::{IsTerminal, stdout},
    path::{Path, PathBuf},
    time::Duration,
};
use walkdir::WalkDir;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// What an invocation should do.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
#[remain::sorted]
pub enum Target {
    /// Build the project library and the test executable.
    Build,
    /// Build, then run the test executable under the watchdog.
    Check,
    /// Remove the build tree and reset the caches.
    Clean,
    /// Generate the per-file and aggregate test runners.
    Runners,
}

impl std::fmt::Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", format!("{self:?}").to_kebab_case())
    }
}

/// The resolved command-line options.
#[derive(Clone, Default)]
pub struct Unimake {
    pub allow: Vec<Warning>,
    pub arch: Arch,
    pub build_dir: Option<PathBuf>,
    pub deny: Vec<Warning>,
    pub quiet: bool,
    pub root: Option<PathBuf>,
    pub timeout: Option<u64>,
    pub verbose: bool,
    pub targets: Vec<Target>,
}

pub struct LightContext<'a> {
    pub opts: &'a Unimake,
    pub root: &'a Path,
    pub println: &'a dyn Fn(&dyn AsRef<str>),
}

/// Options, project root, console printer, and the process-lifetime caches,
/// threaded explicitly through every engine operation. Tests construct a
/// fresh one per scenario.
pub struct BuildContext<'a> {
    pub opts: &'a Unimake,
    pub root: &'a Path,
    pub println: &'a dyn Fn(&dyn AsRef<str>),
    pub caches: Caches,
}

fn noop_println(_: &dyn AsRef<str>) {}

impl<'a> BuildContext<'a> {
    /// A context that prints nothing.
    #[must_use]
    pub fn new(opts: &'a Unimake, root: &'a Path) -> Self {
        Self {
            opts,
            root,
            println: &noop_println,
            caches: Caches::default(),
        }
    }

    #[must_use]
    pub fn light(&self) -> LightContext<'a> {
        LightContext {
            opts: self.opts,
            root: self.root,
            println: self.println,
        }
    }
}

/// Implemented by the test-runner generator; the binary hands an
/// implementation into [`unimake`] so the engine can regenerate runners
/// before compiling them.
pub trait RunnerGenerator {
    /// Emits a runner next to each test file plus the aggregate runner at
    /// `all_runner`, and returns the paths of every generated file.
    fn generate(
        &self,
        context: &mut BuildContext<'_>,
        test_files: &[PathBuf],
        all_runner: &Path,
    ) -> Result<Vec<PathBuf>>;
}

/// Unimake's main entrypoint.
pub fn unimake(opts: &Unimake, generator: &dyn RunnerGenerator) -> Result<()> {
    let opts = opts.clone();

    process_options(&opts)?;

    let root = opts
        .root
        .as_ref()
        .map_or_else(current_dir, std::fs::canonicalize)?;

    let println = |msg: &dyn AsRef<str>| {
        println!("{}", msg.as_ref());
    };

    let mut context = BuildContext::new(&opts, &root);
    if !opts.quiet {
        context.println = &println;
    }

    let config_toml = config::Toml::read(&context.light(), &root)?;
    let build_config = BuildConfig::new(opts.arch, opts.build_dir.clone(), &config_toml);

    let targets = if opts.targets.is_empty() {
        vec![Target::Build]
    } else {
        opts.targets.clone()
    };

    for target in targets {
        match target {
            Target::Build => {
                let _: Option<PathBuf> =
                    build(&mut context, &build_config, &config_toml, generator)?;
            }
            Target::Check => check(&mut context, &build_config, &config_toml, generator)?,
            Target::Clean => clean(&mut context, &build_config)?,
            Target::Runners => {
                let generated = generate(&mut context, &config_toml, generator)?;
                if generated.is_empty() {
                    note(&context.light(), "no test files found");
                }
            }
        }
    }

    if opts.verbose {
        print_cache_stats(&context);
    }

    Ok(())
}

fn process_options(opts: &Unimake) -> Result<()> {
    ensure!(
        !(opts.quiet && opts.verbose),
        "--quiet and --verbose are incompatible"
    );
    Ok(())
}

fn generate(
    context: &mut BuildContext,
    toml: &config::Toml,
    generator: &dyn RunnerGenerator,
) -> Result<Vec<PathBuf>> {
    let test_files = discover_c_files(context.root, &toml.test_files)?;
    if test_files.is_empty() {
        return Ok(Vec::new());
    }
    let all_runner = all_runner_path(context.root, toml)
        .ok_or_else(|| anyhow!("cannot derive the aggregate runner path"))?;
    generator.generate(context, &test_files, &all_runner)
}

fn build(
    context: &mut BuildContext,
    build_config: &BuildConfig,
    toml: &config::Toml,
    generator: &dyn RunnerGenerator,
) -> Result<Option<PathBuf>> {
    let test_files = discover_c_files(context.root, &toml.test_files)?;
    let generated = if test_files.is_empty() {
        Vec::new()
    } else {
        let all_runner = all_runner_path(context.root, toml)
            .ok_or_else(|| anyhow!("cannot derive the aggregate runner path"))?;
        generator.generate(context, &test_files, &all_runner)?
    };

    let sources = discover_c_files(context.root, &toml.sources)?;
    let name = project_name(context.root, toml);

    let library = if sources.is_empty() {
        None
    } else {
        Some(build_library(
            context,
            build_config,
            &name,
            &sources,
            &DepTree::none(),
        )?)
    };

    if test_files.is_empty() {
        return Ok(None);
    }

    let mut objs = Vec::new();
    for src in test_files.iter().chain(&generated) {
        objs.push(build_source(context, build_config, src, &DepTree::none())?);
    }
    objs.extend(library);

    let exe = build_executable(
        context,
        build_config,
        &format!("{name}_tests"),
        &objs,
        &DepTree::none(),
    )?;

    if build_config.arch == Arch::Avr {
        let _: PathBuf = build_firmware(context, build_config, &exe)?;
    }

    Ok(Some(exe))
}

fn check(
    context: &mut BuildContext,
    build_config: &BuildConfig,
    toml: &config::Toml,
    generator: &dyn RunnerGenerator,
) -> Result<()> {
    ensure!(
        build_config.arch == Arch::Host,
        "`check` is only supported for `--arch host`"
    );

    let Some(exe) = build(context, build_config, toml, generator)? else {
        note(&context.light(), "no tests to run");
        return Ok(());
    };

    let mut cmd = CmdLine::new();
    cmd.arg_path(&exe).arg("-v");

    let captured = match timeout(context.opts) {
        Some(duration) => execute_sync_get_output_timeout(&context.light(), &cmd, duration)?,
        None => execute_sync_get_output(&context.light(), &cmd)?,
    };

    let stdout_text = String::from_utf8_lossy(&captured.stdout);
    let trimmed = stdout_text.trim_end();
    if !trimmed.is_empty() {
        (context.println)(&trimmed.to_owned());
    }

    (context.println)(&format!(
        "`{}` {}",
        exe.display(),
        if stdout().is_terminal() {
            captured.outcome.style().bold()
        } else {
            Style::default()
        }
        .paint(captured.outcome.to_string())
    ));

    match captured.outcome {
        Outcome::Passed => Ok(()),
        Outcome::TimedOut => warn(
            &context.light(),
            Warning::CommandTimedOut,
            &format!("`{}` timed out", exe.display()),
            WarnFlags::empty(),
        ),
        Outcome::Failed => Err(CommandFailed::new(&cmd, captured.status).into()),
    }
}

fn clean(context: &mut BuildContext, build_config: &BuildConfig) -> Result<()> {
    delete_directory(&util::in_root(context.root, &build_config.build_dir))?;
    context.caches.clear_all();
    note(
        &context.light(),
        &format!("Removed `{}`", build_config.build_dir.display()),
    );
    Ok(())
}

fn timeout(opts: &Unimake) -> Option<Duration> {
    match opts.timeout {
        None => Some(DEFAULT_TIMEOUT),
        Some(0) => None,
        Some(secs) => Some(Duration::from_secs(secs)),
    }
}

fn discover_c_files(root: &Path, entries: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in entries {
        let absolute = util::in_root(root, entry);
        if absolute.is_dir() {
            for result in WalkDir::new(&absolute).sort_by_file_name() {
                let dir_entry = result
                    .with_context(|| format!(r#"Failed to walk "{}""#, entry.display()))?;
                if !dir_entry.file_type().is_file() {
                    continue;
                }
                let path = dir_entry.path();
                if path.extension().and_then(OsStr::to_str) != Some("c")
                    || is_generated_runner(path)
                {
                    continue;
                }
                let stripped = util::strip_prefix(path, &absolute)?;
                files.push(entry.join(stripped));
            }
        } else {
            files.push(entry.clone());
        }
    }
    Ok(files)
}

fn is_generated_runner(path: &Path) -> bool {
    path.components()
        .any(|component| component.as_os_str() == "runner")
        || path
            .file_name()
            .and_then(OsStr::to_str)
            .is_some_and(|name| name.ends_with("_runner.c"))
}

fn all_runner_path(root: &Path, toml: &config::Toml) -> Option<PathBuf> {
    if let Some(path) = &toml.all_runner {
        return Some(path.clone());
    }
    let entry = toml.test_files.first()?;
    let dir = if util::in_root(root, entry).is_dir() {
        entry.as_path()
    } else {
        entry.parent().unwrap_or_else(|| Path::new(""))
    };
    Some(dir.join("runner").join("all_tests_runner.c"))
}

fn project_name(root: &Path, toml: &config::Toml) -> String {
    toml.name.clone().unwrap_or_else(|| {
        root.file_name().map_or_else(
            || "project".to_owned(),
            |name| name.to_string_lossy().into_owned(),
        )
    })
}

fn print_cache_stats(context: &BuildContext) {
    for (name, stats) in [
        ("dir-exists", context.caches.dir_exists.stats()),
        ("mtime", context.caches.mtime.stats()),
        ("included-deps", context.caches.included_deps.stats()),
    ] {
        (context.println)(&format!(
            "cache `{name}`: {} puts, {} hits, {} misses, {} clears",
            stats.puts, stats.hits, stats.misses, stats.clears
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::{Target, Unimake, timeout};
    use std::time::Duration;

    #[test]
    fn target_display_is_kebab_case() {
        assert_eq!(Target::Runners.to_string(), "runners");
    }

    #[test]
    fn timeout_defaults_to_sixty_seconds_and_zero_disables() {
        let mut opts = Unimake::default();
        assert_eq!(timeout(&opts), Some(Duration::from_secs(60)));
        opts.timeout = Some(0);
        assert_eq!(timeout(&opts), None);
        opts.timeout = Some(5);
        assert_eq!(timeout(&opts), Some(Duration::from_secs(5)));
    }
}
