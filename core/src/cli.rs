use crate::{Target, Unimake, config::Arch, warn::Warning};
use clap::{ArgAction, Parser, crate_version};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[clap(version = crate_version!())]
#[remain::sorted]
pub struct Opts {
    #[clap(
        long,
        action = ArgAction::Append,
        hide_possible_values = true,
        value_name = "WARNING",
        help = "Silence <WARNING>; `--allow all` silences all warnings"
    )]
    allow: Vec<Warning>,
    #[clap(long, value_enum, default_value_t, help = "Architecture to build for")]
    arch: Arch,
    #[clap(
        long,
        value_name = "DIR",
        help = "Build output directory; the default is <root>/build/<arch>"
    )]
    build_dir: Option<PathBuf>,
    #[clap(
        long,
        action = ArgAction::Append,
        hide_possible_values = true,
        value_name = "WARNING",
        help = "Treat <WARNING> as an error; `--deny all` treats all warnings as errors"
    )]
    deny: Vec<Warning>,
    #[clap(long, help = "Do not output to the console")]
    quiet: bool,
    #[clap(long, help = "Root directory of the project to build")]
    root: Option<String>,
    #[clap(
        long,
        help = "Maximum number of seconds to run any checked command; 60 is the default, 0 means \
                no timeout"
    )]
    timeout: Option<u64>,
    #[clap(long, help = "Show cache statistics at the end of the run")]
    verbose: bool,
    #[clap(value_name = "TARGETS", help = "Targets to run (default: build)")]
    ztargets: Vec<Target>,
}

impl From<Opts> for Unimake {
    fn from(opts: Opts) -> Self {
        let Opts {
            allow,
            arch,
            build_dir,
            deny,
            quiet,
            root,
            timeout,
            verbose,
            ztargets,
        } = opts;
        let root = root.map(PathBuf::from);
        let targets = ztargets;
        Unimake {
            allow,
            arch,
            build_dir,
            deny,
            quiet,
            root,
            timeout,
            verbose,
            targets,
        }
    }
}
