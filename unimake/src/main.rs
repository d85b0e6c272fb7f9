#![warn(clippy::expect_used)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::panic)]

use clap::Parser;
use log::debug;
use std::{env::args, process::exit};
use unimake_core::{Unimake, cli, exec::CommandFailed, unimake};
use unimake_runners::Unity;

fn main() {
    env_logger::init();

    let opts: Unimake = cli::Opts::parse_from(args()).into();

    if let Err(error) = unimake(&opts, &Unity) {
        debug!("{error:?}");
        eprintln!("Error: {error}");
        // A failed toolchain invocation aborts the build with the child's
        // own exit status.
        let code = error
            .downcast_ref::<CommandFailed>()
            .and_then(|failure| failure.code)
            .unwrap_or(1);
        exit(code);
    }
}
