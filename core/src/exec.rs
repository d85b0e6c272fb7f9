//! Child-process plumbing: an append-only argv builder and synchronous
//! spawn helpers with an optional watchdog timeout.

use crate::{LightContext, Outcome};
use anyhow::{Result, anyhow, ensure};
use log::debug;
use std::{
    io::Read,
    path::Path,
    process::{Command, Stdio},
    time::Duration,
};
use subprocess::{Exec, ExitStatus, Redirection};

/// An append-only argv builder. The first argument is the program.
#[derive(Clone, Debug, Default)]
pub struct CmdLine {
    args: Vec<String>,
}

impl CmdLine {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds the argv from a configured toolchain prefix.
    #[must_use]
    pub fn from_prefix(prefix: &[String]) -> Self {
        Self {
            args: prefix.to_vec(),
        }
    }

    pub fn arg(&mut self, arg: impl AsRef<str>) -> &mut Self {
        self.args.push(arg.as_ref().to_owned());
        self
    }

    pub fn arg_path(&mut self, path: &Path) -> &mut Self {
        self.args.push(path.to_string_lossy().into_owned());
        self
    }

    pub fn args<I>(&mut self, args: I) -> &mut Self
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        for arg in args {
            self.arg(arg);
        }
        self
    }

    #[must_use]
    pub fn as_slice(&self) -> &[String] {
        &self.args
    }
}

impl std::fmt::Display for CmdLine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.args.join(" "))
    }
}

/// The error produced when a spawned command exits unsuccessfully. The
/// top-level handler maps `code` onto the build's own exit status.
#[derive(Debug)]
pub struct CommandFailed {
    pub program: String,
    pub code: Option<i32>,
}

impl CommandFailed {
    #[must_use]
    pub fn new(cmd: &CmdLine, status: ExitStatus) -> Self {
        let program = cmd
            .as_slice()
            .first()
            .cloned()
            .unwrap_or_default();
        let code = match status {
            ExitStatus::Exited(code) => i32::try_from(code).ok(),
            ExitStatus::Other(code) => Some(code),
            ExitStatus::Signaled(_) | ExitStatus::Undetermined => None,
        };
        Self { program, code }
    }
}

impl std::fmt::Display for CommandFailed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.code {
            Some(code) => write!(f, "`{}` failed with exit code {}", self.program, code),
            None => write!(f, "`{}` was terminated by a signal", self.program),
        }
    }
}

impl std::error::Error for CommandFailed {}

/// What a piped command produced, together with how it ended.
pub struct Captured {
    pub stdout: Vec<u8>,
    pub status: ExitStatus,
    pub outcome: Outcome,
}

/// Prints and spawns the command, waits for it, and treats an unsuccessful
/// exit as a [`CommandFailed`] error.
pub fn execute_sync(context: &LightContext, cmd: &CmdLine) -> Result<()> {
    (context.println)(&cmd.to_string());
    debug!("{cmd:?}");

    let status = exec_from_cmdline(context, cmd)?.join()?;
    if status.success() {
        Ok(())
    } else {
        Err(CommandFailed::new(cmd, status).into())
    }
}

/// Like [`execute_sync`], but pipes stdout into memory and reports the
/// termination status instead of failing.
pub fn execute_sync_get_output(context: &LightContext, cmd: &CmdLine) -> Result<Captured> {
    (context.println)(&cmd.to_string());
    debug!("{cmd:?}");

    let mut popen = exec_from_cmdline(context, cmd)?
        .stdout(Redirection::Pipe)
        .popen()?;
    let stdout = read_piped_stdout(&mut popen)?;
    let status = popen.wait()?;
    let outcome = if status.success() {
        Outcome::Passed
    } else {
        Outcome::Failed
    };
    Ok(Captured {
        stdout,
        status,
        outcome,
    })
}

/// Like [`execute_sync_get_output`], but kills the command once `timeout`
/// elapses. A killed command yields [`Outcome::TimedOut`]; whatever it wrote
/// before the kill is still returned.
pub fn execute_sync_get_output_timeout(
    context: &LightContext,
    cmd: &CmdLine,
    timeout: Duration,
) -> Result<Captured> {
    (context.println)(&cmd.to_string());
    debug!("{cmd:?}");

    let mut popen = exec_from_cmdline(context, cmd)?
        .stdout(Redirection::Pipe)
        .popen()?;

    let (status, outcome) = if let Some(status) = popen.wait_timeout(timeout)? {
        let outcome = if status.success() {
            Outcome::Passed
        } else {
            Outcome::Failed
        };
        (status, outcome)
    } else {
        let pid = popen.pid().ok_or_else(|| anyhow!("Failed to get pid"))?;
        kill(pid)?;
        let status = popen.wait()?;
        (status, Outcome::TimedOut)
    };

    let stdout = read_piped_stdout(&mut popen)?;
    Ok(Captured {
        stdout,
        status,
        outcome,
    })
}

fn exec_from_cmdline(context: &LightContext, cmd: &CmdLine) -> Result<Exec> {
    ensure!(!cmd.as_slice().is_empty(), "empty command line");
    let slice = cmd.as_slice();
    Ok(Exec::cmd(&slice[0]).args(&slice[1..]).cwd(context.root))
}

fn read_piped_stdout(popen: &mut subprocess::Popen) -> Result<Vec<u8>> {
    let mut stdout_file = popen
        .stdout
        .take()
        .ok_or_else(|| anyhow!("Failed to get stdout"))?;
    let mut buf = Vec::new();
    let _: usize = stdout_file.read_to_end(&mut buf)?;
    Ok(buf)
}

fn kill(pid: u32) -> Result<()> {
    // The process may have already exited; ignore the kill's own status.
    let _status: std::process::ExitStatus = kill_command()
        .arg(pid.to_string())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()?;
    Ok(())
}

#[cfg(not(windows))]
fn kill_command() -> Command {
    Command::new("kill")
}

#[cfg(windows)]
fn kill_command() -> Command {
    let mut command = Command::new("taskkill");
    command.args(["/f", "/pid"]);
    command
}

#[cfg(all(test, unix))]
mod tests {
    use super::{
        CmdLine, CommandFailed, execute_sync, execute_sync_get_output,
        execute_sync_get_output_timeout,
    };
    use crate::{BuildContext, Outcome, Unimake};
    use std::{path::Path, time::Duration};

    fn cmd(args: &[&str]) -> CmdLine {
        let mut cmd = CmdLine::new();
        cmd.args(args.iter().copied());
        cmd
    }

    #[test]
    fn success_and_failure() {
        let opts = Unimake::default();
        let context = BuildContext::new(&opts, Path::new("/"));

        assert!(execute_sync(&context.light(), &cmd(&["true"])).is_ok());

        let error = execute_sync(&context.light(), &cmd(&["false"])).unwrap_err();
        let failure = error.downcast_ref::<CommandFailed>().unwrap();
        assert_eq!(failure.code, Some(1));
    }

    #[test]
    fn captures_stdout() {
        let opts = Unimake::default();
        let context = BuildContext::new(&opts, Path::new("/"));

        let captured = execute_sync_get_output(&context.light(), &cmd(&["echo", "hi"])).unwrap();
        assert_eq!(captured.stdout, b"hi\n");
        assert_eq!(captured.outcome, Outcome::Passed);
    }

    #[test]
    fn watchdog_kills_a_hung_command() {
        let opts = Unimake::default();
        let context = BuildContext::new(&opts, Path::new("/"));

        let captured = execute_sync_get_output_timeout(
            &context.light(),
            &cmd(&["sh", "-c", "echo before; exec sleep 10"]),
            Duration::from_millis(200),
        )
        .unwrap();
        assert_eq!(captured.outcome, Outcome::TimedOut);
        assert_eq!(captured.stdout, b"before\n");
    }

    #[test]
    fn display_joins_arguments() {
        assert_eq!(cmd(&["cc", "-c", "a.c"]).to_string(), "cc -c a.c");
    }
}
