//! External command execution behind a swappable runner.
//!
//! Every piece of host-local state the driver needs (kernel mappings, image
//! watchers, the short hostname) and the cluster catalog itself are reached by
//! shelling out to the Ceph tools. The [`CommandRunner`] trait is the seam that
//! lets tests answer those invocations with canned output.

use std::ffi::OsString;
use std::process::Command;

use shell_escape::unix::escape;
use thiserror::Error;
use tracing::debug;

/// Result of running an external command.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CommandOutput {
    /// Exit code reported by the process, if available.
    pub code: Option<i32>,
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
}

impl CommandOutput {
    /// Returns `true` when the exit code equals zero.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self.code, Some(0))
    }

    /// Builds a successful output carrying `stdout`.
    #[must_use]
    pub fn success(stdout: impl Into<String>) -> Self {
        Self {
            code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// Builds a failed output with the given exit code and `stderr`.
    #[must_use]
    pub fn failure(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }
}

/// Errors raised while invoking external tools.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum CommandError {
    /// Raised when a command cannot be spawned.
    #[error("failed to spawn {program}: {message}")]
    Spawn {
        /// Command that failed to start.
        program: String,
        /// Operating system error string.
        message: String,
    },
    /// Raised when a command completes with a non-zero exit code.
    #[error("`{command_line}` exited with status {status_text}: {stderr}")]
    CommandFailure {
        /// Shell-escaped rendering of the failed invocation.
        command_line: String,
        /// Exit status as reported by the OS.
        status: Option<i32>,
        /// Human readable representation of the exit status.
        status_text: String,
        /// Stderr captured from the process.
        stderr: String,
    },
}

/// Raised when a tool's output cannot be interpreted safely.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
#[error("unexpected `{command}` output: {message}")]
pub struct ParseError {
    /// Command whose output was rejected.
    pub command: String,
    /// Description of what was wrong.
    pub message: String,
}

impl ParseError {
    /// Creates a parse error for `command`.
    #[must_use]
    pub fn new(command: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            message: message.into(),
        }
    }
}

/// Abstraction over command execution to support fakes in tests.
pub trait CommandRunner {
    /// Runs `program` with the given arguments, capturing stdout and stderr.
    ///
    /// # Errors
    ///
    /// Returns [`CommandError::Spawn`] if the command cannot be started.
    fn run(&self, program: &str, args: &[OsString]) -> Result<CommandOutput, CommandError>;
}

impl<R: CommandRunner + ?Sized> CommandRunner for &R {
    fn run(&self, program: &str, args: &[OsString]) -> Result<CommandOutput, CommandError> {
        (**self).run(program, args)
    }
}

/// Real command runner that shells out to the host operating system.
#[derive(Clone, Debug, Default)]
pub struct ProcessCommandRunner;

impl CommandRunner for ProcessCommandRunner {
    fn run(&self, program: &str, args: &[OsString]) -> Result<CommandOutput, CommandError> {
        let output = Command::new(program)
            .args(args)
            .output()
            .map_err(|err| CommandError::Spawn {
                program: program.to_owned(),
                message: err.to_string(),
            })?;

        Ok(CommandOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Converts a list of string-like values into an argument vector.
#[must_use]
pub fn argv<I, S>(parts: I) -> Vec<OsString>
where
    I: IntoIterator<Item = S>,
    S: Into<OsString>,
{
    parts.into_iter().map(Into::into).collect()
}

/// Renders `program` and `args` as a single shell-escaped line for messages.
#[must_use]
pub fn render_command_line(program: &str, args: &[OsString]) -> String {
    let mut line = escape(program.into()).into_owned();
    for arg in args {
        line.push(' ');
        let lossy = arg.to_string_lossy();
        line.push_str(escape(lossy).as_ref());
    }
    line
}

/// Runs a command and returns its output only when it exits successfully.
///
/// # Errors
///
/// Returns [`CommandError::Spawn`] when the process cannot start and
/// [`CommandError::CommandFailure`] when it exits non-zero or without a code.
pub fn run_checked<R>(
    runner: &R,
    program: &str,
    args: &[OsString],
) -> Result<CommandOutput, CommandError>
where
    R: CommandRunner + ?Sized,
{
    debug!(command = %render_command_line(program, args), "running external command");
    let output = runner.run(program, args)?;
    if output.is_success() {
        return Ok(output);
    }

    let status_text = output
        .code
        .map_or_else(|| String::from("unknown"), |code| code.to_string());
    Err(CommandError::CommandFailure {
        command_line: render_command_line(program, args),
        status: output.code,
        status_text,
        stderr: output.stderr.trim().to_owned(),
    })
}
