//! External command execution seam used by the CLI-backed provider clients.

use std::ffi::OsString;
use std::future::Future;
use std::pin::Pin;

use thiserror::Error;
use tokio::process::Command;

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

    /// Human readable representation of the exit status.
    #[must_use]
    pub fn status_text(&self) -> String {
        self.code
            .map_or_else(|| String::from("unknown"), |code| code.to_string())
    }
}

/// Raised when a command cannot be started at all.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
#[error("failed to spawn {program}: {message}")]
pub struct SpawnError {
    /// Command that failed to start.
    pub program: String,
    /// Operating system error string.
    pub message: String,
}

/// Future returned by [`CommandRunner::run`].
pub type CommandFuture<'a> =
    Pin<Box<dyn Future<Output = Result<CommandOutput, SpawnError>> + Send + 'a>>;

/// Abstraction over command execution to support fakes in tests.
pub trait CommandRunner: Send + Sync {
    /// Runs `program` with the given arguments and extra environment,
    /// capturing stdout and stderr.
    fn run<'a>(
        &'a self,
        program: &'a str,
        args: &'a [OsString],
        envs: &'a [(String, String)],
    ) -> CommandFuture<'a>;
}

/// Real command runner that shells out to the host operating system.
///
/// Children are killed when the returned future is dropped, so wrapping a
/// call in a timeout never leaves a stray process behind.
#[derive(Clone, Debug, Default)]
pub struct ProcessCommandRunner;

impl CommandRunner for ProcessCommandRunner {
    fn run<'a>(
        &'a self,
        program: &'a str,
        args: &'a [OsString],
        envs: &'a [(String, String)],
    ) -> CommandFuture<'a> {
        Box::pin(async move {
            let output = Command::new(program)
                .args(args)
                .envs(envs.iter().map(|(key, value)| (key.as_str(), value.as_str())))
                .kill_on_drop(true)
                .output()
                .await
                .map_err(|err| SpawnError {
                    program: program.to_owned(),
                    message: err.to_string(),
                })?;

            Ok(CommandOutput {
                code: output.status.code(),
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            })
        })
    }
}
