// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! External command execution.
//!
//! Dotman never links against a version control library. Instead, it shells
//! out to whatever `git` and `gh` binaries the user has installed. Every call
//! goes through the [`CommandRunner`] trait, so the logic built on top of it
//! can be driven by a scripted fake instead of a real binary.

use std::{
    ffi::OsString,
    fmt::{Display, Formatter, Result as FmtResult},
    path::Path,
    process::Command,
};
use tracing::{debug, instrument};

/// Captured result of an external command.
#[derive(Debug, Default, PartialEq, Eq, Clone)]
pub struct CommandOutput {
    /// Exit code of the process, `None` if it was killed by a signal.
    pub code: Option<i32>,

    pub stdout: String,

    pub stderr: String,
}

impl CommandOutput {
    /// Construct successful output with given stdout.
    pub fn success(stdout: impl Into<String>) -> Self {
        Self {
            code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// Construct failed output with given exit code and stderr.
    pub fn failure(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.code == Some(0)
    }

    /// Combine stdout and stderr into one message.
    pub fn message(&self) -> String {
        let mut message = String::new();

        if !self.stdout.is_empty() {
            message.push_str(format!("stdout: {}", self.stdout).as_str());
        }

        if !self.stderr.is_empty() {
            if !message.is_empty() && !message.ends_with('\n') {
                message.push('\n');
            }
            message.push_str(format!("stderr: {}", self.stderr).as_str());
        }

        // INVARIANT: Chomp trailing newlines.
        message
            .strip_suffix("\r\n")
            .or(message.strip_suffix('\n'))
            .map(ToString::to_string)
            .unwrap_or(message)
    }
}

impl Display for CommandOutput {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        match self.code {
            Some(code) => write!(fmt, "exit code {code}"),
            None => fmt.write_str("terminated by signal"),
        }
    }
}

/// Narrow interface to run external commands.
pub trait CommandRunner {
    /// Run `program` with `args`, optionally inside `cwd`, and capture output.
    ///
    /// A non-zero exit code is __not__ an error here. Only failure to spawn
    /// the process at all is.
    fn run(
        &self,
        program: &str,
        args: &[OsString],
        cwd: Option<&Path>,
    ) -> std::io::Result<CommandOutput>;
}

/// Run commands through the operating system.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    #[instrument(skip(self, args, cwd), level = "debug")]
    fn run(
        &self,
        program: &str,
        args: &[OsString],
        cwd: Option<&Path>,
    ) -> std::io::Result<CommandOutput> {
        let line = args.iter().map(|arg| arg.to_string_lossy()).collect::<Vec<_>>();
        debug!("{program} {}", line.join(" "));
        let mut command = Command::new(program);
        command.args(args);
        if let Some(cwd) = cwd {
            command.current_dir(cwd);
        }

        let output = command.output()?;
        Ok(CommandOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(output.stdout.as_slice()).into_owned(),
            stderr: String::from_utf8_lossy(output.stderr.as_slice()).into_owned(),
        })
    }
}

impl<R> CommandRunner for &R
where
    R: CommandRunner + ?Sized,
{
    fn run(
        &self,
        program: &str,
        args: &[OsString],
        cwd: Option<&Path>,
    ) -> std::io::Result<CommandOutput> {
        (**self).run(program, args, cwd)
    }
}
