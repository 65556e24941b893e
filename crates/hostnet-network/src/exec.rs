//! External command execution.
//!
//! Every component reaches the host through a [`CommandRunner`]. The system
//! implementation spawns real processes; tests substitute a scripted one.

use std::path::Path;
use std::process::Command;

use hostnet_common::{HostnetError, HostnetResult};

/// Captured result of one external command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code, `None` when the process was killed by a signal.
    pub status: Option<i32>,
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
}

impl CommandOutput {
    /// A successful run that printed `stdout`.
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            status: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// A failed run with exit code `code` and the given error text.
    pub fn failed(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            status: Some(code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    /// Whether the process exited with status 0.
    #[must_use]
    pub fn success(&self) -> bool {
        self.status == Some(0)
    }

    /// Standard output followed by standard error.
    #[must_use]
    pub fn combined(&self) -> String {
        let mut out = self.stdout.clone();
        out.push_str(&self.stderr);
        out
    }

    /// Short description of why the command failed.
    #[must_use]
    pub fn failure_message(&self) -> String {
        let text = self.combined();
        let text = text.trim();
        if !text.is_empty() {
            return text.to_string();
        }
        match self.status {
            Some(code) => format!("exit status {code}"),
            None => "terminated by signal".to_string(),
        }
    }
}

/// Runs external programs on behalf of the hostnet components.
///
/// Privilege elevation, if any, is the implementation's concern.
pub trait CommandRunner: Send + Sync {
    /// Run `argv` (program first) to completion and capture its output.
    ///
    /// # Errors
    ///
    /// Returns an error only when the program could not be executed at all.
    /// A non-zero exit is reported through [`CommandOutput::status`].
    fn run(&self, argv: &[String]) -> HostnetResult<CommandOutput>;
}

/// Runs commands as child processes of the current process.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, argv: &[String]) -> HostnetResult<CommandOutput> {
        let (program, args) = argv.split_first().ok_or_else(|| HostnetError::Config {
            message: "empty command line".to_string(),
        })?;

        let output = Command::new(program)
            .args(args)
            .output()
            .map_err(|source| HostnetError::Spawn {
                program: program.clone(),
                source,
            })?;

        Ok(CommandOutput {
            status: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Builder for `ip` command lines, optionally scoped to a namespace.
#[derive(Debug, Clone)]
pub struct IpCommand {
    argv: Vec<String>,
}

impl IpCommand {
    /// Start a command line for the `ip` binary at `ip`.
    pub fn new(ip: &Path) -> Self {
        Self {
            argv: vec![ip.display().to_string()],
        }
    }

    /// Scope the command to `namespace`; the empty name means the default one.
    #[must_use]
    pub fn netns(mut self, namespace: &str) -> Self {
        if !namespace.is_empty() {
            self.argv.push("-netns".to_string());
            self.argv.push(namespace.to_string());
        }
        self
    }

    /// Append arguments.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.argv.extend(args.into_iter().map(|a| a.as_ref().to_string()));
        self
    }

    /// Finish the command line.
    #[must_use]
    pub fn into_argv(self) -> Vec<String> {
        self.argv
    }
}

/// Render a command line the way a shell script would contain it.
#[must_use]
pub fn display_argv(argv: &[String]) -> String {
    argv.join(" ")
}
