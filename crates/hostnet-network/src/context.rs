//! Shared handle given to every hostnet component.

use std::fmt;
use std::sync::Arc;

use hostnet_common::{HostnetError, HostnetResult, SystemPaths};
use tracing::Span;

use crate::exec::{CommandOutput, CommandRunner, IpCommand, SystemRunner, display_argv};

/// Command runner, path configuration and tracing span for a component.
///
/// Components log inside [`HostContext::span`], so callers choose where
/// their events land instead of relying on a process-wide logger.
#[derive(Clone)]
pub struct HostContext {
    runner: Arc<dyn CommandRunner>,
    paths: SystemPaths,
    span: Span,
}

impl HostContext {
    /// Create a context around an explicit runner and path set.
    pub fn new(runner: Arc<dyn CommandRunner>, paths: SystemPaths) -> Self {
        Self {
            runner,
            paths,
            span: tracing::info_span!("hostnet"),
        }
    }

    /// A context that runs real commands against the default paths.
    #[must_use]
    pub fn system() -> Self {
        Self::new(Arc::new(SystemRunner), SystemPaths::default())
    }

    /// Replace the span component events are recorded in.
    #[must_use]
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Configured paths.
    #[must_use]
    pub const fn paths(&self) -> &SystemPaths {
        &self.paths
    }

    /// Span component events are recorded in.
    #[must_use]
    pub const fn span(&self) -> &Span {
        &self.span
    }

    /// Start an `ip` command line scoped to `namespace`.
    #[must_use]
    pub fn ip(&self, namespace: &str) -> IpCommand {
        IpCommand::new(&self.paths.ip).netns(namespace)
    }

    /// Run a command and capture its output.
    ///
    /// # Errors
    ///
    /// Returns an error if the program could not be started.
    pub fn run(&self, argv: &[String]) -> HostnetResult<CommandOutput> {
        tracing::trace!(command = %display_argv(argv), "Running command");
        self.runner.run(argv)
    }

    /// Run a command and return its standard output, failing on non-zero exit.
    ///
    /// # Errors
    ///
    /// Returns [`HostnetError::Command`] if the command exits unsuccessfully.
    pub fn check_output(&self, argv: &[String]) -> HostnetResult<String> {
        let output = self.run(argv)?;
        if !output.success() {
            return Err(HostnetError::Command {
                program: display_argv(argv),
                message: output.failure_message(),
            });
        }
        Ok(output.stdout)
    }
}

impl fmt::Debug for HostContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostContext")
            .field("paths", &self.paths)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedRunner;

    #[test]
    fn check_output_fails_on_exit_status() {
        let runner = ScriptedRunner::new().respond(
            "/usr/sbin/ip netns list",
            CommandOutput::failed(1, "permission denied"),
        );
        let ctx = runner.context();
        let argv = ctx.ip("").args(["netns", "list"]).into_argv();

        let err = ctx.check_output(&argv).unwrap_err();
        assert!(err.to_string().contains("permission denied"));
    }

    #[test]
    fn check_output_returns_stdout() {
        let runner =
            ScriptedRunner::new().respond("/usr/sbin/ip netns list", CommandOutput::ok("blue\n"));
        let ctx = runner.context();
        let argv = ctx.ip("").args(["netns", "list"]).into_argv();

        assert_eq!(ctx.check_output(&argv).unwrap(), "blue\n");
    }
}
