//! Scripted command runner for unit tests.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use hostnet_common::{HostnetResult, SystemPaths};

use crate::context::HostContext;
use crate::exec::{CommandOutput, CommandRunner, display_argv};

/// Paths with fixed binary locations, independent of the environment.
pub(crate) fn test_paths(root: &Path) -> SystemPaths {
    SystemPaths {
        ip: "/usr/sbin/ip".into(),
        iptables: "/usr/sbin/iptables".into(),
        ..SystemPaths::with_root(root)
    }
}

/// Answers command lines from a table; unknown commands print nothing.
#[derive(Clone, Default)]
pub(crate) struct ScriptedRunner {
    responses: Arc<Mutex<HashMap<String, CommandOutput>>>,
    calls: Arc<Mutex<Vec<String>>>,
}

impl ScriptedRunner {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Answer `command` (space-joined argv) with `output`.
    pub(crate) fn respond(self, command: &str, output: CommandOutput) -> Self {
        self.responses
            .lock()
            .unwrap()
            .insert(command.to_string(), output);
        self
    }

    /// Command lines run so far, in order.
    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn context(&self) -> HostContext {
        self.context_with(test_paths(Path::new("/nonexistent-hostnet-root")))
    }

    pub(crate) fn context_with(&self, paths: SystemPaths) -> HostContext {
        HostContext::new(Arc::new(self.clone()), paths)
    }
}

impl CommandRunner for ScriptedRunner {
    fn run(&self, argv: &[String]) -> HostnetResult<CommandOutput> {
        let command = display_argv(argv);
        self.calls.lock().unwrap().push(command.clone());
        Ok(self
            .responses
            .lock()
            .unwrap()
            .get(&command)
            .cloned()
            .unwrap_or_else(|| CommandOutput::ok("")))
    }
}
