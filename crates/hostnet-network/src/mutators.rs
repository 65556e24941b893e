//! Static route, policy rule and firewall changes.
//!
//! The add operations forward caller-supplied arguments to `ip route add`,
//! `ip rule add` or `iptables`. Any output from the command is treated as a
//! failure, since these commands are silent on success.

use std::fmt;
use std::io::Write;

use hostnet_common::HostnetResult;

use crate::context::HostContext;
use crate::exec::display_argv;
use crate::parse;

/// Outcome of a pass-through command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandStatus {
    /// `0` on success, `1` on failure.
    pub code: u8,
    /// Output captured from a failed command; empty on success.
    pub message: String,
}

impl CommandStatus {
    /// Successful status.
    #[must_use]
    pub const fn ok() -> Self {
        Self {
            code: 0,
            message: String::new(),
        }
    }

    /// Failed status carrying the command's output.
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            code: 1,
            message: message.into(),
        }
    }

    /// Whether the command succeeded.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.code == 0
    }
}

impl fmt::Display for CommandStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_success() {
            write!(f, "ok")
        } else {
            write!(f, "failed: {}", self.message.trim())
        }
    }
}

/// Applies and removes routes, policy rules and firewall rules.
#[derive(Debug, Clone)]
pub struct NetMutator {
    ctx: HostContext,
}

impl NetMutator {
    /// Create a mutator.
    #[must_use]
    pub const fn new(ctx: HostContext) -> Self {
        Self { ctx }
    }

    /// `ip route add <args>`.
    ///
    /// On success the command line is appended to `record_to`.
    ///
    /// # Errors
    ///
    /// Returns an error if `ip` cannot be run or the record cannot be written.
    pub fn add_static_route(
        &self,
        args: &[String],
        record_to: Option<&mut dyn Write>,
    ) -> HostnetResult<CommandStatus> {
        let argv = self.ctx.ip("").args(["route", "add"]).args(args).into_argv();
        self.pass_through("ip route add", &argv, record_to)
    }

    /// `ip rule add <args>`.
    ///
    /// On success the command line is appended to `record_to`.
    ///
    /// # Errors
    ///
    /// Returns an error if `ip` cannot be run or the record cannot be written.
    pub fn add_static_rule(
        &self,
        args: &[String],
        record_to: Option<&mut dyn Write>,
    ) -> HostnetResult<CommandStatus> {
        let argv = self.ctx.ip("").args(["rule", "add"]).args(args).into_argv();
        self.pass_through("ip rule add", &argv, record_to)
    }

    /// `iptables <args>`.
    ///
    /// On success the command line is appended to `record_to`.
    ///
    /// # Errors
    ///
    /// Returns an error if `iptables` cannot be run or the record cannot be
    /// written.
    pub fn add_firewall_rule(
        &self,
        args: &[String],
        record_to: Option<&mut dyn Write>,
    ) -> HostnetResult<CommandStatus> {
        let argv = self.iptables(args);
        self.pass_through("firewall rule add", &argv, record_to)
    }

    /// `iptables <args>` for rule removal; nothing is recorded.
    ///
    /// # Errors
    ///
    /// Returns an error if `iptables` cannot be run.
    pub fn remove_firewall_rule(&self, args: &[String]) -> HostnetResult<CommandStatus> {
        let argv = self.iptables(args);
        self.pass_through("firewall rule removal", &argv, None)
    }

    /// Delete every route bound to `device`; returns how many were deleted.
    ///
    /// # Errors
    ///
    /// Returns an error only if `ip` cannot be run.
    pub fn remove_static_routes(&self, device: &str) -> HostnetResult<usize> {
        let _span = self.ctx.span().enter();
        tracing::debug!(device, "Looking for routes");

        let list = self
            .ctx
            .ip("")
            .args(["route", "show", "dev", device])
            .into_argv();
        let mut removed = 0;
        for line in self.list_lines(&list)? {
            let argv = self
                .ctx
                .ip("")
                .args(["route", "del"])
                .args(parse::route_delete_args(&line))
                .into_argv();
            if self.delete(&argv, &line)? {
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Delete every policy rule that looks up `table`; returns how many were deleted.
    ///
    /// # Errors
    ///
    /// Returns an error only if `ip` cannot be run.
    pub fn remove_static_rules(&self, table: &str) -> HostnetResult<usize> {
        let _span = self.ctx.span().enter();
        tracing::debug!(table, "Looking for rules");

        let list = self
            .ctx
            .ip("")
            .args(["rule", "show", "lookup", table])
            .into_argv();
        let mut removed = 0;
        for line in self.list_lines(&list)? {
            let Some(rule) = parse::rule_line(&line) else {
                tracing::debug!(line, "Unexpected rule line, skipping");
                continue;
            };
            let argv = self
                .ctx
                .ip("")
                .args(["rule", "del"])
                .args(&rule.body)
                .into_argv();
            if self.delete(&argv, &line)? {
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Delete every policy rule mentioning `address`, by priority.
    ///
    /// # Errors
    ///
    /// Returns an error only if `ip` cannot be run.
    pub fn remove_ip_rules(&self, address: &str) -> HostnetResult<usize> {
        let _span = self.ctx.span().enter();

        let list = self.ctx.ip("").args(["rule", "list"]).into_argv();
        let priorities: Vec<u32> = self
            .list_lines(&list)?
            .iter()
            .filter(|line| line.split_whitespace().any(|word| word == address))
            .filter_map(|line| parse::rule_line(line))
            .map(|rule| rule.priority)
            .collect();
        tracing::debug!(address, ?priorities, "Rules to delete");

        let mut removed = 0;
        for priority in priorities {
            let priority = priority.to_string();
            let argv = self
                .ctx
                .ip("")
                .args(["rule", "del", "pref", priority.as_str()])
                .into_argv();
            if self.delete(&argv, &priority)? {
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Remove `address` from `device`, optionally inside `namespace`.
    ///
    /// # Errors
    ///
    /// Returns [`HostnetError::Command`](hostnet_common::HostnetError::Command)
    /// if the address cannot be removed.
    pub fn remove_ip_address(
        &self,
        device: &str,
        address: &str,
        namespace: Option<&str>,
    ) -> HostnetResult<()> {
        let _span = self.ctx.span().enter();

        let argv = self
            .ctx
            .ip(namespace.unwrap_or_default())
            .args(["address", "delete", address, "dev", device])
            .into_argv();
        self.ctx.check_output(&argv)?;
        tracing::debug!(device, address, "Address removed");
        Ok(())
    }

    fn iptables(&self, args: &[String]) -> Vec<String> {
        std::iter::once(self.ctx.paths().iptables.display().to_string())
            .chain(args.iter().cloned())
            .collect()
    }

    fn pass_through(
        &self,
        what: &str,
        argv: &[String],
        record_to: Option<&mut dyn Write>,
    ) -> HostnetResult<CommandStatus> {
        let _span = self.ctx.span().enter();
        tracing::debug!(command = %display_argv(argv), "Applying {what}");

        let output = self.ctx.run(argv)?;
        let captured = output.combined();
        if !output.success() || !captured.trim().is_empty() {
            tracing::warn!(output = %captured.trim(), "{what} failed");
            let message = if captured.trim().is_empty() {
                output.failure_message()
            } else {
                captured
            };
            return Ok(CommandStatus::failed(message));
        }

        if let Some(sink) = record_to {
            writeln!(sink, "{}", display_argv(argv))?;
        }
        Ok(CommandStatus::ok())
    }

    /// Non-empty lines of a listing; a failing listing means nothing found.
    fn list_lines(&self, argv: &[String]) -> HostnetResult<Vec<String>> {
        let output = self.ctx.run(argv)?;
        if !output.success() {
            tracing::debug!(error = %output.failure_message(), "Listing failed, nothing to remove");
            return Ok(Vec::new());
        }
        Ok(output
            .stdout
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(str::to_string)
            .collect())
    }

    /// Run one deletion; failures are logged and reported as `false`.
    fn delete(&self, argv: &[String], what: &str) -> HostnetResult<bool> {
        let output = self.ctx.run(argv)?;
        let captured = output.combined();
        if output.success() && captured.trim().is_empty() {
            return Ok(true);
        }
        tracing::warn!(
            target_line = what,
            error = %output.failure_message(),
            "Removal failed"
        );
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::CommandOutput;
    use crate::testing::ScriptedRunner;
    use hostnet_common::HostnetError;

    fn args(text: &str) -> Vec<String> {
        text.split_whitespace().map(str::to_string).collect()
    }

    #[test]
    fn route_add_records_on_success() {
        let runner = ScriptedRunner::new();
        let mutator = NetMutator::new(runner.context());
        let mut script = Vec::new();

        let status = mutator
            .add_static_route(&args("10.0.1.0/24 via 10.0.0.1 table t1"), Some(&mut script))
            .unwrap();

        assert!(status.is_success());
        assert_eq!(
            String::from_utf8(script).unwrap(),
            "/usr/sbin/ip route add 10.0.1.0/24 via 10.0.0.1 table t1\n"
        );
    }

    #[test]
    fn output_means_failure_and_nothing_recorded() {
        let runner = ScriptedRunner::new().respond(
            "/usr/sbin/ip rule add from 10.0.0.2 lookup t1",
            CommandOutput::failed(2, "RTNETLINK answers: File exists\n"),
        );
        let mutator = NetMutator::new(runner.context());
        let mut script = Vec::new();

        let status = mutator
            .add_static_rule(&args("from 10.0.0.2 lookup t1"), Some(&mut script))
            .unwrap();

        assert_eq!(status.code, 1);
        assert_eq!(status.message, "RTNETLINK answers: File exists\n");
        assert!(script.is_empty());
    }

    #[test]
    fn chatty_success_is_failure() {
        let runner = ScriptedRunner::new().respond(
            "/usr/sbin/iptables -A INPUT -s 10.0.0.2 -j ACCEPT",
            CommandOutput::ok("Warning: iptables-legacy tables present\n"),
        );
        let status = NetMutator::new(runner.context())
            .add_firewall_rule(&args("-A INPUT -s 10.0.0.2 -j ACCEPT"), None)
            .unwrap();
        assert!(!status.is_success());
        assert_eq!(
            status.to_string(),
            "failed: Warning: iptables-legacy tables present"
        );
    }

    #[test]
    fn firewall_removal() {
        let runner = ScriptedRunner::new();
        let status = NetMutator::new(runner.context())
            .remove_firewall_rule(&args("-D INPUT -s 10.0.0.2 -j ACCEPT"))
            .unwrap();
        assert!(status.is_success());
        assert_eq!(
            runner.calls(),
            vec!["/usr/sbin/iptables -D INPUT -s 10.0.0.2 -j ACCEPT"]
        );
    }

    #[test_log::test]
    fn routes_removed_line_by_line() {
        let runner = ScriptedRunner::new()
            .respond(
                "/usr/sbin/ip route show dev ens4",
                CommandOutput::ok(
                    "default via 10.0.1.1 table t1 \n10.0.1.0/24 proto kernel scope link src 10.0.1.5 \n",
                ),
            )
            .respond(
                "/usr/sbin/ip route del default via 10.0.1.1 table t1",
                CommandOutput::failed(2, "RTNETLINK answers: No such process"),
            );
        let removed = NetMutator::new(runner.context())
            .remove_static_routes("ens4")
            .unwrap();

        assert_eq!(removed, 1);
        assert_eq!(
            runner.calls(),
            vec![
                "/usr/sbin/ip route show dev ens4",
                "/usr/sbin/ip route del default via 10.0.1.1 table t1",
                "/usr/sbin/ip route del 10.0.1.0/24 proto kernel scope link src 10.0.1.5",
            ]
        );
    }

    #[test]
    fn rules_removed_without_detached_marker() {
        let runner = ScriptedRunner::new().respond(
            "/usr/sbin/ip rule show lookup ens4",
            CommandOutput::ok(
                "32765:\tfrom 10.0.1.5 lookup ens4 [detached] \n32766:\tfrom all iif ens4 lookup ens4 \n",
            ),
        );
        let removed = NetMutator::new(runner.context())
            .remove_static_rules("ens4")
            .unwrap();

        assert_eq!(removed, 2);
        assert_eq!(
            runner.calls()[1..],
            [
                "/usr/sbin/ip rule del from 10.0.1.5 lookup ens4",
                "/usr/sbin/ip rule del from all iif ens4 lookup ens4",
            ]
        );
    }

    #[test]
    fn ip_rules_removed_by_priority() {
        let runner = ScriptedRunner::new().respond(
            "/usr/sbin/ip rule list",
            CommandOutput::ok(
                "0:\tfrom all lookup local\n\
                 32764:\tfrom 10.0.1.5 lookup t1\n\
                 32765:\tfrom 10.0.1.50 lookup t2\n\
                 32766:\tfrom all lookup main\n",
            ),
        );
        let removed = NetMutator::new(runner.context())
            .remove_ip_rules("10.0.1.5")
            .unwrap();

        assert_eq!(removed, 1);
        assert_eq!(runner.calls()[1..], ["/usr/sbin/ip rule del pref 32764"]);
    }

    #[test]
    fn failing_listing_finds_nothing() {
        let runner = ScriptedRunner::new().respond(
            "/usr/sbin/ip route show dev gone0",
            CommandOutput::failed(1, "Cannot find device \"gone0\""),
        );
        let removed = NetMutator::new(runner.context())
            .remove_static_routes("gone0")
            .unwrap();
        assert_eq!(removed, 0);
        assert_eq!(runner.calls().len(), 1);
    }

    #[test]
    fn address_removal_in_namespace() {
        let runner = ScriptedRunner::new().respond(
            "/usr/sbin/ip -netns blue address delete 10.0.1.5/24 dev ens4",
            CommandOutput::failed(2, "RTNETLINK answers: Cannot assign requested address"),
        );
        let mutator = NetMutator::new(runner.context());

        let err = mutator
            .remove_ip_address("ens4", "10.0.1.5/24", Some("blue"))
            .unwrap_err();
        assert!(matches!(err, HostnetError::Command { .. }));

        mutator.remove_ip_address("ens4", "10.0.1.5/24", None).unwrap();
    }
}
