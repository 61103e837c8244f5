// SPDX-License-Identifier: GPL-3.0-only

//! External tool invocation
//!
//! Every stage talks to the OS through a [`ToolCommand`] assembled by a
//! [`CommandBuilder`]. The builder keeps device operands apart from flags and
//! always emits them last, so per-tool argument order is fixed in one place.
//! Execution goes through the [`CommandRunner`] seam; callers pick
//! [`ToolCommand::run_fatal`] or [`ToolCommand::run_best_effort`] to state
//! whether a failure aborts the run.

use std::fmt;
use std::process::{Command, Stdio};

use tracing::{debug, warn};

use crate::error::{ProvisionError, Result};

/// External tool families used by the provisioner
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Tool {
    Blkid,
    Wipefs,
    Sgdisk,
    Mdadm,
    Vgs,
    Lvs,
    Vgcreate,
    Lvcreate,
    MkfsExt3,
    MkfsExt4,
    MkfsVfat,
    Mkswap,
    Nvme,
    Dd,
}

impl Tool {
    pub const ALL: [Tool; 14] = [
        Tool::Blkid,
        Tool::Wipefs,
        Tool::Sgdisk,
        Tool::Mdadm,
        Tool::Vgs,
        Tool::Lvs,
        Tool::Vgcreate,
        Tool::Lvcreate,
        Tool::MkfsExt3,
        Tool::MkfsExt4,
        Tool::MkfsVfat,
        Tool::Mkswap,
        Tool::Nvme,
        Tool::Dd,
    ];

    /// Binary name looked up in PATH
    pub fn binary(self) -> &'static str {
        match self {
            Tool::Blkid => "blkid",
            Tool::Wipefs => "wipefs",
            Tool::Sgdisk => "sgdisk",
            Tool::Mdadm => "mdadm",
            Tool::Vgs => "vgs",
            Tool::Lvs => "lvs",
            Tool::Vgcreate => "vgcreate",
            Tool::Lvcreate => "lvcreate",
            Tool::MkfsExt3 => "mkfs.ext3",
            Tool::MkfsExt4 => "mkfs.ext4",
            Tool::MkfsVfat => "mkfs.vfat",
            Tool::Mkswap => "mkswap",
            Tool::Nvme => "nvme",
            Tool::Dd => "dd",
        }
    }
}

impl fmt::Display for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.binary())
    }
}

/// A fully assembled tool invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCommand {
    pub tool: Tool,
    pub args: Vec<String>,
}

impl ToolCommand {
    pub fn render(&self) -> String {
        if self.args.is_empty() {
            self.tool.binary().to_string()
        } else {
            format!("{} {}", self.tool.binary(), self.args.join(" "))
        }
    }

    /// Run a step whose failure must abort the run.
    pub fn run_fatal(&self, runner: &dyn CommandRunner) -> Result<CommandOutput> {
        runner.run(self)
    }

    /// Run a step whose failure is only worth a warning.
    pub fn run_best_effort(&self, runner: &dyn CommandRunner) -> BestEffort {
        match runner.run(self) {
            Ok(output) => BestEffort::Completed(output),
            Err(error) => BestEffort::Failed(error),
        }
    }
}

/// Builds a [`ToolCommand`], keeping device operands at the end.
#[derive(Debug, Clone)]
pub struct CommandBuilder {
    tool: Tool,
    args: Vec<String>,
    targets: Vec<String>,
}

impl CommandBuilder {
    pub fn new(tool: Tool) -> Self {
        Self {
            tool,
            args: Vec::new(),
            targets: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn arg_if(self, condition: bool, arg: impl Into<String>) -> Self {
        if condition { self.arg(arg) } else { self }
    }

    /// Device operand; emitted after every flag, in call order.
    pub fn target(mut self, device: impl Into<String>) -> Self {
        self.targets.push(device.into());
        self
    }

    pub fn targets<I, S>(mut self, devices: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.targets.extend(devices.into_iter().map(Into::into));
        self
    }

    pub fn build(self) -> ToolCommand {
        let mut args = self.args;
        args.extend(self.targets);
        ToolCommand {
            tool: self.tool,
            args,
        }
    }
}

/// Captured output of a successful invocation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Outcome of a step that may fail without aborting the run
#[must_use]
#[derive(Debug)]
pub enum BestEffort {
    Completed(CommandOutput),
    Failed(ProvisionError),
}

impl BestEffort {
    pub fn is_completed(&self) -> bool {
        matches!(self, BestEffort::Completed(_))
    }

    /// Log a failure as a warning; returns whether the step completed.
    pub fn log(self, what: &str) -> bool {
        match self {
            BestEffort::Completed(_) => true,
            BestEffort::Failed(error) => {
                warn!("{what} failed, continuing: {error}");
                false
            }
        }
    }
}

/// Executes tool invocations
///
/// Implementations report a missing binary as [`ProvisionError::ToolNotFound`]
/// and a non-zero exit as [`ProvisionError::ExecutionFailed`].
pub trait CommandRunner: Send + Sync {
    fn run(&self, command: &ToolCommand) -> Result<CommandOutput>;
}

/// Runs tools found in PATH as child processes
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, command: &ToolCommand) -> Result<CommandOutput> {
        let rendered = command.render();
        let binary = which::which(command.tool.binary()).map_err(|_| {
            ProvisionError::ToolNotFound {
                tool: command.tool.binary().to_string(),
            }
        })?;

        debug!("running {rendered}");
        let output = Command::new(binary)
            .args(&command.args)
            .stdin(Stdio::null())
            .output()?;

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();

        if !output.status.success() {
            let captured = if stderr.trim().is_empty() {
                stdout.trim().to_string()
            } else {
                stderr.trim().to_string()
            };
            return Err(ProvisionError::ExecutionFailed {
                command: rendered,
                status: output.status.code(),
                output: captured,
            });
        }

        Ok(CommandOutput { stdout, stderr })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingRunner;

    #[test]
    fn builder_places_targets_last() {
        let command = CommandBuilder::new(Tool::Mdadm)
            .target("/dev/sda1")
            .arg("--create")
            .target("/dev/sdb1")
            .arg_if(false, "--assume-clean")
            .arg("--force")
            .build();

        assert_eq!(
            command.args,
            vec!["--create", "--force", "/dev/sda1", "/dev/sdb1"]
        );
        assert_eq!(command.render(), "mdadm --create --force /dev/sda1 /dev/sdb1");
    }

    #[test]
    fn best_effort_reports_failure_without_error() {
        let runner = RecordingRunner::new().fail(Tool::Wipefs);
        let command = CommandBuilder::new(Tool::Wipefs).target("/dev/sda").build();

        let outcome = command.run_best_effort(&runner);
        assert!(!outcome.is_completed());
        assert!(!outcome.log("signature wipe"));
        assert!(command.run_fatal(&runner).is_err());
    }
}
