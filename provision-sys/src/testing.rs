// SPDX-License-Identifier: GPL-3.0-only

//! In-process fakes for the command and mount seams

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use nix::mount::MsFlags;

use crate::cmd::{CommandOutput, CommandRunner, Tool, ToolCommand};
use crate::error::{ProvisionError, Result};
use crate::mount::Mounter;

type Key = (Tool, Option<String>);

/// Records every invocation and answers from canned responses.
///
/// Responses and failures may be keyed on the last argument, which is the
/// device operand for every tool the provisioner runs.
#[derive(Default)]
pub struct RecordingRunner {
    calls: Mutex<Vec<ToolCommand>>,
    stdout: HashMap<Key, String>,
    failing: HashSet<Key>,
    missing: HashSet<Tool>,
}

impl RecordingRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(mut self, tool: Tool, stdout: &str) -> Self {
        self.stdout.insert((tool, None), stdout.to_string());
        self
    }

    pub fn respond_for(mut self, tool: Tool, target: &str, stdout: &str) -> Self {
        self.stdout
            .insert((tool, Some(target.to_string())), stdout.to_string());
        self
    }

    pub fn fail(mut self, tool: Tool) -> Self {
        self.failing.insert((tool, None));
        self
    }

    pub fn fail_for(mut self, tool: Tool, target: &str) -> Self {
        self.failing.insert((tool, Some(target.to_string())));
        self
    }

    pub fn missing(mut self, tool: Tool) -> Self {
        self.missing.insert(tool);
        self
    }

    pub fn calls(&self) -> Vec<ToolCommand> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_for(&self, tool: Tool) -> Vec<ToolCommand> {
        self.calls()
            .into_iter()
            .filter(|call| call.tool == tool)
            .collect()
    }

    pub fn rendered(&self) -> Vec<String> {
        self.calls().iter().map(ToolCommand::render).collect()
    }
}

impl CommandRunner for RecordingRunner {
    fn run(&self, command: &ToolCommand) -> Result<CommandOutput> {
        self.calls.lock().unwrap().push(command.clone());

        if self.missing.contains(&command.tool) {
            return Err(ProvisionError::ToolNotFound {
                tool: command.tool.binary().to_string(),
            });
        }

        let specific: Key = (command.tool, command.args.last().cloned());
        let general: Key = (command.tool, None);

        if self.failing.contains(&specific) || self.failing.contains(&general) {
            return Err(ProvisionError::ExecutionFailed {
                command: command.render(),
                status: Some(1),
                output: "simulated failure".to_string(),
            });
        }

        let stdout = self
            .stdout
            .get(&specific)
            .or_else(|| self.stdout.get(&general))
            .cloned()
            .unwrap_or_default();

        Ok(CommandOutput {
            stdout,
            stderr: String::new(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MountCall {
    Mount {
        source: String,
        target: PathBuf,
        fstype: Option<String>,
        flags: MsFlags,
        data: Option<String>,
    },
    Unmount(PathBuf),
}

/// Records mount(2)/umount2(2) calls instead of performing them
#[derive(Default)]
pub struct RecordingMounter {
    calls: Mutex<Vec<MountCall>>,
    failing: HashSet<PathBuf>,
}

impl RecordingMounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail both mounting and unmounting at `target`.
    pub fn fail_at(mut self, target: impl Into<PathBuf>) -> Self {
        self.failing.insert(target.into());
        self
    }

    pub fn calls(&self) -> Vec<MountCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn mounted_targets(&self) -> Vec<PathBuf> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                MountCall::Mount { target, .. } => Some(target),
                MountCall::Unmount(_) => None,
            })
            .collect()
    }

    pub fn unmounted_targets(&self) -> Vec<PathBuf> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                MountCall::Unmount(target) => Some(target),
                MountCall::Mount { .. } => None,
            })
            .collect()
    }

    fn check(&self, target: &Path, what: &str) -> Result<()> {
        if self.failing.contains(target) {
            return Err(ProvisionError::ExecutionFailed {
                command: format!("{what} {}", target.display()),
                status: None,
                output: "simulated failure".to_string(),
            });
        }
        Ok(())
    }
}

impl Mounter for RecordingMounter {
    fn mount(
        &self,
        source: &str,
        target: &Path,
        fstype: Option<&str>,
        flags: MsFlags,
        data: Option<&str>,
    ) -> Result<()> {
        self.calls.lock().unwrap().push(MountCall::Mount {
            source: source.to_string(),
            target: target.to_path_buf(),
            fstype: fstype.map(ToString::to_string),
            flags,
            data: data.map(ToString::to_string),
        });
        self.check(target, "mount")
    }

    fn unmount(&self, target: &Path) -> Result<()> {
        self.calls
            .lock()
            .unwrap()
            .push(MountCall::Unmount(target.to_path_buf()));
        self.check(target, "umount")
    }
}

static COUNTER: AtomicU64 = AtomicU64::new(1);

pub struct TempDir {
    pub path: PathBuf,
}

impl TempDir {
    pub fn new() -> Self {
        let unique = COUNTER.fetch_add(1, Ordering::Relaxed);
        let path = std::env::temp_dir().join(format!(
            "provision-sys-test-{}-{unique}",
            std::process::id()
        ));
        fs::create_dir_all(&path).expect("create temp dir");
        Self { path }
    }
}

impl Drop for TempDir {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.path);
    }
}
