// SPDX-License-Identifier: GPL-3.0-only

//! Whole-host disk wipe for machines being reinstalled
//!
//! Every physical disk under the sysfs block tree is considered. Disks whose
//! name matches an ignore prefix, that carry an Intel firmware RAID
//! signature, or that back a live mount are left alone. The rest are erased
//! concurrently, one worker per disk, and a failure on one disk never stops
//! the others.

mod mountinfo;
mod sysfs;

use std::collections::BTreeSet;
use std::fmt;
use std::fs;
use std::sync::mpsc;

use rayon::ThreadPoolBuilder;
use tracing::{debug, error, info, warn};

use crate::blkid::read_properties;
use crate::cmd::{CommandBuilder, CommandRunner, Tool, ToolCommand};
use crate::config::WipeConfig;
use crate::error::{ProvisionError, Result, WithTarget};

pub use mountinfo::{parse_mount_sources, read_mount_sources};
pub use sysfs::{BlockDisk, list_disks};

/// blkid TYPE marker of an Intel Matrix Storage RAID member
const FOREIGN_RAID_MARKER: &str = "isw_raid";

const NVME_PATH_PREFIX: &str = "/dev/nvm";

/// What the planner picks for a disk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WipeStrategy {
    /// Discard-format the device, overwriting it if the discard fails
    Discard,
    /// NVMe user-data secure erase
    NvmeSecureErase,
}

impl WipeStrategy {
    /// Only non-rotational NVMe media gets the secure-erase format.
    pub fn select(device: &str, rotational: bool) -> Self {
        if !rotational && device.starts_with(NVME_PATH_PREFIX) {
            WipeStrategy::NvmeSecureErase
        } else {
            WipeStrategy::Discard
        }
    }
}

impl fmt::Display for WipeStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            WipeStrategy::Discard => "discard",
            WipeStrategy::NvmeSecureErase => "nvme-secure-erase",
        })
    }
}

/// How a disk actually ended up erased
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WipeMethod {
    Discarded,
    /// Raw zero overwrite with dd, after a failed discard
    Overwritten,
    SecureErased,
}

impl fmt::Display for WipeMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            WipeMethod::Discarded => "discard",
            WipeMethod::Overwritten => "dd-overwrite",
            WipeMethod::SecureErased => "nvme-secure-erase",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WipeDecision {
    pub device: String,
    pub capacity_bytes: u64,
    pub rotational: bool,
    pub strategy: WipeStrategy,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    IgnoredPrefix(String),
    ForeignRaidMember,
    BacksLiveMount(String),
    NoCapacity,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::IgnoredPrefix(prefix) => {
                write!(f, "name matches ignored prefix {prefix}")
            }
            SkipReason::ForeignRaidMember => f.write_str("member of a firmware RAID array"),
            SkipReason::BacksLiveMount(source) => {
                write!(f, "backs live mount source {source}")
            }
            SkipReason::NoCapacity => f.write_str("reports zero capacity"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedDisk {
    pub device: String,
    pub reason: SkipReason,
}

#[derive(Debug, Default)]
pub struct WipeSummary {
    /// Wiped devices and the method that finished the job
    pub wiped: Vec<(String, WipeMethod)>,
    pub skipped: Vec<SkippedDisk>,
    pub failed: Vec<(String, ProvisionError)>,
}

impl WipeSummary {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

pub fn discard_command(device: &str) -> ToolCommand {
    CommandBuilder::new(Tool::MkfsExt4)
        .args(["-F", "-E", "discard"])
        .target(device)
        .build()
}

pub fn nvme_format_command(device: &str) -> ToolCommand {
    CommandBuilder::new(Tool::Nvme)
        .args(["format", "--ses=1", "--force"])
        .target(device)
        .build()
}

/// Zero the first MiB, where partition tables and filesystem magic live.
pub fn zero_head_command(device: &str) -> ToolCommand {
    CommandBuilder::new(Tool::Dd)
        .args(["if=/dev/zero", "bs=1M", "count=1", "conv=fsync"])
        .target(format!("of={device}"))
        .build()
}

pub fn overwrite_command(device: &str, capacity_bytes: u64, block_size: u64) -> ToolCommand {
    let block_size = block_size.max(1);
    CommandBuilder::new(Tool::Dd)
        .arg("if=/dev/zero")
        .arg(format!("bs={block_size}"))
        .arg(format!("count={}", capacity_bytes / block_size))
        .arg("conv=fsync")
        .target(format!("of={device}"))
        .build()
}

/// Decide what happens to every disk on the host without touching any.
pub fn plan_wipe(
    runner: &dyn CommandRunner,
    config: &WipeConfig,
) -> Result<(Vec<WipeDecision>, Vec<SkippedDisk>)> {
    let live_sources = live_mount_members(config)?;
    let mut decisions = Vec::new();
    let mut skipped = Vec::new();

    for disk in list_disks(&config.sysfs_block_root)? {
        let device = disk.device_path();
        match skip_reason(runner, config, &disk, &live_sources) {
            Some(reason) => {
                info!("not wiping {device}: {reason}");
                skipped.push(SkippedDisk { device, reason });
            }
            None => decisions.push(WipeDecision {
                strategy: WipeStrategy::select(&device, disk.rotational),
                capacity_bytes: disk.capacity_bytes,
                rotational: disk.rotational,
                device,
            }),
        }
    }

    Ok((decisions, skipped))
}

/// Kernel names of every block device backing a mount right now
fn live_mount_members(config: &WipeConfig) -> Result<BTreeSet<String>> {
    let sources = read_mount_sources(&config.mountinfo_path)?;
    Ok(sources
        .iter()
        .map(|source| {
            // /dev/mapper and /dev/disk/by-* are symlinks to the kernel name
            let resolved = fs::canonicalize(source)
                .map(|path| path.to_string_lossy().into_owned())
                .unwrap_or_else(|_| source.clone());
            resolved.trim_start_matches("/dev/").to_string()
        })
        .collect())
}

fn skip_reason(
    runner: &dyn CommandRunner,
    config: &WipeConfig,
    disk: &BlockDisk,
    live_sources: &BTreeSet<String>,
) -> Option<SkipReason> {
    if let Some(prefix) = config
        .ignore_prefixes
        .iter()
        .find(|prefix| disk.name.starts_with(prefix.as_str()))
    {
        return Some(SkipReason::IgnoredPrefix(prefix.clone()));
    }

    if disk.capacity_bytes == 0 {
        return Some(SkipReason::NoCapacity);
    }

    if let Some(member) = disk.members.iter().find(|member| live_sources.contains(*member)) {
        return Some(SkipReason::BacksLiveMount(format!("/dev/{member}")));
    }

    // blkid exits non-zero on a blank disk
    let properties = read_properties(runner, &disk.device_path()).unwrap_or_else(|error| {
        debug!("no block properties for {}: {error}", disk.device_path());
        Default::default()
    });
    if properties
        .fs_type()
        .is_some_and(|fs_type| fs_type.contains(FOREIGN_RAID_MARKER))
    {
        return Some(SkipReason::ForeignRaidMember);
    }

    None
}

/// Erase one disk, returning the method that completed.
pub fn wipe_disk(
    runner: &dyn CommandRunner,
    decision: &WipeDecision,
    block_size: u64,
) -> Result<WipeMethod> {
    let device = decision.device.as_str();
    info!(
        "wiping {device} ({} bytes, {}) with {}",
        decision.capacity_bytes,
        if decision.rotational { "rotational" } else { "solid state" },
        decision.strategy
    );

    match decision.strategy {
        WipeStrategy::NvmeSecureErase => {
            nvme_format_command(device)
                .run_fatal(runner)
                .with_target(|| format!("secure erase of {device}"))?;
            Ok(WipeMethod::SecureErased)
        }
        WipeStrategy::Discard => {
            if discard_command(device)
                .run_best_effort(runner)
                .log(&format!("discard of {device}"))
            {
                return Ok(WipeMethod::Discarded);
            }
            warn!("falling back to overwriting {device}");
            overwrite(runner, decision, block_size)
        }
    }
}

fn overwrite(
    runner: &dyn CommandRunner,
    decision: &WipeDecision,
    block_size: u64,
) -> Result<WipeMethod> {
    let device = decision.device.as_str();
    zero_head_command(device)
        .run_fatal(runner)
        .with_target(|| format!("zeroing head of {device}"))?;
    overwrite_command(device, decision.capacity_bytes, block_size)
        .run_fatal(runner)
        .with_target(|| format!("overwrite of {device}"))?;
    Ok(WipeMethod::Overwritten)
}

/// Wipe every eligible disk on the host, one worker per disk.
///
/// Per-disk failures are logged and reported in the summary, never raised.
pub fn wipe_disks(runner: &dyn CommandRunner, config: &WipeConfig) -> Result<WipeSummary> {
    let (decisions, skipped) = plan_wipe(runner, config)?;
    let mut summary = WipeSummary {
        skipped,
        ..WipeSummary::default()
    };

    if decisions.is_empty() {
        info!("no disks to wipe");
        return Ok(summary);
    }

    let pool = ThreadPoolBuilder::new()
        .num_threads(decisions.len())
        .thread_name(|index| format!("wipe-{index}"))
        .build()
        .map_err(|error| ProvisionError::WorkerPool(error.to_string()))?;

    let (sender, receiver) = mpsc::channel();
    pool.scope(|scope| {
        for decision in &decisions {
            let sender = sender.clone();
            scope.spawn(move |_| {
                let outcome = wipe_disk(runner, decision, config.block_size);
                // The receiver outlives the scope
                let _ = sender.send((decision.device.clone(), outcome));
            });
        }
    });
    drop(sender);

    for (device, outcome) in receiver {
        match outcome {
            Ok(method) => {
                info!("wiped {device} with {method}");
                summary.wiped.push((device, method));
            }
            Err(failure) => {
                error!("failed to wipe {device}: {failure}");
                summary.failed.push((device, failure));
            }
        }
    }

    summary.wiped.sort_by(|a, b| a.0.cmp(&b.0));
    summary.failed.sort_by(|a, b| a.0.cmp(&b.0));
    info!(
        "wipe finished: {} wiped, {} skipped, {} failed",
        summary.wiped.len(),
        summary.skipped.len(),
        summary.failed.len()
    );
    Ok(summary)
}
