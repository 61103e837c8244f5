// SPDX-License-Identifier: GPL-3.0-only

//! Bare-metal disk provisioning
//!
//! Turns a declarative [`StorageLayout`](provision_types::StorageLayout) into
//! real storage by driving the standard Linux tools:
//! - GPT partition tables (sgdisk, wipefs)
//! - Software RAID arrays (mdadm)
//! - LVM volume groups and logical volumes
//! - Filesystems (mkfs.*, mkswap) and their mounts under a target root
//! - The target's fstab and legacy disk descriptor
//! - Whole-host disk wipes for reinstalls
//!
//! Everything here is destructive and needs root.

pub mod blkid;
pub mod cmd;
pub mod config;
pub mod error;
pub mod format;
pub mod fstab;
pub mod lvm;
pub mod mount;
pub mod partition;
pub mod preflight;
pub mod provisioner;
pub mod raid;
pub mod wipe;

#[cfg(test)]
mod testing;

pub use cmd::{
    BestEffort, CommandBuilder, CommandOutput, CommandRunner, SystemRunner, Tool, ToolCommand,
};
pub use config::ProvisionConfig;
pub use error::{ProvisionError, Result};
pub use mount::{MountOrchestrator, Mounter, SyscallMounter};
pub use provisioner::{Provisioned, Provisioner};
pub use wipe::{WipeSummary, wipe_disks};
