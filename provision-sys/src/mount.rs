// SPDX-License-Identifier: GPL-3.0-only

//! Mounting planned filesystems and chroot pseudo filesystems under a root
//!
//! Planned filesystems mount shallowest first, so every mount point's parent
//! is already in place. Teardown walks both lists backwards.

use std::fs;
use std::path::{Path, PathBuf};

use nix::mount::{MntFlags, MsFlags};
use provision_types::{FilesystemFormat, FilesystemPlan};
use tracing::{debug, info, warn};

use crate::config::join_under;
use crate::error::{ProvisionError, Result, WithTarget};

/// The mount(2)/umount2(2) seam
pub trait Mounter: Send + Sync {
    fn mount(
        &self,
        source: &str,
        target: &Path,
        fstype: Option<&str>,
        flags: MsFlags,
        data: Option<&str>,
    ) -> Result<()>;

    /// Forced unmount; must not block on a busy filesystem.
    fn unmount(&self, target: &Path) -> Result<()>;
}

impl<M: Mounter + ?Sized> Mounter for &M {
    fn mount(
        &self,
        source: &str,
        target: &Path,
        fstype: Option<&str>,
        flags: MsFlags,
        data: Option<&str>,
    ) -> Result<()> {
        (**self).mount(source, target, fstype, flags, data)
    }

    fn unmount(&self, target: &Path) -> Result<()> {
        (**self).unmount(target)
    }
}

/// Performs real mount syscalls
#[derive(Debug, Clone, Copy, Default)]
pub struct SyscallMounter;

impl Mounter for SyscallMounter {
    fn mount(
        &self,
        source: &str,
        target: &Path,
        fstype: Option<&str>,
        flags: MsFlags,
        data: Option<&str>,
    ) -> Result<()> {
        nix::mount::mount(Some(source), target, fstype, flags, data).map_err(|errno| {
            ProvisionError::ExecutionFailed {
                command: format!(
                    "mount -t {} {source} {}",
                    fstype.unwrap_or("none"),
                    target.display()
                ),
                status: Some(errno as i32),
                output: errno.desc().to_string(),
            }
        })
    }

    fn unmount(&self, target: &Path) -> Result<()> {
        nix::mount::umount2(target, MntFlags::MNT_FORCE).map_err(|errno| {
            ProvisionError::ExecutionFailed {
                command: format!("umount --force {}", target.display()),
                status: Some(errno as i32),
                output: errno.desc().to_string(),
            }
        })
    }
}

/// A filesystem this orchestrator mounted and must unmount again
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountRecord {
    pub source: String,
    pub target: PathBuf,
    pub fstype: String,
}

struct SpecialMount {
    source: &'static str,
    target: &'static str,
    fstype: Option<&'static str>,
    flags: MsFlags,
}

const EFIVARS_TARGET: &str = "/sys/firmware/efi/efivars";

/// Pseudo filesystems a chroot needs, in mount order. efivarfs sits below
/// sysfs and is only mounted when the host exposes EFI variables.
fn special_mounts(efivars: bool) -> Vec<SpecialMount> {
    let mut mounts = vec![
        SpecialMount {
            source: "proc",
            target: "/proc",
            fstype: Some("proc"),
            flags: MsFlags::empty(),
        },
        SpecialMount {
            source: "sysfs",
            target: "/sys",
            fstype: Some("sysfs"),
            flags: MsFlags::empty(),
        },
    ];
    if efivars {
        mounts.push(SpecialMount {
            source: "efivarfs",
            target: EFIVARS_TARGET,
            fstype: Some("efivarfs"),
            flags: MsFlags::empty(),
        });
    }
    mounts.push(SpecialMount {
        source: "tmpfs",
        target: "/tmp",
        fstype: Some("tmpfs"),
        flags: MsFlags::empty(),
    });
    mounts.push(SpecialMount {
        source: "/dev",
        target: "/dev",
        fstype: None,
        flags: MsFlags::MS_BIND,
    });
    mounts
}

/// Split fstab-style options into kernel flags and filesystem data.
pub fn split_mount_options(options: &[String]) -> (MsFlags, Option<String>) {
    let mut flags = MsFlags::empty();
    let mut data = Vec::new();

    for option in options.iter().flat_map(|option| option.split(',')) {
        match option.trim() {
            "" | "defaults" | "rw" => {}
            "ro" => flags |= MsFlags::MS_RDONLY,
            "nosuid" => flags |= MsFlags::MS_NOSUID,
            "nodev" => flags |= MsFlags::MS_NODEV,
            "noexec" => flags |= MsFlags::MS_NOEXEC,
            "sync" => flags |= MsFlags::MS_SYNCHRONOUS,
            "noatime" => flags |= MsFlags::MS_NOATIME,
            "nodiratime" => flags |= MsFlags::MS_NODIRATIME,
            "relatime" => flags |= MsFlags::MS_RELATIME,
            other => data.push(other.to_string()),
        }
    }

    let data = if data.is_empty() {
        None
    } else {
        Some(data.join(","))
    };
    (flags, data)
}

/// Planned filesystems that have a mount path, shallowest first.
///
/// The sort is stable, so siblings keep their layout order.
pub fn mount_order(plans: &[FilesystemPlan]) -> Vec<&FilesystemPlan> {
    let mut ordered: Vec<&FilesystemPlan> =
        plans.iter().filter(|plan| plan.has_mount_path()).collect();
    ordered.sort_by_key(|plan| plan.mount_depth());
    ordered
}

/// Owns everything mounted under one target root
pub struct MountOrchestrator<M: Mounter> {
    root: PathBuf,
    mounter: M,
    mounted: Vec<MountRecord>,
    special: Vec<MountRecord>,
    fstab_plans: Vec<FilesystemPlan>,
}

impl<M: Mounter> MountOrchestrator<M> {
    pub fn new(root: impl Into<PathBuf>, mounter: M) -> Self {
        Self {
            root: root.into(),
            mounter,
            mounted: Vec::new(),
            special: Vec::new(),
            fstab_plans: Vec::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Planned filesystems currently mounted, in mount order
    pub fn mounted(&self) -> &[MountRecord] {
        &self.mounted
    }

    /// Chroot pseudo filesystems currently mounted, in mount order
    pub fn special(&self) -> &[MountRecord] {
        &self.special
    }

    /// Plans that belong in the mount table: everything mounted plus the
    /// swap, tmpfs and untouched entries that are never mounted here.
    pub fn fstab_plans(&self) -> &[FilesystemPlan] {
        &self.fstab_plans
    }

    /// Format of the plan recorded for `mount_path`, if any
    pub fn format_at(&self, mount_path: &str) -> Option<FilesystemFormat> {
        self.fstab_plans
            .iter()
            .find(|plan| plan.mount_path == mount_path)
            .map(|plan| plan.format)
    }

    /// Mount every planned filesystem that declares a mount path.
    pub fn mount_filesystems(&mut self, plans: &[FilesystemPlan]) -> Result<()> {
        for plan in mount_order(plans) {
            if !plan.format.is_mounted_during_install() {
                debug!(
                    "not mounting {} ({}) at {}",
                    plan.device, plan.format, plan.mount_path
                );
                self.fstab_plans.push(plan.clone());
                continue;
            }

            let target = join_under(&self.root, Path::new(&plan.mount_path));
            let (flags, data) = split_mount_options(&plan.mount_options);

            fs::create_dir_all(&target)
                .map_err(ProvisionError::from)
                .with_target(|| format!("mount point {}", target.display()))?;

            info!("mounting {} at {}", plan.device, target.display());
            self.mounter
                .mount(
                    &plan.device,
                    &target,
                    Some(plan.format.fstab_type()),
                    flags,
                    data.as_deref(),
                )
                .with_target(|| format!("mount of {} at {}", plan.device, plan.mount_path))?;

            self.mounted.push(MountRecord {
                source: plan.device.clone(),
                target,
                fstype: plan.format.fstab_type().to_string(),
            });
            self.fstab_plans.push(plan.clone());
        }
        Ok(())
    }

    /// Mount proc, sys, efivars (when `efivars` is set), tmp and a bind of /dev.
    pub fn mount_special_filesystems(&mut self, efivars: bool) -> Result<()> {
        for special in special_mounts(efivars) {
            let target = join_under(&self.root, Path::new(special.target));
            fs::create_dir_all(&target)
                .map_err(ProvisionError::from)
                .with_target(|| format!("mount point {}", target.display()))?;

            debug!("mounting {} at {}", special.source, target.display());
            self.mounter
                .mount(special.source, &target, special.fstype, special.flags, None)
                .with_target(|| format!("chroot mount {}", special.target))?;

            self.special.push(MountRecord {
                source: special.source.to_string(),
                target,
                fstype: special.fstype.unwrap_or("bind").to_string(),
            });
        }
        Ok(())
    }

    /// Unmount pseudo filesystems, then planned ones, each newest first.
    ///
    /// Failures are logged and the walk continues.
    pub fn teardown(&mut self) {
        let records = self
            .special
            .drain(..)
            .rev()
            .chain(self.mounted.drain(..).rev())
            .collect::<Vec<_>>();

        for record in records {
            match self.mounter.unmount(&record.target) {
                Ok(()) => debug!("unmounted {}", record.target.display()),
                Err(error) => warn!(
                    "failed to unmount {}, continuing: {error}",
                    record.target.display()
                ),
            }
        }
    }
}

/// Whether the host exposes EFI variables at `path`
pub fn efivars_available(path: &Path) -> bool {
    path.is_dir()
}
