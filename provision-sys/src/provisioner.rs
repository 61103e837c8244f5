// SPDX-License-Identifier: GPL-3.0-only

//! End-to-end provisioning of one storage layout
//!
//! Stages run strictly in sequence, each relying on the on-disk state the
//! previous one left behind: wipe (reinstalls only), partitions, RAID
//! arrays, LVM, filesystems, mounts, then the mount table and the legacy
//! disk descriptor. The first fatal error ends the run.

use provision_types::{DiskDescriptorEntry, StorageLayout};
use tracing::{error, info};

use crate::cmd::CommandRunner;
use crate::config::ProvisionConfig;
use crate::error::{ProvisionError, Result};
use crate::format::format_filesystem;
use crate::fstab::{FstabEntry, write_disk_descriptor, write_fstab};
use crate::lvm::LvmOrchestrator;
use crate::mount::{MountOrchestrator, Mounter, efivars_available};
use crate::partition::create_partitions;
use crate::raid::create_array;
use crate::wipe::{WipeSummary, wipe_disks};

/// What a finished run leaves behind
pub struct Provisioned<M: Mounter> {
    /// Still-mounted target root, ready for a chroot; call `teardown` when done
    pub mounts: MountOrchestrator<M>,
    pub wipe: Option<WipeSummary>,
    pub fstab: Vec<FstabEntry>,
    pub descriptor: Vec<DiskDescriptorEntry>,
}

pub struct Provisioner<'a> {
    runner: &'a dyn CommandRunner,
    config: &'a ProvisionConfig,
    reinstall: bool,
}

impl<'a> Provisioner<'a> {
    pub fn new(runner: &'a dyn CommandRunner, config: &'a ProvisionConfig) -> Self {
        Self {
            runner,
            config,
            reinstall: false,
        }
    }

    /// Wipe every eligible host disk before partitioning.
    pub fn reinstall(mut self, reinstall: bool) -> Self {
        self.reinstall = reinstall;
        self
    }

    pub fn run<M: Mounter>(&self, layout: &StorageLayout, mounter: M) -> Result<Provisioned<M>> {
        layout.validate().map_err(ProvisionError::from)?;

        let wipe = if self.reinstall {
            Some(wipe_disks(self.runner, &self.config.wipe)?)
        } else {
            None
        };

        self.build_storage(layout)?;

        let mut mounts = MountOrchestrator::new(&self.config.target_root, mounter);
        match self.populate_target(layout, &mut mounts) {
            Ok((fstab, descriptor)) => {
                info!(
                    "provisioned {} under {}",
                    plural(layout.filesystems.len(), "filesystem"),
                    self.config.target_root.display()
                );
                Ok(Provisioned {
                    mounts,
                    wipe,
                    fstab,
                    descriptor,
                })
            }
            Err(failure) => {
                error!("provisioning failed after mounting began, unmounting: {failure}");
                mounts.teardown();
                Err(failure)
            }
        }
    }

    fn build_storage(&self, layout: &StorageLayout) -> Result<()> {
        for disk in &layout.disks {
            create_partitions(self.runner, disk)?;
        }

        for raid in &layout.raids {
            create_array(self.runner, raid, &self.config.raid)?;
        }

        let mut lvm = LvmOrchestrator::new();
        if !layout.volume_groups.is_empty() {
            lvm.create_volume_groups(self.runner, &layout.volume_groups)?;
        }
        if !layout.logical_volumes.is_empty() {
            lvm.create_logical_volumes(self.runner, &layout.logical_volumes)?;
        }

        for filesystem in &layout.filesystems {
            format_filesystem(self.runner, filesystem)?;
        }
        Ok(())
    }

    fn populate_target<M: Mounter>(
        &self,
        layout: &StorageLayout,
        mounts: &mut MountOrchestrator<M>,
    ) -> Result<(Vec<FstabEntry>, Vec<DiskDescriptorEntry>)> {
        mounts.mount_filesystems(&layout.filesystems)?;
        mounts.mount_special_filesystems(efivars_available(&self.config.efivars_path))?;

        let fstab = write_fstab(
            self.runner,
            mounts.fstab_plans(),
            &self.config.in_target(&self.config.fstab_path),
        )?;
        let descriptor = write_disk_descriptor(
            self.runner,
            &layout.filesystems,
            &self.config.in_target(&self.config.disk_descriptor_path),
        )?;
        Ok((fstab, descriptor))
    }
}

fn plural(count: usize, noun: &str) -> String {
    if count == 1 {
        format!("{count} {noun}")
    } else {
        format!("{count} {noun}s")
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::Path;

    use super::*;
    use crate::cmd::Tool;
    use crate::testing::{RecordingMounter, RecordingRunner, TempDir};

    const LAYOUT: &str = r#"
[[disks]]
device = "/dev/sda"

[[disks.partitions]]
number = 1
label = "efi"
size_mib = 300
gpt_type = "boot"
gpt_guid = "C12A7328-F81F-11D2-BA4B-00A0C93EC93B"

[[disks.partitions]]
number = 2
label = "root"
gpt_type = "linux"

[[raids]]
name = "/dev/md0"
level = "1"
devices = ["/dev/sdb", "/dev/sdc"]

[[volume_groups]]
name = "vg0"
devices = ["/dev/md0"]

[[logical_volumes]]
name = "var"
volume_group = "vg0"

[[filesystems]]
device = "/dev/sda1"
format = "vfat"
mount_path = "/boot/efi"
label = "efi"

[[filesystems]]
device = "/dev/vg0/var"
format = "ext4"
mount_path = "/var"
label = "varlib"

[[filesystems]]
device = "/dev/sda2"
format = "ext4"
mount_path = "/"
label = "root"

[[filesystems]]
device = "tmpfs"
format = "tmpfs"
mount_path = "/tmp"
"#;

    fn config(root: &Path) -> ProvisionConfig {
        let mut config = ProvisionConfig {
            target_root: root.join("target"),
            efivars_path: root.join("no-efivars"),
            ..ProvisionConfig::default()
        };
        config.raid.speed_limit_path = root.join("speed_limit_min");
        config
    }

    fn runner() -> RecordingRunner {
        RecordingRunner::new().respond(Tool::Blkid, "UUID=0000-1111\nTYPE=ext4\n")
    }

    fn first_index(rendered: &[String], prefix: &str) -> usize {
        rendered
            .iter()
            .position(|line| line.starts_with(prefix))
            .unwrap_or_else(|| panic!("no `{prefix}` call in {rendered:?}"))
    }

    #[test]
    fn runs_every_stage_in_order() {
        let temp = TempDir::new();
        let config = config(&temp.path);
        let runner = runner();
        let layout = StorageLayout::from_toml_str(LAYOUT).expect("layout");

        let provisioned = Provisioner::new(&runner, &config)
            .run(&layout, RecordingMounter::new())
            .expect("pipeline succeeds");

        let rendered = runner.rendered();
        let stages = [
            "sgdisk", "mdadm", "vgcreate", "lvcreate", "mkfs.vfat", "mkfs.ext4", "blkid",
        ];
        let positions: Vec<usize> = stages
            .iter()
            .map(|stage| first_index(&rendered, stage))
            .collect();
        assert!(positions.windows(2).all(|pair| pair[0] < pair[1]), "{rendered:?}");

        let mounted: Vec<_> = provisioned
            .mounts
            .mounted()
            .iter()
            .map(|record| {
                record
                    .target
                    .strip_prefix(&config.target_root)
                    .expect("under root")
                    .to_path_buf()
            })
            .collect();
        assert_eq!(mounted[0], Path::new(""));
        assert_eq!(mounted.len(), 3);
        assert_eq!(provisioned.mounts.special().len(), 4);

        assert_eq!(provisioned.fstab.len(), 4);
        let fstab = fs::read_to_string(config.target_root.join("etc/fstab")).expect("fstab");
        assert!(fstab.contains("tmpfs /tmp tmpfs defaults 0 0"));
        assert!(fstab.contains("UUID=0000-1111 / ext4 defaults 0 1"));

        assert_eq!(provisioned.descriptor.len(), 3);
        assert!(config.target_root.join("etc/provision/disk.json").is_file());
        assert_eq!(
            fs::read_to_string(&config.raid.speed_limit_path).expect("tunable"),
            "200000"
        );
        assert!(provisioned.wipe.is_none());
    }

    #[test]
    fn invalid_layout_touches_nothing() {
        let temp = TempDir::new();
        let config = config(&temp.path);
        let runner = runner();
        let mut layout = StorageLayout::from_toml_str(LAYOUT).expect("layout");
        layout.raids[0].spares = 2;

        let error = Provisioner::new(&runner, &config)
            .run(&layout, RecordingMounter::new())
            .err()
            .expect("layout rejected");
        assert!(matches!(error, ProvisionError::InvalidLayout(_)));
        assert!(runner.calls().is_empty());
    }

    #[test]
    fn stage_failure_aborts_before_later_stages() {
        let temp = TempDir::new();
        let config = config(&temp.path);
        let runner = runner().fail(Tool::Mdadm);
        let layout = StorageLayout::from_toml_str(LAYOUT).expect("layout");
        let mounter = RecordingMounter::new();

        let error = Provisioner::new(&runner, &config)
            .run(&layout, mounter)
            .err()
            .expect("raid failure is fatal");
        assert!(error.to_string().starts_with("raid /dev/md0:"));
        assert!(runner.calls_for(Tool::Vgcreate).is_empty());
        assert!(runner.calls_for(Tool::MkfsExt4).is_empty());
    }

    #[test]
    fn mount_failure_unmounts_what_was_mounted() {
        let temp = TempDir::new();
        let config = config(&temp.path);
        let runner = runner();
        let layout = StorageLayout::from_toml_str(LAYOUT).expect("layout");
        let failing = config.target_root.join("var");
        let mounter = RecordingMounter::new().fail_at(failing.clone());

        let error = Provisioner::new(&runner, &config)
            .run(&layout, &mounter)
            .err()
            .expect("mount failure is fatal");
        assert!(error.to_string().starts_with("mount of /dev/vg0/var at /var:"));
        assert!(!config.target_root.join("etc/fstab").exists());

        let attempted = mounter.mounted_targets();
        assert_eq!(attempted.last(), Some(&failing));
        let mut expected: Vec<_> = attempted
            .into_iter()
            .filter(|target| *target != failing)
            .collect();
        expected.reverse();
        assert_eq!(expected, vec![config.target_root.clone()]);
        assert_eq!(mounter.unmounted_targets(), expected);
    }
}
