// SPDX-License-Identifier: GPL-3.0-only

//! Physical disk enumeration from the sysfs block tree

use std::fs;
use std::path::Path;

use tracing::debug;

use crate::error::{ProvisionError, Result, WithTarget};

/// Size of the unit `/sys/block/<disk>/size` is expressed in
const SECTOR_BYTES: u64 = 512;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockDisk {
    /// Kernel name, e.g. `sda` or `nvme0n1`
    pub name: String,
    pub capacity_bytes: u64,
    pub rotational: bool,
    /// The disk, its partitions, and anything stacked on them
    pub members: Vec<String>,
}

impl BlockDisk {
    pub fn device_path(&self) -> String {
        format!("/dev/{}", self.name)
    }
}

/// Every entry under `root`, sorted by name.
pub fn list_disks(root: &Path) -> Result<Vec<BlockDisk>> {
    let entries = fs::read_dir(root)
        .map_err(ProvisionError::from)
        .with_target(|| format!("listing {}", root.display()))?;

    let mut names: Vec<String> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();

    Ok(names
        .into_iter()
        .map(|name| {
            let disk_dir = root.join(&name);
            BlockDisk {
                capacity_bytes: read_capacity(&disk_dir),
                rotational: read_rotational(&disk_dir),
                members: stacked_members(root, &name),
                name,
            }
        })
        .collect())
}

/// Unreadable flags count as rotational so the disk takes the overwrite path.
fn read_rotational(disk_dir: &Path) -> bool {
    match fs::read_to_string(disk_dir.join("queue/rotational")) {
        Ok(value) => value.trim() != "0",
        Err(error) => {
            debug!(
                "cannot read rotational flag of {}: {error}; assuming rotational",
                disk_dir.display()
            );
            true
        }
    }
}

fn read_capacity(disk_dir: &Path) -> u64 {
    fs::read_to_string(disk_dir.join("size"))
        .ok()
        .and_then(|value| value.trim().parse::<u64>().ok())
        .map_or(0, |sectors| sectors * SECTOR_BYTES)
}

/// The disk, its partitions, and every device stacked on them at any depth
/// (a partition held by `md0`, itself held by `dm-0`, yields both).
fn stacked_members(root: &Path, name: &str) -> Vec<String> {
    let disk_dir = root.join(name);
    let mut members = vec![name.to_string()];
    let mut pending = holders(&disk_dir);

    let partitions = fs::read_dir(&disk_dir)
        .into_iter()
        .flatten()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().join("partition").is_file());

    for partition in partitions {
        members.push(partition.file_name().to_string_lossy().into_owned());
        pending.extend(holders(&partition.path()));
    }

    while let Some(holder) = pending.pop() {
        if members.contains(&holder) {
            continue;
        }
        pending.extend(holders(&root.join(&holder)));
        members.push(holder);
    }

    members
}

fn holders(dir: &Path) -> Vec<String> {
    fs::read_dir(dir.join("holders"))
        .into_iter()
        .flatten()
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .collect()
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::TempDir;

    #[test]
    fn reads_capacity_and_rotational_flag() {
        let temp = TempDir::new();
        fake::disk(&temp.path, "sda", 2048, Some("1"));
        fake::disk(&temp.path, "nvme0n1", 4096, Some("0"));

        let disks = list_disks(&temp.path).expect("listing");
        assert_eq!(disks.len(), 2);
        assert_eq!(disks[0].name, "nvme0n1");
        assert!(!disks[0].rotational);
        assert_eq!(disks[0].capacity_bytes, 4096 * 512);
        assert_eq!(disks[1].device_path(), "/dev/sda");
        assert!(disks[1].rotational);
    }

    #[test]
    fn unreadable_rotational_flag_counts_as_rotational() {
        let temp = TempDir::new();
        fake::disk(&temp.path, "nvme0n1", 4096, None);

        let disks = list_disks(&temp.path).expect("listing");
        assert!(disks[0].rotational);
    }

    #[test]
    fn collects_partitions_and_their_holders() {
        let temp = TempDir::new();
        fake::disk(&temp.path, "sdb", 2048, Some("1"));
        fake::partition(&temp.path, "sdb", "sdb1");
        fake::holder(&temp.path, "sdb", "sdb1", "dm-0");

        let disks = list_disks(&temp.path).expect("listing");
        let mut members = disks[0].members.clone();
        members.sort();
        assert_eq!(members, vec!["dm-0", "sdb", "sdb1"]);
    }

    #[test]
    fn follows_holders_through_raid_to_device_mapper() {
        let temp = TempDir::new();
        fake::disk(&temp.path, "sdb", 2048, Some("1"));
        fake::partition(&temp.path, "sdb", "sdb1");
        fake::holder(&temp.path, "sdb", "sdb1", "md0");
        fake::disk(&temp.path, "md0", 2048, Some("0"));
        fake::device_holder(&temp.path, "md0", "dm-0");

        let disks = list_disks(&temp.path).expect("listing");
        let sdb = disks.iter().find(|disk| disk.name == "sdb").expect("sdb listed");
        let mut members = sdb.members.clone();
        members.sort();
        assert_eq!(members, vec!["dm-0", "md0", "sdb", "sdb1"]);
    }

    #[test]
    fn missing_block_tree_is_an_error() {
        let temp = TempDir::new();
        let error = list_disks(&temp.path.join("absent")).unwrap_err();
        assert!(error.to_string().starts_with("listing "));
    }
}
