// SPDX-License-Identifier: GPL-3.0-only

//! Mount table and legacy disk descriptor generation

use std::fmt;
use std::fs;
use std::path::Path;

use provision_types::{DiskDescriptorEntry, FilesystemFormat, FilesystemPlan};
use tracing::info;

use crate::blkid::lookup_uuid;
use crate::cmd::CommandRunner;
use crate::error::{ProvisionError, Result, WithTarget};

/// One line of /etc/fstab
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FstabEntry {
    /// `UUID=...`, or the pseudo filesystem name
    pub spec: String,
    pub mount_path: String,
    pub fstype: String,
    pub options: String,
    pub dump: u8,
    pub pass: u8,
}

impl fmt::Display for FstabEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {} {} {}",
            self.spec, self.mount_path, self.fstype, self.options, self.dump, self.pass
        )
    }
}

/// fsck pass: root first, tmpfs never, everything else after root.
pub fn fsck_pass(plan: &FilesystemPlan) -> u8 {
    if plan.mount_path == "/" {
        1
    } else if plan.format == FilesystemFormat::Tmpfs {
        0
    } else {
        2
    }
}

/// Build the entry for `plan`, looking up the device UUID when needed.
pub fn fstab_entry(runner: &dyn CommandRunner, plan: &FilesystemPlan) -> Result<FstabEntry> {
    let spec = match plan.format {
        FilesystemFormat::Tmpfs => FilesystemFormat::Tmpfs.as_str().to_string(),
        _ => format!("UUID={}", lookup_uuid(runner, &plan.device)?),
    };

    let options = if plan.mount_options.is_empty() {
        "defaults".to_string()
    } else {
        plan.mount_options.join(",")
    };

    Ok(FstabEntry {
        spec,
        mount_path: plan.mount_path.clone(),
        fstype: plan.format.fstab_type().to_string(),
        options,
        dump: 0,
        pass: fsck_pass(plan),
    })
}

pub fn provenance_header() -> String {
    format!(
        "# created by {} {}",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION")
    )
}

pub fn render_fstab(entries: &[FstabEntry]) -> String {
    let mut contents = provenance_header();
    contents.push('\n');
    for entry in entries {
        contents.push_str(&entry.to_string());
        contents.push('\n');
    }
    contents
}

/// Write the mount table for `plans` to `path`, creating parent directories.
pub fn write_fstab(
    runner: &dyn CommandRunner,
    plans: &[FilesystemPlan],
    path: &Path,
) -> Result<Vec<FstabEntry>> {
    let entries = plans
        .iter()
        .map(|plan| {
            fstab_entry(runner, plan).with_target(|| format!("fstab entry for {}", plan.mount_path))
        })
        .collect::<Result<Vec<_>>>()?;

    write_file(path, &render_fstab(&entries))?;
    info!("wrote {} entries to {}", entries.len(), path.display());
    Ok(entries)
}

/// Descriptor entries for the root, efi and varlib filesystems of a layout
pub fn descriptor_entries(
    runner: &dyn CommandRunner,
    plans: &[FilesystemPlan],
) -> Result<Vec<DiskDescriptorEntry>> {
    plans
        .iter()
        .filter(|plan| DiskDescriptorEntry::is_recorded_label(&plan.label))
        .filter(|plan| !matches!(plan.format, FilesystemFormat::Tmpfs | FilesystemFormat::None))
        .map(|plan| {
            Ok(DiskDescriptorEntry {
                label: plan.label.clone(),
                device: plan.device.clone(),
                format: plan.format,
                uuid: lookup_uuid(runner, &plan.device)?,
            })
        })
        .collect()
}

pub fn write_disk_descriptor(
    runner: &dyn CommandRunner,
    plans: &[FilesystemPlan],
    path: &Path,
) -> Result<Vec<DiskDescriptorEntry>> {
    let entries = descriptor_entries(runner, plans)?;
    let json = serde_json::to_string_pretty(&entries)
        .map_err(|error| ProvisionError::Io(std::io::Error::other(error)))?;
    write_file(path, &json)?;
    info!("wrote disk descriptor {}", path.display());
    Ok(entries)
}

fn write_file(path: &Path, contents: &str) -> Result<()> {
    let write = || -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, contents)
    };
    write()
        .map_err(ProvisionError::from)
        .with_target(|| format!("writing {}", path.display()))
}
