// SPDX-License-Identifier: GPL-3.0-only

//! Filesystem plans and the closed set of supported formats

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::LayoutError;

/// Filesystem formats the provisioner knows how to create
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum FilesystemFormat {
    /// ext3 filesystem
    Ext3,

    /// ext4 filesystem
    Ext4,

    /// FAT filesystem, used for the EFI system partition
    Vfat,

    /// Swap area
    Swap,

    /// In-memory filesystem, nothing to format
    Tmpfs,

    /// Leave the device untouched
    #[default]
    None,
}

impl FilesystemFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ext3 => "ext3",
            Self::Ext4 => "ext4",
            Self::Vfat => "vfat",
            Self::Swap => "swap",
            Self::Tmpfs => "tmpfs",
            Self::None => "none",
        }
    }

    /// Type written to the mount table and passed to mount(2)
    pub fn fstab_type(self) -> &'static str {
        match self {
            Self::None => "auto",
            other => other.as_str(),
        }
    }

    /// Whether the device is mounted into the target root during provisioning.
    ///
    /// Swap, tmpfs and untouched devices only show up in the mount table.
    pub fn is_mounted_during_install(self) -> bool {
        matches!(self, Self::Ext3 | Self::Ext4 | Self::Vfat)
    }
}

impl fmt::Display for FilesystemFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FilesystemFormat {
    type Err = LayoutError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ext3" => Ok(Self::Ext3),
            "ext4" => Ok(Self::Ext4),
            "vfat" => Ok(Self::Vfat),
            "swap" => Ok(Self::Swap),
            "tmpfs" => Ok(Self::Tmpfs),
            "none" | "" => Ok(Self::None),
            other => Err(LayoutError::UnsupportedFormat(other.to_string())),
        }
    }
}

impl TryFrom<String> for FilesystemFormat {
    type Error = LayoutError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<FilesystemFormat> for String {
    fn from(value: FilesystemFormat) -> Self {
        value.as_str().to_string()
    }
}

/// A filesystem to create on a partition, RAID array or logical volume
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilesystemPlan {
    /// Block device to format (e.g., "/dev/sda2", "/dev/md0", "/dev/vg0/root")
    pub device: String,

    #[serde(default)]
    pub format: FilesystemFormat,

    /// Mount path inside the target root; empty means format only
    #[serde(default)]
    pub mount_path: String,

    #[serde(default)]
    pub label: String,

    #[serde(default)]
    pub mount_options: Vec<String>,

    /// Extra options handed to the format tool before the device
    #[serde(default)]
    pub create_options: Vec<String>,
}

impl FilesystemPlan {
    pub fn has_mount_path(&self) -> bool {
        !self.mount_path.is_empty()
    }

    /// Number of path components below "/", so "/" is 0 and "/var/lib" is 2.
    pub fn mount_depth(&self) -> usize {
        self.mount_path
            .split('/')
            .filter(|component| !component.is_empty())
            .count()
    }
}
