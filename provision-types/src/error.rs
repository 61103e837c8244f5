// SPDX-License-Identifier: GPL-3.0-only

use thiserror::Error;

/// Problems found while parsing or validating a storage layout
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LayoutError {
    #[error("unsupported filesystem format: {0:?}")]
    UnsupportedFormat(String),

    #[error("unsupported GPT type: {0:?}")]
    UnsupportedGptType(String),

    #[error("unsupported LVM allocation type: {0:?}")]
    UnsupportedAllocation(String),

    #[error("failed to parse layout: {0}")]
    Parse(String),

    #[error("disk plan has an empty device path")]
    EmptyDiskDevice,

    #[error("{device}: partition number {number} is invalid (numbers start at 1)")]
    InvalidPartitionNumber { device: String, number: u32 },

    #[error("{device}: partition number {number} is declared twice")]
    DuplicatePartitionNumber { device: String, number: u32 },

    #[error("{device}: partition {number} consumes the rest of the disk but is not last")]
    RestOfDiskNotLast { device: String, number: u32 },

    #[error("{device}: partition {number} has an invalid GUID override {guid:?}")]
    InvalidGuid {
        device: String,
        number: u32,
        guid: String,
    },

    #[error("raid {name}: no member devices")]
    RaidWithoutMembers { name: String },

    #[error("raid {name}: {spares} spares leave no active members out of {members}")]
    TooManySpares {
        name: String,
        spares: usize,
        members: usize,
    },

    #[error("volume group {name} is declared twice")]
    DuplicateVolumeGroup { name: String },

    #[error("volume group {name}: no member devices")]
    VolumeGroupWithoutMembers { name: String },

    #[error("logical volume {name}: no owning volume group")]
    MissingVolumeGroup { name: String },

    #[error("filesystem for mount path {mount_path:?} has no device")]
    MissingFilesystemDevice { mount_path: String },
}
