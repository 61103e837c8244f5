// SPDX-License-Identifier: GPL-3.0-only

//! Legacy disk descriptor document
//!
//! Older consumers read a JSON list describing the root, EFI and /var/lib
//! filesystems instead of parsing the mount table.

use serde::{Deserialize, Serialize};

use crate::FilesystemFormat;

/// Filesystem labels recorded in the descriptor
pub const DESCRIPTOR_LABELS: [&str; 3] = ["root", "efi", "varlib"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiskDescriptorEntry {
    pub label: String,
    pub device: String,
    pub format: FilesystemFormat,
    pub uuid: String,
}

impl DiskDescriptorEntry {
    pub fn is_recorded_label(label: &str) -> bool {
        DESCRIPTOR_LABELS.contains(&label)
    }
}
