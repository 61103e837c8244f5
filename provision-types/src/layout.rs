// SPDX-License-Identifier: GPL-3.0-only

//! The storage layout document and its invariants

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    AllocationType, FilesystemFormat, FilesystemPlan, GptType, LayoutError, LogicalVolumePlan,
    VolumeGroupPlan,
};

/// Root input of one provisioning run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageLayout {
    #[serde(default)]
    pub disks: Vec<DiskPlan>,

    #[serde(default)]
    pub raids: Vec<RaidPlan>,

    #[serde(default)]
    pub volume_groups: Vec<VolumeGroupPlan>,

    #[serde(default)]
    pub logical_volumes: Vec<LogicalVolumePlan>,

    #[serde(default)]
    pub filesystems: Vec<FilesystemPlan>,
}

/// GPT table to write on one disk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiskPlan {
    /// Whole-disk device path (e.g., "/dev/sda")
    pub device: String,

    /// Wipe every existing signature before the table is created
    #[serde(default, alias = "Wipeonreinstall")]
    pub wipe_on_reinstall: bool,

    /// Partitions in table order
    #[serde(default)]
    pub partitions: Vec<PartitionPlan>,
}

/// One GPT partition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionPlan {
    /// 1-based partition number
    pub number: u32,

    #[serde(default)]
    pub label: String,

    /// Size in MiB; absent, zero or negative consumes the rest of the disk
    #[serde(default)]
    pub size_mib: Option<i64>,

    pub gpt_type: GptType,

    /// Explicit partition GUID
    #[serde(default)]
    pub gpt_guid: Option<String>,
}

impl PartitionPlan {
    pub fn is_rest_of_disk(&self) -> bool {
        self.size_mib.is_none_or(|size| size <= 0)
    }

    /// End offset as understood by `sgdisk --new`, "0" being the end of the disk
    pub fn size_argument(&self) -> String {
        match self.size_mib {
            Some(size) if size > 0 => format!("{size}M"),
            _ => "0".to_string(),
        }
    }
}

/// Software RAID array to assemble
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RaidPlan {
    /// Array device name (e.g., "/dev/md0")
    pub name: String,

    /// RAID level as mdadm understands it ("0", "1", "5", ...)
    pub level: String,

    /// Member devices; the last `spares` of them become hot spares
    pub devices: Vec<String>,

    #[serde(default)]
    pub spares: usize,

    /// Additional mdadm flags forwarded verbatim
    #[serde(default)]
    pub options: Vec<String>,
}

impl RaidPlan {
    /// Number of active members, the value of `--raid-devices`
    pub fn active_devices(&self) -> usize {
        self.devices.len().saturating_sub(self.spares)
    }
}

impl StorageLayout {
    pub fn from_toml_str(input: &str) -> Result<Self, LayoutError> {
        let document: Value =
            toml::from_str(input).map_err(|error| LayoutError::Parse(error.to_string()))?;
        Self::from_document(document)
    }

    pub fn from_json_str(input: &str) -> Result<Self, LayoutError> {
        let document: Value =
            serde_json::from_str(input).map_err(|error| LayoutError::Parse(error.to_string()))?;
        Self::from_document(document)
    }

    /// Closed-enum fields go through their own parsers first, so an unknown
    /// value keeps its typed error instead of becoming a parse failure.
    fn from_document(document: Value) -> Result<Self, LayoutError> {
        check_enum_fields(&document)?;
        serde_json::from_value(document).map_err(|error| LayoutError::Parse(error.to_string()))
    }

    /// Check the invariants every stage relies on.
    pub fn validate(&self) -> Result<(), LayoutError> {
        for disk in &self.disks {
            validate_disk(disk)?;
        }

        for raid in &self.raids {
            if raid.devices.is_empty() {
                return Err(LayoutError::RaidWithoutMembers {
                    name: raid.name.clone(),
                });
            }
            if raid.spares >= raid.devices.len() {
                return Err(LayoutError::TooManySpares {
                    name: raid.name.clone(),
                    spares: raid.spares,
                    members: raid.devices.len(),
                });
            }
        }

        let mut group_names = HashSet::new();
        for vg in &self.volume_groups {
            if !group_names.insert(vg.name.as_str()) {
                return Err(LayoutError::DuplicateVolumeGroup {
                    name: vg.name.clone(),
                });
            }
            if vg.devices.is_empty() {
                return Err(LayoutError::VolumeGroupWithoutMembers {
                    name: vg.name.clone(),
                });
            }
        }

        // Groups not declared here may already exist on disk, so only the
        // empty name is an error.
        for lv in &self.logical_volumes {
            if lv.volume_group.is_empty() {
                return Err(LayoutError::MissingVolumeGroup {
                    name: lv.name.clone(),
                });
            }
        }

        for fs in &self.filesystems {
            if fs.device.is_empty() {
                return Err(LayoutError::MissingFilesystemDevice {
                    mount_path: fs.mount_path.clone(),
                });
            }
        }

        Ok(())
    }
}

fn validate_disk(disk: &DiskPlan) -> Result<(), LayoutError> {
    if disk.device.is_empty() {
        return Err(LayoutError::EmptyDiskDevice);
    }

    let mut numbers = HashSet::new();
    let last = disk.partitions.len().saturating_sub(1);

    for (index, partition) in disk.partitions.iter().enumerate() {
        if partition.number == 0 {
            return Err(LayoutError::InvalidPartitionNumber {
                device: disk.device.clone(),
                number: partition.number,
            });
        }
        if !numbers.insert(partition.number) {
            return Err(LayoutError::DuplicatePartitionNumber {
                device: disk.device.clone(),
                number: partition.number,
            });
        }
        if partition.is_rest_of_disk() && index != last {
            return Err(LayoutError::RestOfDiskNotLast {
                device: disk.device.clone(),
                number: partition.number,
            });
        }
        if let Some(guid) = &partition.gpt_guid
            && uuid::Uuid::parse_str(guid).is_err()
        {
            return Err(LayoutError::InvalidGuid {
                device: disk.device.clone(),
                number: partition.number,
                guid: guid.clone(),
            });
        }
    }

    Ok(())
}

fn entries<'a>(value: &'a Value, key: &str) -> impl Iterator<Item = &'a Value> {
    value.get(key).and_then(Value::as_array).into_iter().flatten()
}

fn string_field<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    value.get(key).and_then(Value::as_str)
}

fn check_enum_fields(document: &Value) -> Result<(), LayoutError> {
    for filesystem in entries(document, "filesystems") {
        if let Some(format) = string_field(filesystem, "format") {
            format.parse::<FilesystemFormat>()?;
        }
    }

    for volume in entries(document, "logical_volumes") {
        if let Some(allocation) = string_field(volume, "allocation") {
            allocation.parse::<AllocationType>()?;
        }
    }

    for disk in entries(document, "disks") {
        for partition in entries(disk, "partitions") {
            if let Some(gpt_type) = string_field(partition, "gpt_type") {
                gpt_type.parse::<GptType>()?;
            }
        }
    }

    Ok(())
}
