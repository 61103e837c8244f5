//! LVM (Logical Volume Manager) plans
//!
//! Volume groups to create over raw disks, partitions or RAID arrays, and the
//! logical volumes carved out of them.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::LayoutError;

/// How a logical volume's extents are laid out across physical volumes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum AllocationType {
    /// Extents allocated one physical volume after another
    #[default]
    Linear,

    /// Extents striped across every physical volume of the group
    Striped,

    /// One mirror leg on a second physical volume
    Mirrored,
}

impl AllocationType {
    pub fn as_str(self) -> &'static str {
        match self {
            AllocationType::Linear => "linear",
            AllocationType::Striped => "striped",
            AllocationType::Mirrored => "mirrored",
        }
    }

    /// Striped and mirrored layouts need at least two physical volumes.
    pub fn needs_multiple_pvs(self) -> bool {
        !matches!(self, AllocationType::Linear)
    }
}

impl fmt::Display for AllocationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AllocationType {
    type Err = LayoutError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "linear" | "" => Ok(AllocationType::Linear),
            "striped" => Ok(AllocationType::Striped),
            "mirrored" | "raid1" => Ok(AllocationType::Mirrored),
            other => Err(LayoutError::UnsupportedAllocation(other.to_string())),
        }
    }
}

impl TryFrom<String> for AllocationType {
    type Error = LayoutError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<AllocationType> for String {
    fn from(value: AllocationType) -> Self {
        value.as_str().to_string()
    }
}

/// Volume group to create
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeGroupPlan {
    /// Volume group name
    pub name: String,

    /// Physical volume devices (disks, partitions or RAID arrays)
    pub devices: Vec<String>,

    #[serde(default)]
    pub tags: Vec<String>,
}

/// Logical volume to create inside a volume group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogicalVolumePlan {
    /// Logical volume name
    pub name: String,

    /// Owning volume group name
    pub volume_group: String,

    /// Size in MiB; absent or zero takes all free extents
    #[serde(default)]
    pub size_mib: Option<u64>,

    #[serde(default)]
    pub allocation: AllocationType,
}

impl LogicalVolumePlan {
    /// Explicit size, if one was requested
    pub fn explicit_size_mib(&self) -> Option<u64> {
        self.size_mib.filter(|size| *size > 0)
    }

    /// Device node udev creates for the volume (e.g., "/dev/vg0/root")
    pub fn device_path(&self) -> String {
        format!("/dev/{}/{}", self.volume_group, self.name)
    }
}
