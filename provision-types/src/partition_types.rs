// SPDX-License-Identifier: GPL-3.0-only

//! GPT partition type codes
//!
//! Codes use the short hexadecimal form understood by `sgdisk --typecode`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::LayoutError;

/// Type GUID of an EFI system partition, commonly reused as the unique GUID
/// of the boot partition so firmware entries survive reprovisioning.
pub const EFI_SYSTEM_PARTITION_GUID: &str = "C12A7328-F81F-11D2-BA4B-00A0C93EC93B";

/// Partition types a layout may request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum GptType {
    /// EFI system partition
    Boot,

    /// BIOS boot partition (GRUB core image on GPT)
    BiosBoot,

    /// Linux filesystem
    Linux,

    /// Linux software RAID member
    LinuxRaid,

    /// LVM physical volume
    LinuxLvm,

    /// Linux swap
    Swap,
}

impl GptType {
    pub const ALL: [GptType; 6] = [
        GptType::Boot,
        GptType::BiosBoot,
        GptType::Linux,
        GptType::LinuxRaid,
        GptType::LinuxLvm,
        GptType::Swap,
    ];

    /// Short type code as used by sgdisk
    pub fn code(self) -> &'static str {
        match self {
            GptType::Boot => "ef00",
            GptType::BiosBoot => "ef02",
            GptType::Linux => "8300",
            GptType::LinuxRaid => "fd00",
            GptType::LinuxLvm => "8e00",
            GptType::Swap => "8200",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            GptType::Boot => "boot",
            GptType::BiosBoot => "bios-boot",
            GptType::Linux => "linux",
            GptType::LinuxRaid => "raid",
            GptType::LinuxLvm => "lvm",
            GptType::Swap => "swap",
        }
    }
}

impl fmt::Display for GptType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for GptType {
    type Err = LayoutError;

    /// Accepts either the hex code ("8300") or the short name ("linux").
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        GptType::ALL
            .into_iter()
            .find(|ty| ty.code() == wanted || ty.name() == wanted)
            .ok_or_else(|| LayoutError::UnsupportedGptType(s.to_string()))
    }
}

impl TryFrom<String> for GptType {
    type Error = LayoutError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<GptType> for String {
    fn from(value: GptType) -> Self {
        value.code().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_codes_and_names() {
        assert_eq!("ef00".parse::<GptType>(), Ok(GptType::Boot));
        assert_eq!("EF00".parse::<GptType>(), Ok(GptType::Boot));
        assert_eq!("linux".parse::<GptType>(), Ok(GptType::Linux));
        assert_eq!("fd00".parse::<GptType>(), Ok(GptType::LinuxRaid));
    }

    #[test]
    fn rejects_unknown_codes() {
        assert_eq!(
            "0700".parse::<GptType>(),
            Err(LayoutError::UnsupportedGptType("0700".to_string()))
        );
    }
}
