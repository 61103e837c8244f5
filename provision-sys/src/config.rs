// SPDX-License-Identifier: GPL-3.0-only

//! Provisioner configuration and storage layout files

use std::fs;
use std::path::{Path, PathBuf};

use provision_types::StorageLayout;
use serde::{Deserialize, Serialize};

use crate::error::{ProvisionError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvisionConfig {
    /// Root prefix every planned mount lands under
    pub target_root: PathBuf,

    /// Mount table path, relative to the target root
    pub fstab_path: PathBuf,

    /// Legacy disk descriptor path, relative to the target root
    pub disk_descriptor_path: PathBuf,

    /// Host path whose presence enables the efivarfs mount
    pub efivars_path: PathBuf,

    pub raid: RaidConfig,

    pub wipe: WipeConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RaidConfig {
    /// Minimum resync speed in KiB/s
    pub speed_limit_min: u64,

    pub speed_limit_path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WipeConfig {
    /// Disk name prefixes that are never wiped
    pub ignore_prefixes: Vec<String>,

    /// Block size of the dd overwrite fallback, in bytes
    pub block_size: u64,

    pub sysfs_block_root: PathBuf,

    pub mountinfo_path: PathBuf,
}

impl Default for ProvisionConfig {
    fn default() -> Self {
        Self {
            target_root: PathBuf::from("/target"),
            fstab_path: PathBuf::from("etc/fstab"),
            disk_descriptor_path: PathBuf::from("etc/provision/disk.json"),
            efivars_path: PathBuf::from("/sys/firmware/efi/efivars"),
            raid: RaidConfig::default(),
            wipe: WipeConfig::default(),
        }
    }
}

impl Default for RaidConfig {
    fn default() -> Self {
        Self {
            speed_limit_min: 200_000,
            speed_limit_path: PathBuf::from("/proc/sys/dev/raid/speed_limit_min"),
        }
    }
}

impl Default for WipeConfig {
    fn default() -> Self {
        Self {
            ignore_prefixes: ["loop", "ram", "zram", "sr", "fd", "nbd", "dm-", "md"]
                .into_iter()
                .map(String::from)
                .collect(),
            block_size: 4096,
            sysfs_block_root: PathBuf::from("/sys/block"),
            mountinfo_path: PathBuf::from("/proc/self/mountinfo"),
        }
    }
}

impl ProvisionConfig {
    pub fn from_toml_str(input: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(input)
    }

    /// Load configuration, falling back to defaults when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };

        let raw = fs::read_to_string(path).map_err(|error| ProvisionError::Config {
            path: path.to_path_buf(),
            reason: error.to_string(),
        })?;

        let config = Self::from_toml_str(&raw).map_err(|error| ProvisionError::Config {
            path: path.to_path_buf(),
            reason: error.to_string(),
        })?;

        if config.wipe.block_size == 0 {
            return Err(ProvisionError::Config {
                path: path.to_path_buf(),
                reason: "wipe.block_size must be greater than zero".to_string(),
            });
        }

        Ok(config)
    }

    /// Absolute path of `relative` inside the target root
    pub fn in_target(&self, relative: impl AsRef<Path>) -> PathBuf {
        join_under(&self.target_root, relative.as_ref())
    }
}

/// Join `path` below `root`, treating an absolute `path` as root-relative.
pub fn join_under(root: &Path, path: &Path) -> PathBuf {
    match path.strip_prefix("/") {
        Ok(relative) => root.join(relative),
        Err(_) => root.join(path),
    }
}

/// Read a layout file, JSON when the extension says so and TOML otherwise.
pub fn load_layout(path: &Path) -> Result<StorageLayout> {
    let raw = fs::read_to_string(path).map_err(|error| ProvisionError::Config {
        path: path.to_path_buf(),
        reason: error.to_string(),
    })?;

    let is_json = path
        .extension()
        .is_some_and(|extension| extension.eq_ignore_ascii_case("json"));
    let layout = if is_json {
        StorageLayout::from_json_str(&raw)
    } else {
        StorageLayout::from_toml_str(&raw)
    };

    Ok(layout?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::TempDir;

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = ProvisionConfig::from_toml_str(
            "target_root = \"/mnt/node\"\n[wipe]\nblock_size = 512\n",
        )
        .expect("config parses");

        assert_eq!(config.target_root, PathBuf::from("/mnt/node"));
        assert_eq!(config.wipe.block_size, 512);
        assert!(config.wipe.ignore_prefixes.iter().any(|p| p == "loop"));
        assert_eq!(config.raid.speed_limit_min, 200_000);
    }

    #[test]
    fn resolves_paths_inside_target() {
        let config = ProvisionConfig::default();
        assert_eq!(config.in_target("etc/fstab"), PathBuf::from("/target/etc/fstab"));
        assert_eq!(config.in_target("/var/lib"), PathBuf::from("/target/var/lib"));
        assert_eq!(config.in_target("/"), PathBuf::from("/target"));
    }

    #[test]
    fn zero_block_size_is_rejected() {
        let temp = TempDir::new();
        let path = temp.path.join("provision.toml");
        fs::write(&path, "[wipe]\nblock_size = 0\n").expect("write config");

        let error = ProvisionConfig::load(Some(&path)).unwrap_err();
        assert!(matches!(error, ProvisionError::Config { .. }));
        assert_eq!(ProvisionConfig::load(None).expect("defaults"), ProvisionConfig::default());
    }

    #[test]
    fn layout_format_follows_extension() {
        let temp = TempDir::new();
        let json = temp.path.join("layout.json");
        let toml = temp.path.join("layout.toml");
        fs::write(
            &json,
            r#"{"filesystems":[{"device":"/dev/sda2","format":"ext4","mount_path":"/"}]}"#,
        )
        .expect("write json");
        fs::write(
            &toml,
            "[[filesystems]]\ndevice = \"/dev/sda2\"\nformat = \"ext4\"\nmount_path = \"/\"\n",
        )
        .expect("write toml");

        assert_eq!(
            load_layout(&json).expect("json layout"),
            load_layout(&toml).expect("toml layout")
        );
    }

    #[test]
    fn unknown_enum_values_in_layout_are_unsupported() {
        let temp = TempDir::new();
        let path = temp.path.join("layout.toml");
        fs::write(&path, "[[filesystems]]\ndevice = \"/dev/sda1\"\nformat = \"xfs\"\n")
            .expect("write layout");

        let error = load_layout(&path).unwrap_err();
        assert!(matches!(error, ProvisionError::UnsupportedConfiguration(_)), "{error}");
        assert!(error.to_string().contains("xfs"));

        let json = temp.path.join("layout.json");
        fs::write(
            &json,
            r#"{"logical_volumes":[{"name":"data","volume_group":"vg0","allocation":"thin"}]}"#,
        )
        .expect("write layout");

        let error = load_layout(&json).unwrap_err();
        assert!(matches!(error, ProvisionError::UnsupportedConfiguration(_)), "{error}");
        assert!(error.to_string().contains("thin"));
    }
}
