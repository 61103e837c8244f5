// SPDX-License-Identifier: GPL-3.0-only

//! LVM volume group and logical volume creation

use std::collections::{HashMap, HashSet};

use provision_types::{AllocationType, LogicalVolumePlan, VolumeGroupPlan};
use tracing::{debug, info, warn};

use crate::cmd::{CommandBuilder, CommandRunner, Tool, ToolCommand};
use crate::error::{Result, WithTarget};

#[derive(Debug, Clone, PartialEq, Eq)]
struct VgRow {
    name: String,
    pv_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct LvRow {
    vg_name: String,
    lv_name: String,
}

fn parse_tabbed_line(line: &str) -> Vec<String> {
    line.split('\t')
        .map(|part| part.trim().to_string())
        .collect()
}

fn parse_vgs(output: &str) -> Vec<VgRow> {
    output
        .lines()
        .filter_map(|line| {
            let line = line.trim();
            if line.is_empty() {
                return None;
            }
            let cols = parse_tabbed_line(line);
            if cols.len() < 2 {
                return None;
            }
            Some(VgRow {
                name: cols[0].clone(),
                pv_count: cols[1].parse().ok()?,
            })
        })
        .collect()
}

fn parse_lvs(output: &str) -> Vec<LvRow> {
    output
        .lines()
        .filter_map(|line| {
            let line = line.trim();
            if line.is_empty() {
                return None;
            }
            let cols = parse_tabbed_line(line);
            if cols.len() < 2 {
                return None;
            }
            Some(LvRow {
                vg_name: cols[0].clone(),
                lv_name: cols[1].clone(),
            })
        })
        .collect()
}

pub fn vgs_command() -> ToolCommand {
    CommandBuilder::new(Tool::Vgs)
        .args(["--noheadings", "-o", "vg_name,pv_count", "--separator", "\t"])
        .build()
}

pub fn lvs_command() -> ToolCommand {
    CommandBuilder::new(Tool::Lvs)
        .args(["--noheadings", "-o", "vg_name,lv_name", "--separator", "\t"])
        .build()
}

pub fn vgcreate_command(vg: &VolumeGroupPlan) -> ToolCommand {
    let mut builder = CommandBuilder::new(Tool::Vgcreate).arg("--yes");
    for tag in &vg.tags {
        builder = builder.args(["--addtag", tag.as_str()]);
    }
    builder
        .arg(vg.name.as_str())
        .targets(vg.devices.iter().cloned())
        .build()
}

/// Requested allocation, downgraded to linear when the group has too few
/// physical volumes to stripe or mirror across.
pub fn resolve_allocation(lv: &LogicalVolumePlan, pv_count: usize) -> AllocationType {
    if lv.allocation.needs_multiple_pvs() && pv_count < 2 {
        warn!(
            "volume group {} has {pv_count} physical volume(s); creating {} as linear instead of {}",
            lv.volume_group, lv.name, lv.allocation
        );
        return AllocationType::Linear;
    }
    lv.allocation
}

pub fn lvcreate_command(
    lv: &LogicalVolumePlan,
    allocation: AllocationType,
    pv_count: usize,
) -> ToolCommand {
    let mut builder = CommandBuilder::new(Tool::Lvcreate)
        .args(["--yes", "--wipesignatures", "y"])
        .args(["--name", lv.name.as_str()]);

    builder = match lv.explicit_size_mib() {
        Some(size) => builder.args(["--size".to_string(), format!("{size}m")]),
        None => builder.args(["--extents", "100%FREE"]),
    };

    builder = match allocation {
        AllocationType::Linear => builder.args(["--type", "linear"]),
        AllocationType::Striped => builder
            .args(["--type", "striped"])
            .args(["--stripes".to_string(), pv_count.to_string()]),
        AllocationType::Mirrored => builder
            .args(["--type", "raid1"])
            .args(["--mirrors", "1"])
            .arg("--nosync"),
    };

    builder.target(lv.volume_group.as_str()).build()
}

/// Creates volume groups and logical volumes, skipping ones that exist.
///
/// Existing objects are read from `vgs`/`lvs` once, on first use, and the
/// cache is kept current as objects are created.
#[derive(Debug, Default)]
pub struct LvmOrchestrator {
    known: Option<Known>,
}

#[derive(Debug, Default)]
struct Known {
    groups: HashMap<String, usize>,
    volumes: HashSet<(String, String)>,
}

impl LvmOrchestrator {
    pub fn new() -> Self {
        Self::default()
    }

    fn known(&mut self, runner: &dyn CommandRunner) -> Result<&mut Known> {
        if self.known.is_none() {
            let vgs = vgs_command()
                .run_fatal(runner)
                .with_target(|| "listing volume groups".to_string())?;
            let lvs = lvs_command()
                .run_fatal(runner)
                .with_target(|| "listing logical volumes".to_string())?;

            let known = Known {
                groups: parse_vgs(&vgs.stdout)
                    .into_iter()
                    .map(|row| (row.name, row.pv_count))
                    .collect(),
                volumes: parse_lvs(&lvs.stdout)
                    .into_iter()
                    .map(|row| (row.vg_name, row.lv_name))
                    .collect(),
            };
            debug!(
                "found {} existing volume groups and {} logical volumes",
                known.groups.len(),
                known.volumes.len()
            );
            self.known = Some(known);
        }

        Ok(self.known.get_or_insert_with(Known::default))
    }

    /// Physical volume count recorded for `vg`, 0 when unknown
    pub fn pv_count(&self, vg: &str) -> usize {
        self.known
            .as_ref()
            .and_then(|known| known.groups.get(vg).copied())
            .unwrap_or(0)
    }

    pub fn create_volume_groups(
        &mut self,
        runner: &dyn CommandRunner,
        groups: &[VolumeGroupPlan],
    ) -> Result<()> {
        for vg in groups {
            let known = self.known(runner)?;
            if known.groups.contains_key(&vg.name) {
                info!("volume group {} already exists, skipping", vg.name);
                continue;
            }

            info!(
                "creating volume group {} over {}",
                vg.name,
                vg.devices.join(", ")
            );
            vgcreate_command(vg)
                .run_fatal(runner)
                .with_target(|| format!("volume group {}", vg.name))?;
            known.groups.insert(vg.name.clone(), vg.devices.len());
        }
        Ok(())
    }

    pub fn create_logical_volumes(
        &mut self,
        runner: &dyn CommandRunner,
        volumes: &[LogicalVolumePlan],
    ) -> Result<()> {
        for lv in volumes {
            let known = self.known(runner)?;
            let key = (lv.volume_group.clone(), lv.name.clone());
            if known.volumes.contains(&key) {
                info!(
                    "logical volume {}/{} already exists, skipping",
                    lv.volume_group, lv.name
                );
                continue;
            }

            let pv_count = known.groups.get(&lv.volume_group).copied().unwrap_or(0);
            let allocation = resolve_allocation(lv, pv_count);

            info!(
                "creating {allocation} logical volume {}/{}",
                lv.volume_group, lv.name
            );
            lvcreate_command(lv, allocation, pv_count)
                .run_fatal(runner)
                .with_target(|| format!("logical volume {}/{}", lv.volume_group, lv.name))?;
            known.volumes.insert(key);
        }
        Ok(())
    }
}
