// SPDX-License-Identifier: GPL-3.0-only

//! GPT partition table creation with sgdisk

use provision_types::DiskPlan;
use tracing::info;

use crate::cmd::{CommandBuilder, CommandRunner, Tool, ToolCommand};
use crate::error::{Result, WithTarget};

/// `wipefs --all <disk>`: drop every filesystem, RAID and table signature.
pub fn wipe_signatures_command(device: &str) -> ToolCommand {
    CommandBuilder::new(Tool::Wipefs)
        .arg("--all")
        .target(device)
        .build()
}

/// One sgdisk invocation creating every partition in declaration order.
pub fn table_command(disk: &DiskPlan) -> ToolCommand {
    let mut builder = CommandBuilder::new(Tool::Sgdisk);

    for partition in &disk.partitions {
        let number = partition.number;
        builder = builder
            .arg(format!("-n={number}:0:{}", partition.size_argument()))
            .arg(format!("-c={number}:{}", partition.label))
            .arg(format!("-t={number}:{}", partition.gpt_type.code()));

        if let Some(guid) = &partition.gpt_guid {
            builder = builder.arg(format!("-u={number}:{guid}"));
        }
    }

    builder.target(&disk.device).build()
}

/// Create the partition table described by `disk`.
///
/// A failed signature wipe is only logged, the disk may simply be blank.
pub fn create_partitions(runner: &dyn CommandRunner, disk: &DiskPlan) -> Result<()> {
    if disk.wipe_on_reinstall {
        wipe_signatures_command(&disk.device)
            .run_best_effort(runner)
            .log(&format!("signature wipe of {}", disk.device));
    }

    info!(
        "creating {} partitions on {}",
        disk.partitions.len(),
        disk.device
    );
    table_command(disk)
        .run_fatal(runner)
        .with_target(|| format!("disk {}", disk.device))?;

    Ok(())
}
