// SPDX-License-Identifier: GPL-3.0-only

//! Filesystem creation with the mkfs family

use provision_types::{FilesystemFormat, FilesystemPlan};
use tracing::{debug, info};

use crate::cmd::{CommandBuilder, CommandRunner, Tool, ToolCommand};
use crate::error::{Result, WithTarget};

/// Format tool invocation for `plan`, or `None` when there is nothing to create.
pub fn mkfs_command(plan: &FilesystemPlan) -> Option<ToolCommand> {
    let has_label = !plan.label.is_empty();

    let builder = match plan.format {
        FilesystemFormat::Ext3 | FilesystemFormat::Ext4 => {
            let tool = if plan.format == FilesystemFormat::Ext3 {
                Tool::MkfsExt3
            } else {
                Tool::MkfsExt4
            };
            let mut builder = CommandBuilder::new(tool).args(["-v", "-F"]);
            if has_label {
                builder = builder.args(["-L", plan.label.as_str()]);
            }
            builder
        }
        FilesystemFormat::Vfat => {
            // FAT volume labels are case-insensitive and stored upper-case
            let mut builder = CommandBuilder::new(Tool::MkfsVfat).args(["-v", "-F", "32"]);
            if has_label {
                builder = builder.args(["-n".to_string(), plan.label.to_uppercase()]);
            }
            builder
        }
        FilesystemFormat::Swap => {
            let mut builder = CommandBuilder::new(Tool::Mkswap).arg("-f");
            if has_label {
                builder = builder.args(["-L", plan.label.as_str()]);
            }
            builder
        }
        FilesystemFormat::Tmpfs | FilesystemFormat::None => return None,
    };

    Some(
        builder
            .args(plan.create_options.iter().cloned())
            .target(plan.device.as_str())
            .build(),
    )
}

/// Format the single device named by `plan`. Destroys whatever it held.
pub fn format_filesystem(runner: &dyn CommandRunner, plan: &FilesystemPlan) -> Result<()> {
    let Some(command) = mkfs_command(plan) else {
        debug!("{} needs no formatting ({})", plan.device, plan.format);
        return Ok(());
    };

    info!("formatting {} as {}", plan.device, plan.format);
    command
        .run_fatal(runner)
        .with_target(|| format!("filesystem on {}", plan.device))?;
    Ok(())
}
