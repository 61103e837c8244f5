// SPDX-License-Identifier: GPL-3.0-only

//! Software RAID assembly with mdadm

use std::fs;

use provision_types::RaidPlan;
use tracing::{info, warn};

use crate::cmd::{CommandBuilder, CommandRunner, Tool, ToolCommand};
use crate::config::RaidConfig;
use crate::error::{Result, WithTarget};

/// Levels whose members hold no parity, so an initial resync copies nothing
/// that matters. Parity levels must always resync.
pub fn skips_initial_resync(level: &str) -> bool {
    let level = level.trim();
    let level = level.strip_prefix("raid").unwrap_or(level);
    matches!(level, "0" | "1")
}

/// `mdadm --create` for `raid`, member devices last in plan order.
pub fn create_command(raid: &RaidPlan) -> ToolCommand {
    CommandBuilder::new(Tool::Mdadm)
        .args(["--create", raid.name.as_str()])
        .args(["--force", "--run"])
        .arg(format!("--level={}", raid.level))
        .arg(format!("--raid-devices={}", raid.active_devices()))
        .arg("--homehost=any")
        .arg_if(skips_initial_resync(&raid.level), "--assume-clean")
        .arg_if(raid.spares > 0, format!("--spare-devices={}", raid.spares))
        .args(raid.options.iter().cloned())
        .targets(raid.devices.iter().cloned())
        .build()
}

/// Create the array described by `raid` and nudge the kernel resync speed.
pub fn create_array(
    runner: &dyn CommandRunner,
    raid: &RaidPlan,
    config: &RaidConfig,
) -> Result<()> {
    info!(
        "creating raid{} array {} over {} devices ({} spares)",
        raid.level,
        raid.name,
        raid.devices.len(),
        raid.spares
    );

    create_command(raid)
        .run_fatal(runner)
        .with_target(|| format!("raid {}", raid.name))?;

    raise_resync_speed(config);
    Ok(())
}

fn raise_resync_speed(config: &RaidConfig) {
    if let Err(error) = fs::write(
        &config.speed_limit_path,
        config.speed_limit_min.to_string(),
    ) {
        warn!(
            "failed to raise raid resync speed via {:?}, continuing: {error}",
            config.speed_limit_path
        );
    }
}
