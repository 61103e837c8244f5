// SPDX-License-Identifier: GPL-3.0-only

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use provision_sys::config::load_layout;
use provision_sys::preflight::check_all_tools;
use provision_sys::{ProvisionConfig, Provisioner, SyscallMounter, SystemRunner, wipe_disks};
use tracing_subscriber::{EnvFilter, fmt};

#[derive(Debug, Parser)]
#[command(name = "disk-provision")]
#[command(about = "Partition, assemble, format and mount storage from a declarative layout")]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Check that every external tool is installed
    Preflight,

    /// Erase every eligible disk on this host
    Wipe {
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Provision the target root from a layout file
    Apply {
        /// Layout file, TOML or JSON
        #[arg(long)]
        layout: PathBuf,

        #[arg(long)]
        config: Option<PathBuf>,

        /// Wipe all host disks first
        #[arg(long)]
        reinstall: bool,

        /// Unmount everything again once the target is written
        #[arg(long)]
        teardown: bool,
    },

    /// Validate a layout file and print it as JSON
    Plan {
        #[arg(long)]
        layout: PathBuf,
    },
}

fn main() -> Result<()> {
    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("disk_provision=info,provision_sys=info,warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    match args.command {
        Command::Preflight => {
            check_all_tools()?;
            println!("all required tools found");
        }
        Command::Plan { layout } => {
            let layout = load_layout(&layout)?;
            layout.validate()?;
            println!("{}", serde_json::to_string_pretty(&layout)?);
        }
        Command::Wipe { config } => {
            require_root()?;
            let config = ProvisionConfig::load(config.as_deref())?;
            check_all_tools()?;

            let summary = wipe_disks(&SystemRunner, &config.wipe)?;
            for (device, method) in &summary.wiped {
                println!("wiped {device} ({method})");
            }
            for skipped in &summary.skipped {
                println!("skipped {}: {}", skipped.device, skipped.reason);
            }
            for (device, failure) in &summary.failed {
                println!("failed {device}: {failure}");
            }
            if !summary.is_clean() {
                anyhow::bail!("{} disk(s) could not be wiped", summary.failed.len());
            }
        }
        Command::Apply {
            layout,
            config,
            reinstall,
            teardown,
        } => {
            require_root()?;
            let config = ProvisionConfig::load(config.as_deref())?;
            let storage = load_layout(&layout)
                .with_context(|| format!("loading layout {}", layout.display()))?;
            check_all_tools()?;

            let mut provisioned = Provisioner::new(&SystemRunner, &config)
                .reinstall(reinstall)
                .run(&storage, SyscallMounter)?;

            tracing::info!(
                "target ready at {} with {} fstab entries",
                provisioned.mounts.root().display(),
                provisioned.fstab.len()
            );
            if teardown {
                provisioned.mounts.teardown();
            }
        }
    }

    Ok(())
}

fn require_root() -> Result<()> {
    if unsafe { libc::geteuid() } != 0 {
        tracing::error!("disk-provision must run as root");
        anyhow::bail!("root privileges are required");
    }
    Ok(())
}
