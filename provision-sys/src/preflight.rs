// SPDX-License-Identifier: GPL-3.0-only

//! Startup check that every external tool can be located

use tracing::info;

use crate::cmd::Tool;
use crate::error::{ProvisionError, Result};

/// Fail with the full list of tools that are missing from PATH.
pub fn check_tools(tools: &[Tool]) -> Result<()> {
    let missing = missing_tools(tools, |binary| which::which(binary).is_ok());
    if !missing.is_empty() {
        return Err(ProvisionError::MissingTools(missing));
    }

    info!("all {} required tools found", tools.len());
    Ok(())
}

/// Check every tool family the provisioner may invoke.
pub fn check_all_tools() -> Result<()> {
    check_tools(&Tool::ALL)
}

fn missing_tools(tools: &[Tool], is_present: impl Fn(&str) -> bool) -> Vec<String> {
    let mut missing: Vec<String> = tools
        .iter()
        .map(|tool| tool.binary())
        .filter(|binary| !is_present(binary))
        .map(ToString::to_string)
        .collect();
    missing.dedup();
    missing
}
