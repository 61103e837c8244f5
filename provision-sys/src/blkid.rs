// SPDX-License-Identifier: GPL-3.0-only

//! Block device identification via `blkid -o export`

use std::collections::BTreeMap;

use crate::cmd::{CommandBuilder, CommandRunner, Tool};
use crate::error::{ProvisionError, Result};

/// `KEY=VALUE` properties reported for one device
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlockProperties(BTreeMap<String, String>);

impl BlockProperties {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn uuid(&self) -> Option<&str> {
        self.get("UUID")
    }

    pub fn fs_type(&self) -> Option<&str> {
        self.get("TYPE")
    }

    pub fn part_uuid(&self) -> Option<&str> {
        self.get("PARTUUID")
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

/// Parse export lines, skipping any line without exactly one `=`.
pub fn parse_export(output: &str) -> BlockProperties {
    let properties = output
        .lines()
        .filter_map(|line| {
            let line = line.trim();
            let mut parts = line.split('=');
            let key = parts.next()?;
            let value = parts.next()?;
            if parts.next().is_some() || key.is_empty() {
                return None;
            }
            Some((key.to_string(), value.to_string()))
        })
        .collect();

    BlockProperties(properties)
}

/// Read every property blkid reports for `device`.
pub fn read_properties(runner: &dyn CommandRunner, device: &str) -> Result<BlockProperties> {
    let command = CommandBuilder::new(Tool::Blkid)
        .args(["-o", "export"])
        .target(device)
        .build();
    let output = command.run_fatal(runner)?;
    Ok(parse_export(&output.stdout))
}

/// Filesystem UUID of `device`, required for persisted mount identities.
pub fn lookup_uuid(runner: &dyn CommandRunner, device: &str) -> Result<String> {
    let lookup_failed = |source: ProvisionError| ProvisionError::PropertyLookupFailed {
        device: device.to_string(),
        source: Box::new(source),
    };

    let properties = read_properties(runner, device).map_err(lookup_failed)?;
    properties
        .uuid()
        .map(ToString::to_string)
        .ok_or_else(|| {
            lookup_failed(ProvisionError::MissingProperty {
                key: "UUID".to_string(),
            })
        })
}
