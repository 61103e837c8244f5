// SPDX-License-Identifier: GPL-3.0-only

use std::path::PathBuf;

use provision_types::LayoutError;
use thiserror::Error;

/// Error types for provisioning operations
#[derive(Error, Debug)]
pub enum ProvisionError {
    #[error("required tool not found in PATH: {tool}")]
    ToolNotFound { tool: String },

    #[error("required tools not found in PATH: {}", .0.join(", "))]
    MissingTools(Vec<String>),

    #[error("`{command}` failed ({}): {output}", status_text(.status))]
    ExecutionFailed {
        command: String,
        status: Option<i32>,
        output: String,
    },

    #[error("unsupported configuration: {0}")]
    UnsupportedConfiguration(String),

    #[error("failed to read block properties of {device}: {source}")]
    PropertyLookupFailed {
        device: String,
        #[source]
        source: Box<ProvisionError>,
    },

    #[error("no {key} reported")]
    MissingProperty { key: String },

    #[error("invalid storage layout: {0}")]
    InvalidLayout(LayoutError),

    #[error("invalid configuration {path:?}: {reason}")]
    Config { path: PathBuf, reason: String },

    #[error("failed to start wipe workers: {0}")]
    WorkerPool(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{target}: {source}")]
    Target {
        target: String,
        #[source]
        source: Box<ProvisionError>,
    },
}

fn status_text(status: &Option<i32>) -> String {
    match status {
        Some(code) => format!("exit status {code}"),
        None => "terminated by signal".to_string(),
    }
}

impl From<LayoutError> for ProvisionError {
    fn from(error: LayoutError) -> Self {
        match error {
            LayoutError::UnsupportedFormat(_)
            | LayoutError::UnsupportedGptType(_)
            | LayoutError::UnsupportedAllocation(_) => {
                ProvisionError::UnsupportedConfiguration(error.to_string())
            }
            other => ProvisionError::InvalidLayout(other),
        }
    }
}

impl ProvisionError {
    /// The innermost error, skipping `Target` wrappers
    pub fn root_cause(&self) -> &ProvisionError {
        match self {
            ProvisionError::Target { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

/// Attach the disk, array, group, volume or filesystem an error belongs to.
pub trait WithTarget<T> {
    fn with_target(self, target: impl FnOnce() -> String) -> Result<T>;
}

impl<T> WithTarget<T> for Result<T> {
    fn with_target(self, target: impl FnOnce() -> String) -> Result<T> {
        self.map_err(|source| ProvisionError::Target {
            target: target(),
            source: Box::new(source),
        })
    }
}

/// Result type alias for provisioning operations
pub type Result<T> = std::result::Result<T, ProvisionError>;
