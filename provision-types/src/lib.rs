// SPDX-License-Identifier: GPL-3.0-only

//! Declarative storage layout models for node disk provisioning
//!
//! This crate defines the input consumed by every provisioning stage:
//!
//! - `StorageLayout` → the root document, owned by the pipeline driver
//! - `DiskPlan` / `PartitionPlan` → GPT tables to create
//! - `RaidPlan` → software RAID arrays to assemble
//! - `VolumeGroupPlan` / `LogicalVolumePlan` → LVM objects to create
//! - `FilesystemPlan` → filesystems to format and mount
//!
//! String-typed settings that the engine switches on (filesystem format,
//! GPT type code, LVM allocation) are closed enums here, so an unknown value
//! is rejected while the layout is parsed rather than when a tool runs.

pub mod descriptor;
pub mod error;
pub mod filesystem;
pub mod layout;
pub mod lvm;
pub mod partition_types;

pub use descriptor::{DESCRIPTOR_LABELS, DiskDescriptorEntry};
pub use error::LayoutError;
pub use filesystem::{FilesystemFormat, FilesystemPlan};
pub use layout::{DiskPlan, PartitionPlan, RaidPlan, StorageLayout};
pub use lvm::{AllocationType, LogicalVolumePlan, VolumeGroupPlan};
pub use partition_types::{EFI_SYSTEM_PARTITION_GUID, GptType};
