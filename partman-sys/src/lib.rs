// SPDX-License-Identifier: GPL-3.0-only

//! System side of the installer partition manager
//!
//! - Layered INI settings with typed, fallback-safe reads
//! - A [`PartitionTool`](partman_contracts::PartitionTool) that drives
//!   `parted` and the mkfs family, with a dry-run mode that only renders
//!   the command lines
//!
//! The command tool mutates block devices and must run with root
//! privileges unless in dry-run mode.

pub mod cmd;
pub mod error;
pub mod settings;
pub mod tool;

pub use error::{Result, SysError};
pub use settings::{PartitionDefaults, SETTINGS_ENV, Settings};
pub use tool::{CommandTool, MountEntry, commands_for};
