// SPDX-License-Identifier: GPL-3.0-only

use serde::{Deserialize, Serialize};

/// Kind of a staged partition operation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Create,
    Delete,
    Format,
    MountPoint,
    Resize,
    /// Kind not set; never applied
    #[default]
    Invalid,
}

impl OperationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Delete => "delete",
            Self::Format => "format",
            Self::MountPoint => "mount_point",
            Self::Resize => "resize",
            Self::Invalid => "invalid",
        }
    }
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One disk-mutating call. An operation maps to one or more steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolStep {
    MakePartition,
    RemovePartition,
    MakeFilesystem,
    ResizePartition,
    ResizeFilesystem,
    RecordMountPoint,
}

impl ToolStep {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::MakePartition => "make_partition",
            Self::RemovePartition => "remove_partition",
            Self::MakeFilesystem => "make_filesystem",
            Self::ResizePartition => "resize_partition",
            Self::ResizeFilesystem => "resize_filesystem",
            Self::RecordMountPoint => "record_mount_point",
        }
    }
}

impl std::fmt::Display for ToolStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
