// SPDX-License-Identifier: GPL-3.0-only

use serde::{Deserialize, Serialize};

use partman_types::{FsType, PartitionRole, partition_node_path};

use super::{OperationKind, ToolStep};

/// Everything the partitioning tool needs for one step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolRequest {
    /// Disk device path (e.g., "/dev/sda")
    pub device_path: String,
    pub kind: OperationKind,
    pub step: ToolStep,
    pub role: PartitionRole,
    /// First sector (inclusive)
    pub start_sector: u64,
    /// End sector (exclusive)
    pub end_sector: u64,
    pub sector_size: u64,
    pub partition_number: Option<u32>,
    pub filesystem: FsType,
    pub label: String,
    pub mount_point: Option<String>,
}

impl ToolRequest {
    /// Partition node path (e.g., "/dev/sda1"), when the number is known
    pub fn partition_path(&self) -> Option<String> {
        self.partition_number
            .map(|number| partition_node_path(&self.device_path, number))
    }

    /// Short description for logs and failure reports
    pub fn describe(&self) -> String {
        format!(
            "{} {} [{}..{})",
            self.step,
            self.partition_path()
                .unwrap_or_else(|| self.device_path.clone()),
            self.start_sector,
            self.end_sector
        )
    }
}

/// Result of one tool step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolOutcome {
    pub success: bool,
    /// Tool output, reported verbatim to the user on failure
    pub diagnostics: String,
}

impl ToolOutcome {
    pub fn ok(diagnostics: impl Into<String>) -> Self {
        Self {
            success: true,
            diagnostics: diagnostics.into(),
        }
    }

    pub fn failed(diagnostics: impl Into<String>) -> Self {
        Self {
            success: false,
            diagnostics: diagnostics.into(),
        }
    }
}
