// SPDX-License-Identifier: GPL-3.0-only

//! Disk application of operations
//!
//! Each operation becomes one or more [`ToolRequest`]s, issued in order
//! through a [`PartitionTool`]. The calls block and mutate the device, so
//! this only runs on the drain worker.

use tracing::{debug, error, info, warn};

use partman_contracts::{OperationKind, PartitionTool, ToolRequest, ToolStep};
use partman_types::Partition;

use crate::{DiskFailure, Operation};

impl Operation {
    /// Tool requests for this operation, in the order they must run.
    ///
    /// Resizes order the two halves so the partition table never describes
    /// a partition smaller than the filesystem it holds.
    pub fn tool_requests(&self) -> Vec<ToolRequest> {
        let original = self.original();
        let target = self.target();

        match self.kind() {
            OperationKind::Create => {
                let mut steps = vec![self.request(ToolStep::MakePartition, target)];
                if target.filesystem.is_creatable() {
                    steps.push(self.request(ToolStep::MakeFilesystem, target));
                }
                if has_mount_point(target) {
                    steps.push(self.request(ToolStep::RecordMountPoint, target));
                }
                steps
            }
            OperationKind::Delete => vec![self.request(ToolStep::RemovePartition, original)],
            OperationKind::Format => vec![self.request(ToolStep::MakeFilesystem, target)],
            OperationKind::MountPoint => vec![self.request(ToolStep::RecordMountPoint, target)],
            OperationKind::Resize => {
                let partition = self.request(ToolStep::ResizePartition, target);
                if !target.filesystem.is_resizable() {
                    return vec![partition];
                }
                let filesystem = self.request(ToolStep::ResizeFilesystem, target);
                if target.length() < original.length() {
                    vec![filesystem, partition]
                } else {
                    vec![partition, filesystem]
                }
            }
            OperationKind::Invalid => Vec::new(),
        }
    }

    /// Run this operation against the device.
    ///
    /// Stops at the first failing step; steps already done stay done. An
    /// `Invalid` operation is a programming error: it panics in debug builds
    /// and does nothing in release builds.
    pub fn apply_to_disk(&self, tool: &dyn PartitionTool) -> Result<(), DiskFailure> {
        if self.kind() == OperationKind::Invalid {
            error!("invalid operation reached the disk applier");
            debug_assert!(false, "invalid operation reached the disk applier");
            return Ok(());
        }

        info!(operation = %self, tool = tool.name(), "applying to disk");
        for request in self.tool_requests() {
            debug!(step = %request.step, "{}", request.describe());
            let outcome = tool.execute(&request);
            if !outcome.success {
                warn!(
                    step = %request.step,
                    diagnostics = %outcome.diagnostics,
                    "disk step failed: {}",
                    request.describe()
                );
                return Err(DiskFailure {
                    step: request.step,
                    diagnostics: outcome.diagnostics,
                });
            }
        }
        Ok(())
    }

    fn request(&self, step: ToolStep, partition: &Partition) -> ToolRequest {
        ToolRequest {
            device_path: partition.device_path.clone(),
            kind: self.kind(),
            step,
            role: partition.role,
            start_sector: partition.start_sector,
            end_sector: partition.end_sector,
            sector_size: partition.sector_size,
            partition_number: partition.number,
            filesystem: partition.filesystem,
            label: partition.label.clone(),
            mount_point: partition.mount_point.clone(),
        }
    }
}

fn has_mount_point(partition: &Partition) -> bool {
    partition
        .mount_point
        .as_deref()
        .is_some_and(|mount_point| !mount_point.is_empty())
}
