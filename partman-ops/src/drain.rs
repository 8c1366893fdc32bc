// SPDX-License-Identifier: GPL-3.0-only

//! Replaying the queue against the disk
//!
//! The queue is handed to a single blocking worker which applies each
//! operation in order and stops at the first failure. Cancellation is only
//! looked at between operations; a step already running on the device is
//! always allowed to finish.

use std::sync::Arc;

use serde::Serialize;
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use partman_contracts::{OperationKind, PartitionTool};

use crate::OperationQueue;

/// The operation that halted a drain
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DrainFailure {
    /// Zero-based queue position
    pub index: usize,
    pub kind: OperationKind,
    /// Failing step and the tool's diagnostics, verbatim
    pub reason: String,
}

/// Outcome of one drain
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DrainResult {
    /// Operations fully applied, counted from the front of the queue
    pub applied_count: usize,
    pub failure: Option<DrainFailure>,
    /// The drain stopped early because it was cancelled
    pub cancelled: bool,
}

impl DrainResult {
    pub fn is_complete(&self) -> bool {
        self.failure.is_none() && !self.cancelled
    }
}

/// Apply every queued operation in order, stopping at the first failure.
///
/// Blocks for as long as the tool does. Call from a worker thread, or use
/// [`spawn_drain`].
pub fn drain(
    queue: &OperationQueue,
    tool: &dyn PartitionTool,
    cancel: &CancellationToken,
) -> DrainResult {
    let mut result = DrainResult::default();
    info!(operations = queue.len(), tool = tool.name(), "draining operation queue");

    for (index, op) in queue.iter().enumerate() {
        if cancel.is_cancelled() {
            info!(applied = result.applied_count, "drain cancelled");
            result.cancelled = true;
            return result;
        }

        if let Err(failure) = op.apply_to_disk(tool) {
            warn!(
                index,
                operation = %op,
                applied = result.applied_count,
                "drain halted: {failure}"
            );
            result.failure = Some(DrainFailure {
                index,
                kind: op.kind(),
                reason: failure.to_string(),
            });
            return result;
        }
        result.applied_count += 1;
    }

    info!(applied = result.applied_count, "drain complete");
    result
}

/// A drain running on the blocking pool
#[derive(Debug)]
pub struct DrainHandle {
    cancel: CancellationToken,
    task: JoinHandle<DrainResult>,
}

impl DrainHandle {
    /// Ask the worker to stop before its next operation
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub async fn wait(self) -> Result<DrainResult, JoinError> {
        self.task.await
    }
}

/// Hand `queue` to a blocking worker and drain it there.
///
/// Must be called from within a tokio runtime.
pub fn spawn_drain<T>(queue: OperationQueue, tool: Arc<T>) -> DrainHandle
where
    T: PartitionTool + ?Sized + 'static,
{
    let cancel = CancellationToken::new();
    let task_cancel = cancel.clone();
    let task = tokio::task::spawn_blocking(move || drain(&queue, &tool, &task_cancel));
    DrainHandle { cancel, task }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Operation;
    use crate::testing::RecordingTool;
    use partman_contracts::{ToolOutcome, ToolRequest, ToolStep};
    use partman_types::{FsType, Partition, PartitionRole};
    use std::sync::{Mutex, mpsc};

    /// Holds its first request until the test lets it through
    struct GatedTool {
        inner: RecordingTool,
        gate: Mutex<Option<mpsc::Receiver<()>>>,
    }

    impl PartitionTool for GatedTool {
        fn name(&self) -> &str {
            "gated"
        }

        fn execute(&self, request: &ToolRequest) -> ToolOutcome {
            let gate = self.gate.lock().unwrap().take();
            if let Some(gate) = gate {
                gate.recv().unwrap();
            }
            self.inner.execute(request)
        }
    }

    fn new_partition() -> Partition {
        Partition {
            device_path: "/dev/sda".to_string(),
            number: Some(1),
            start_sector: 2048,
            end_sector: 206_848,
            sector_size: 512,
            role: PartitionRole::Primary,
            filesystem: FsType::Ext4,
            mount_point: None,
            label: String::new(),
        }
    }

    /// [Create(A), Format(A, xfs), Delete(A)]
    fn create_format_delete() -> OperationQueue {
        let gap = Partition::unallocated("/dev/sda", 2048, 1_000_000, 512);
        let created = new_partition();
        let mut formatted = created.clone();
        formatted.filesystem = FsType::Xfs;

        let mut queue = OperationQueue::new();
        queue
            .push(Operation::new(OperationKind::Create, gap, created.clone()).unwrap())
            .unwrap();
        queue
            .push(Operation::new(OperationKind::Format, created, formatted.clone()).unwrap())
            .unwrap();
        queue
            .push(
                Operation::new(
                    OperationKind::Delete,
                    formatted,
                    Partition::unallocated("/dev/sda", 0, 0, 512),
                )
                .unwrap(),
            )
            .unwrap();
        queue
    }

    #[test]
    fn failing_delete_reports_two_applied() {
        let queue = create_format_delete();
        let tool =
            RecordingTool::new().fail_on(ToolStep::RemovePartition, "Error: Partition busy");

        let result = drain(&queue, &tool, &CancellationToken::new());
        assert_eq!(result.applied_count, 2);
        assert_eq!(
            result.failure,
            Some(DrainFailure {
                index: 2,
                kind: OperationKind::Delete,
                reason: "remove_partition failed: Error: Partition busy".to_string(),
            })
        );
        assert!(!result.cancelled);
    }

    #[test]
    fn nothing_after_the_failure_is_attempted() {
        let queue = create_format_delete();
        let tool =
            RecordingTool::new().fail_on_kind(OperationKind::Format, "mkfs.xfs: no such device");

        let result = drain(&queue, &tool, &CancellationToken::new());
        assert_eq!(result.applied_count, 1);
        assert_eq!(result.failure.as_ref().map(|f| f.index), Some(1));
        assert!(!tool.steps().contains(&ToolStep::RemovePartition));
    }

    #[test]
    fn full_drain_applies_everything() {
        let queue = create_format_delete();
        let tool = RecordingTool::new();

        let result = drain(&queue, &tool, &CancellationToken::new());
        assert!(result.is_complete());
        assert_eq!(result.applied_count, 3);
        assert_eq!(
            tool.steps(),
            vec![
                ToolStep::MakePartition,
                ToolStep::MakeFilesystem,
                ToolStep::MakeFilesystem,
                ToolStep::RemovePartition
            ]
        );
    }

    #[test]
    fn cancelled_before_start_applies_nothing() {
        let queue = create_format_delete();
        let tool = RecordingTool::new();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = drain(&queue, &tool, &cancel);
        assert!(result.cancelled);
        assert_eq!(result.applied_count, 0);
        assert!(tool.requests().is_empty());
    }

    #[tokio::test]
    async fn spawned_drain_returns_one_result() {
        let tool = Arc::new(RecordingTool::new());
        let handle = spawn_drain(create_format_delete(), Arc::clone(&tool));

        let result = handle.wait().await.unwrap();
        assert_eq!(result.applied_count, 3);
        assert_eq!(tool.requests().len(), 4);
    }

    #[tokio::test]
    async fn handle_token_stops_the_worker_after_the_running_operation() {
        let (go, gate) = mpsc::channel();
        let tool = Arc::new(GatedTool {
            inner: RecordingTool::new(),
            gate: Mutex::new(Some(gate)),
        });
        let handle = spawn_drain(create_format_delete(), Arc::clone(&tool));

        handle.cancellation_token().cancel();
        go.send(()).unwrap();

        let result = handle.wait().await.unwrap();
        assert!(result.cancelled);
        assert_eq!(result.applied_count, 1);
        let steps: Vec<ToolStep> = tool.inner.requests().iter().map(|r| r.step).collect();
        assert_eq!(steps, [ToolStep::MakePartition, ToolStep::MakeFilesystem]);
    }
}
