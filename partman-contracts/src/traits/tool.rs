// SPDX-License-Identifier: GPL-3.0-only

use std::sync::Arc;

use crate::{ToolOutcome, ToolRequest};

/// The external partitioning tool.
///
/// Calls block until the step finished on disk, so implementations are only
/// ever driven from the drain worker. Ordinary failures are reported through
/// [`ToolOutcome`], never by panicking.
pub trait PartitionTool: Send + Sync {
    fn name(&self) -> &str;

    fn execute(&self, request: &ToolRequest) -> ToolOutcome;
}

impl<T: PartitionTool + ?Sized> PartitionTool for Arc<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn execute(&self, request: &ToolRequest) -> ToolOutcome {
        (**self).execute(request)
    }
}

impl<T: PartitionTool + ?Sized> PartitionTool for Box<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn execute(&self, request: &ToolRequest) -> ToolOutcome {
        (**self).execute(request)
    }
}
