// SPDX-License-Identifier: GPL-3.0-only

pub mod protocol;
pub mod traits;

pub use protocol::{OperationKind, ToolOutcome, ToolRequest, ToolStep};
pub use traits::PartitionTool;
