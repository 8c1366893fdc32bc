// SPDX-License-Identifier: GPL-3.0-only

pub mod operations;
pub mod request;

pub use operations::{OperationKind, ToolStep};
pub use request::{ToolOutcome, ToolRequest};
