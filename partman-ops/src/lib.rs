// SPDX-License-Identifier: GPL-3.0-only

//! Partition operation model
//!
//! - [`Operation`] → one staged change (original and target snapshots)
//! - [`OperationQueue`] → staged changes in confirmation order
//! - [`Operation::apply_to_visual`] → preview list after a change
//! - [`Operation::apply_to_disk`] → the change, issued through a [`PartitionTool`]
//! - [`drain`] / [`spawn_drain`] → the whole queue on one worker
//! - [`Planner`] → user choices checked against the preview and turned into operations
//!
//! [`PartitionTool`]: partman_contracts::PartitionTool

pub mod disk;
pub mod drain;
pub mod error;
pub mod operation;
pub mod planner;
pub mod queue;
pub mod testing;
pub mod visual;

pub use drain::{DrainFailure, DrainHandle, DrainResult, drain, spawn_drain};
pub use error::{ApplyError, DiskFailure, OperationError, QueueError};
pub use operation::Operation;
pub use planner::{Alignment, DEFAULT_MINIMUM_SIZE, NewPartition, Planner};
pub use queue::OperationQueue;
