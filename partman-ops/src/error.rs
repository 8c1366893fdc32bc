// SPDX-License-Identifier: GPL-3.0-only

use thiserror::Error;

use partman_contracts::{OperationKind, ToolStep};
use partman_types::{FsType, ListError, PartitionRole};

/// Rejections raised while building an operation, before anything is queued
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OperationError {
    #[error("not enough free space: requested {requested} sectors, {available} available")]
    InsufficientSpace { requested: u64, available: u64 },

    #[error("no slot left for a new {role} partition")]
    NoSlotAvailable { role: PartitionRole },

    #[error("requested size of {requested} bytes is below the minimum of {minimum} bytes")]
    BelowMinimumSize { requested: u64, minimum: u64 },

    #[error("{kind} needs an unallocated region as its original partition")]
    NotUnallocated { kind: OperationKind },

    #[error("{kind} needs an existing partition, got unallocated space")]
    NotAPartition { kind: OperationKind },

    #[error("{kind} must not change partition boundaries")]
    GeometryChanged { kind: OperationKind },

    #[error("{kind} must not change the filesystem")]
    FilesystemChanged { kind: OperationKind },

    #[error("resize cannot move the start sector from {from} to {to}")]
    StartMoved { from: u64, to: u64 },

    #[error("{filesystem} filesystems cannot be resized")]
    ResizeUnsupported { filesystem: FsType },

    #[error("{kind} does not change anything")]
    NoChange { kind: OperationKind },

    #[error("original and target live on different devices ({original} vs {target})")]
    DeviceMismatch { original: String, target: String },

    #[error("{filesystem} filesystems do not take a mount point")]
    MountPointUnsupported { filesystem: FsType },

    #[error("mount point {mount_point:?} is already used by another partition")]
    MountPointInUse { mount_point: String },

    #[error("extended partition still holds logical partitions")]
    ExtendedNotEmpty,

    #[error("{kind} cannot change the partition role from {from} to {to}")]
    RoleChanged {
        kind: OperationKind,
        from: PartitionRole,
        to: PartitionRole,
    },
}

/// Programming errors while folding an operation into a preview list.
///
/// These indicate a front-end or ordering bug, never a user mistake.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApplyError {
    #[error("{kind} operation references a partition that is not in the list ({device} [{start}..{end}))")]
    StaleReference {
        kind: OperationKind,
        device: String,
        start: u64,
        end: u64,
    },

    #[error("invalid operation reached an applier")]
    InvalidOperation,

    #[error("{kind} operation conflicts with the current layout: {reason}")]
    Conflict { kind: OperationKind, reason: String },

    #[error("rebuilt layout is inconsistent: {0}")]
    Layout(#[from] ListError),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError {
    #[error("invalid operation cannot be queued")]
    InvalidOperation,

    #[error("{kind} operation references sectors {start}..{end} on {device} removed by an earlier delete")]
    ReferencesDeleted {
        kind: OperationKind,
        device: String,
        start: u64,
        end: u64,
    },

    #[error(transparent)]
    Apply(#[from] ApplyError),
}

/// A disk step the tool reported as failed
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{step} failed: {diagnostics}")]
pub struct DiskFailure {
    pub step: ToolStep,
    /// Tool output, verbatim
    pub diagnostics: String,
}
