// SPDX-License-Identifier: GPL-3.0-only

//! A single staged change to one partition
//!
//! An `Operation` pairs the partition as it was when the user selected it
//! (`original`) with the partition as it should become (`target`). Both are
//! owned snapshots; the operation never points into a live list, and it is
//! never mutated once built. A changed mind is a new operation.

use std::fmt;

use partman_contracts::OperationKind;
use partman_types::{FsType, Partition};

use crate::OperationError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operation {
    kind: OperationKind,
    original: Partition,
    target: Partition,
}

impl Operation {
    /// Build an operation, enforcing the rules of its kind.
    ///
    /// `Invalid` is accepted here so that guard values can exist; the queue
    /// and both appliers refuse to act on it.
    pub fn new(
        kind: OperationKind,
        original: Partition,
        target: Partition,
    ) -> Result<Self, OperationError> {
        validate(kind, &original, &target)?;
        Ok(Self {
            kind,
            original,
            target,
        })
    }

    /// Guard value for "no operation chosen yet"
    pub fn invalid() -> Self {
        let placeholder = Partition::unallocated("", 0, 0, 0);
        Self {
            kind: OperationKind::Invalid,
            original: placeholder.clone(),
            target: placeholder,
        }
    }

    pub fn kind(&self) -> OperationKind {
        self.kind
    }

    /// The partition as it was when the operation was built
    pub fn original(&self) -> &Partition {
        &self.original
    }

    /// The partition as it becomes. Ignored for `Delete`.
    pub fn target(&self) -> &Partition {
        &self.target
    }

    pub fn device_path(&self) -> &str {
        &self.original.device_path
    }

    /// The partition state this operation leaves behind, `None` when it
    /// removes the partition (or does nothing).
    pub fn resulting(&self) -> Option<&Partition> {
        match self.kind {
            OperationKind::Create
            | OperationKind::Format
            | OperationKind::MountPoint
            | OperationKind::Resize => Some(&self.target),
            OperationKind::Delete | OperationKind::Invalid => None,
        }
    }

    /// Same kind with the original kept and a newer target. Used when
    /// collapsing successive edits of one partition.
    pub(crate) fn retarget(&self, target: Partition) -> Result<Self, OperationError> {
        Self::new(self.kind, self.original.clone(), target)
    }
}

impl Default for Operation {
    fn default() -> Self {
        Self::invalid()
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let subject = &self.original;
        write!(
            f,
            "{} {} [{}..{})",
            self.kind,
            subject.display_name(),
            subject.start_sector,
            subject.end_sector
        )?;
        match self.kind {
            OperationKind::Create => write!(
                f,
                " -> {} [{}..{}) {}",
                self.target.role,
                self.target.start_sector,
                self.target.end_sector,
                self.target.filesystem
            ),
            OperationKind::Format => write!(f, " -> {}", self.target.filesystem),
            OperationKind::MountPoint => write!(
                f,
                " -> {}",
                self.target.mount_point.as_deref().unwrap_or("(none)")
            ),
            OperationKind::Resize => write!(
                f,
                " -> [{}..{})",
                self.target.start_sector, self.target.end_sector
            ),
            OperationKind::Delete | OperationKind::Invalid => Ok(()),
        }
    }
}

fn validate(
    kind: OperationKind,
    original: &Partition,
    target: &Partition,
) -> Result<(), OperationError> {
    if kind == OperationKind::Invalid {
        return Ok(());
    }

    if kind != OperationKind::Delete && original.device_path != target.device_path {
        return Err(OperationError::DeviceMismatch {
            original: original.device_path.clone(),
            target: target.device_path.clone(),
        });
    }

    match kind {
        OperationKind::Create => {
            if !original.is_unallocated() {
                return Err(OperationError::NotUnallocated { kind });
            }
            if target.is_unallocated() {
                return Err(OperationError::NotAPartition { kind });
            }
            if target.length() == 0 {
                return Err(OperationError::BelowMinimumSize {
                    requested: 0,
                    minimum: target.sector_size,
                });
            }
            if !original.range().contains(&target.range()) {
                return Err(OperationError::InsufficientSpace {
                    requested: target.length(),
                    available: original.length(),
                });
            }
            check_mount_point(target)
        }
        OperationKind::Delete => {
            if original.is_unallocated() {
                return Err(OperationError::NotAPartition { kind });
            }
            Ok(())
        }
        OperationKind::Format => {
            check_in_place(kind, original, target)?;
            if original.filesystem == target.filesystem {
                return Err(OperationError::NoChange { kind });
            }
            check_mount_point(target)
        }
        OperationKind::MountPoint => {
            check_in_place(kind, original, target)?;
            if original.filesystem != target.filesystem {
                return Err(OperationError::FilesystemChanged { kind });
            }
            if original.mount_point == target.mount_point {
                return Err(OperationError::NoChange { kind });
            }
            check_mount_point(target)
        }
        OperationKind::Resize => {
            if original.is_unallocated() {
                return Err(OperationError::NotAPartition { kind });
            }
            if original.role != target.role {
                return Err(OperationError::RoleChanged {
                    kind,
                    from: original.role,
                    to: target.role,
                });
            }
            if original.range() == target.range() {
                return Err(OperationError::NoChange { kind });
            }
            // Only the end moves on disk.
            if original.start_sector != target.start_sector {
                return Err(OperationError::StartMoved {
                    from: original.start_sector,
                    to: target.start_sector,
                });
            }
            if original.filesystem != target.filesystem {
                return Err(OperationError::FilesystemChanged { kind });
            }
            if target.filesystem != FsType::Empty && !target.filesystem.is_resizable() {
                return Err(OperationError::ResizeUnsupported {
                    filesystem: target.filesystem,
                });
            }
            if target.length() == 0 {
                return Err(OperationError::BelowMinimumSize {
                    requested: 0,
                    minimum: target.sector_size,
                });
            }
            Ok(())
        }
        OperationKind::Invalid => Ok(()),
    }
}

/// Shared rules for the kinds that keep the partition where it is
fn check_in_place(
    kind: OperationKind,
    original: &Partition,
    target: &Partition,
) -> Result<(), OperationError> {
    if original.is_unallocated() {
        return Err(OperationError::NotAPartition { kind });
    }
    if original.role != target.role {
        return Err(OperationError::RoleChanged {
            kind,
            from: original.role,
            to: target.role,
        });
    }
    if original.range() != target.range() {
        return Err(OperationError::GeometryChanged { kind });
    }
    Ok(())
}

fn check_mount_point(target: &Partition) -> Result<(), OperationError> {
    match target.mount_point.as_deref() {
        Some(mount_point) if !mount_point.is_empty() => {
            if target.filesystem.supports_mount_point() {
                Ok(())
            } else {
                Err(OperationError::MountPointUnsupported {
                    filesystem: target.filesystem,
                })
            }
        }
        _ => Ok(()),
    }
}
