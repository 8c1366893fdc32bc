// SPDX-License-Identifier: GPL-3.0-only

//! Turning user choices into validated operations
//!
//! The planner owns the resource rules: partition slots, numbering, size
//! limits and mount point conflicts. Everything it rejects is rejected here,
//! before an operation can reach the queue. All lookups go against the
//! preview list the user is looking at.

use serde::{Deserialize, Serialize};
use tracing::debug;

use partman_contracts::OperationKind;
use partman_types::{
    ALIGNMENT_BYTES, FsType, MEBIBYTE, Partition, PartitionList, PartitionRole, align_down,
    align_up,
};

use crate::{Operation, OperationError};

/// Smallest partition the installer creates unless configured otherwise
pub const DEFAULT_MINIMUM_SIZE: u64 = 100 * MEBIBYTE;

pub const BOOT_MOUNT_POINT: &str = "/boot";

/// Which end of the free region a new partition sticks to
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Alignment {
    #[default]
    Start,
    End,
}

/// What the user asked for in the new-partition dialog
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPartition {
    pub role: PartitionRole,
    pub align: Alignment,
    pub filesystem: FsType,
    pub mount_point: Option<String>,
    pub size_bytes: u64,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Planner {
    pub minimum_size_bytes: u64,
    /// Default size of a `/boot` partition, 0 when unset
    pub boot_size_bytes: u64,
    /// Default size of an EFI system partition, 0 when unset
    pub efi_size_bytes: u64,
    pub default_filesystem: FsType,
}

impl Default for Planner {
    fn default() -> Self {
        Self {
            minimum_size_bytes: DEFAULT_MINIMUM_SIZE,
            boot_size_bytes: 0,
            efi_size_bytes: 0,
            default_filesystem: FsType::Ext4,
        }
    }
}

impl Planner {
    /// Size to pre-fill for a new partition, when there is a configured one
    pub fn suggested_size(&self, filesystem: FsType, mount_point: Option<&str>) -> Option<u64> {
        let size = if filesystem == FsType::Efi {
            self.efi_size_bytes
        } else if mount_point == Some(BOOT_MOUNT_POINT) {
            self.boot_size_bytes
        } else {
            0
        };
        (size > 0).then_some(size)
    }

    /// Smallest size accepted for a partition holding `filesystem` at
    /// `mount_point`. EFI and `/boot` never go below their default size.
    pub fn minimum_size(&self, filesystem: FsType, mount_point: Option<&str>) -> u64 {
        self.suggested_size(filesystem, mount_point)
            .map_or(self.minimum_size_bytes, |size| {
                size.max(self.minimum_size_bytes)
            })
    }

    /// Plan a new partition inside the free region `gap` of `list`.
    pub fn plan_create(
        &self,
        list: &PartitionList,
        gap: &Partition,
        request: &NewPartition,
    ) -> Result<Operation, OperationError> {
        let kind = OperationKind::Create;
        if !gap.is_unallocated() || list.find_gap_containing(&gap.range()).is_none() {
            return Err(OperationError::NotUnallocated { kind });
        }

        let slot_free = match request.role {
            PartitionRole::Primary => list.can_add_primary(gap),
            PartitionRole::Logical => list.can_add_logical(gap),
            PartitionRole::Extended => list.can_add_extended(gap),
            PartitionRole::Unallocated => return Err(OperationError::NotAPartition { kind }),
        };
        let number = list
            .next_number(request.role)
            .filter(|_| slot_free)
            .ok_or(OperationError::NoSlotAvailable { role: request.role })?;

        // An extended partition is a plain container.
        let (filesystem, mount_point) = if request.role == PartitionRole::Extended {
            (FsType::Empty, None)
        } else {
            (request.filesystem, normalize_mount_point(request.mount_point.as_deref()))
        };
        self.check_mount_point(list, None, filesystem, mount_point.as_deref())?;

        if request.role != PartitionRole::Extended {
            let minimum = self.minimum_size(filesystem, mount_point.as_deref());
            if request.size_bytes < minimum {
                return Err(OperationError::BelowMinimumSize {
                    requested: request.size_bytes,
                    minimum,
                });
            }
        }

        let sector_size = gap.sector_size.max(1);
        let sectors = request.size_bytes / sector_size;
        if sectors == 0 {
            return Err(OperationError::BelowMinimumSize {
                requested: request.size_bytes,
                minimum: sector_size,
            });
        }
        // Each logical partition is preceded by its extended boot record.
        let reserved = if request.role == PartitionRole::Logical {
            alignment_grid(gap.sector_size)
        } else {
            0
        };
        let available = gap.length().saturating_sub(reserved);
        if sectors > available {
            return Err(OperationError::InsufficientSpace {
                requested: sectors,
                available,
            });
        }

        let (start, end) = place(gap, reserved, sectors, request.align);
        debug!(
            role = %request.role,
            number,
            start,
            end,
            "planned new partition"
        );

        let target = Partition {
            device_path: gap.device_path.clone(),
            number: Some(number),
            start_sector: start,
            end_sector: end,
            sector_size: gap.sector_size,
            role: request.role,
            filesystem,
            mount_point,
            label: request.label.clone(),
        };
        Operation::new(kind, gap.clone(), target)
    }

    pub fn plan_delete(
        &self,
        list: &PartitionList,
        partition: &Partition,
    ) -> Result<Operation, OperationError> {
        if partition.role == PartitionRole::Extended
            && list.used().any(|p| p.role == PartitionRole::Logical)
        {
            return Err(OperationError::ExtendedNotEmpty);
        }
        let freed = Partition::unallocated(
            &partition.device_path,
            partition.start_sector,
            partition.end_sector,
            partition.sector_size,
        );
        Operation::new(OperationKind::Delete, partition.clone(), freed)
    }

    /// Reformat in place. A filesystem that cannot be mounted drops the
    /// partition's mount point.
    pub fn plan_format(
        &self,
        partition: &Partition,
        filesystem: FsType,
    ) -> Result<Operation, OperationError> {
        let mut target = partition.clone();
        target.filesystem = filesystem;
        if !filesystem.supports_mount_point() {
            target.mount_point = None;
        }
        Operation::new(OperationKind::Format, partition.clone(), target)
    }

    /// Assign, change or clear (`None` or empty) the mount point.
    pub fn plan_mount_point(
        &self,
        list: &PartitionList,
        partition: &Partition,
        mount_point: Option<&str>,
    ) -> Result<Operation, OperationError> {
        let mount_point = normalize_mount_point(mount_point);
        self.check_mount_point(
            list,
            Some(partition),
            partition.filesystem,
            mount_point.as_deref(),
        )?;
        let mut target = partition.clone();
        target.mount_point = mount_point;
        Operation::new(OperationKind::MountPoint, partition.clone(), target)
    }

    /// Change the size of `partition`, keeping its start sector.
    pub fn plan_resize(
        &self,
        list: &PartitionList,
        partition: &Partition,
        size_bytes: u64,
    ) -> Result<Operation, OperationError> {
        if partition.filesystem != FsType::Empty && !partition.filesystem.is_resizable() {
            return Err(OperationError::ResizeUnsupported {
                filesystem: partition.filesystem,
            });
        }

        let sector_size = partition.sector_size.max(1);
        let sectors = size_bytes / sector_size;

        if partition.role == PartitionRole::Extended {
            // The container has to keep every logical inside it.
            let needed = list
                .used()
                .filter(|p| p.role == PartitionRole::Logical)
                .map(|p| p.end_sector)
                .max()
                .map_or(0, |end| end - partition.start_sector);
            if sectors < needed {
                return Err(OperationError::BelowMinimumSize {
                    requested: size_bytes,
                    minimum: needed * sector_size,
                });
            }
        } else {
            let minimum =
                self.minimum_size(partition.filesystem, partition.mount_point.as_deref());
            if size_bytes < minimum {
                return Err(OperationError::BelowMinimumSize {
                    requested: size_bytes,
                    minimum,
                });
            }
        }

        let bounds = list.growth_bounds(partition);
        let available = bounds.end.saturating_sub(partition.start_sector);
        if sectors > available {
            return Err(OperationError::InsufficientSpace {
                requested: sectors,
                available,
            });
        }

        let mut target = partition.clone();
        target.end_sector = partition.start_sector + sectors;
        Operation::new(OperationKind::Resize, partition.clone(), target)
    }

    fn check_mount_point(
        &self,
        list: &PartitionList,
        owner: Option<&Partition>,
        filesystem: FsType,
        mount_point: Option<&str>,
    ) -> Result<(), OperationError> {
        let Some(mount_point) = mount_point else {
            return Ok(());
        };
        if !filesystem.supports_mount_point() {
            return Err(OperationError::MountPointUnsupported { filesystem });
        }
        let taken = list.used().any(|p| {
            p.mount_point.as_deref() == Some(mount_point)
                && !owner.is_some_and(|owner| owner.same_geometry(p))
        });
        if taken {
            return Err(OperationError::MountPointInUse {
                mount_point: mount_point.to_string(),
            });
        }
        Ok(())
    }
}

fn normalize_mount_point(mount_point: Option<&str>) -> Option<String> {
    mount_point
        .map(str::trim)
        .filter(|mount_point| !mount_point.is_empty())
        .map(str::to_string)
}

/// Sectors per 1 MiB alignment unit
fn alignment_grid(sector_size: u64) -> u64 {
    (ALIGNMENT_BYTES / sector_size.max(1)).max(1)
}

/// Sector range of `sectors` inside `gap`, leaving the first `reserved`
/// sectors free and aligned to the 1 MiB grid at the requested end when
/// there is room for it
fn place(gap: &Partition, reserved: u64, sectors: u64, align: Alignment) -> (u64, u64) {
    let grid = alignment_grid(gap.sector_size);
    let first = gap.start_sector + reserved;
    match align {
        Alignment::Start => {
            let start = align_up(first, grid);
            if start + sectors <= gap.end_sector {
                (start, start + sectors)
            } else {
                (first, first + sectors)
            }
        }
        Alignment::End => {
            let end = align_down(gap.end_sector, grid);
            if end >= first + sectors {
                (end - sectors, end)
            } else {
                (gap.end_sector - sectors, gap.end_sector)
            }
        }
    }
}
