// SPDX-License-Identifier: GPL-3.0-only

//! Ordered partition layout of one device
//!
//! A `PartitionList` always tiles the usable sector range of its device:
//! every sector belongs either to a used partition or to an explicit
//! unallocated entry. Logical partitions (and the free space between them)
//! sit inside the single extended partition, which is listed right before
//! its first child. Lists are never edited in place; every staged change
//! produces a new list through [`PartitionList::with_used`].

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{Partition, PartitionRole, PartitionTableType, SectorRange};

/// First partition number handed to logical partitions on MS-DOS tables
pub const FIRST_LOGICAL_NUMBER: u32 = 5;

/// Highest logical partition number we hand out
const MAX_LOGICAL_NUMBER: u32 = 63;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ListError {
    #[error("partition on {found} does not belong to {expected}")]
    DeviceMismatch { expected: String, found: String },

    #[error("partition end sector {end} precedes its start sector {start}")]
    InvertedRange { start: u64, end: u64 },

    #[error("partition {start}..{end} lies outside the usable range {usable_start}..{usable_end}")]
    OutOfRange {
        start: u64,
        end: u64,
        usable_start: u64,
        usable_end: u64,
    },

    #[error("partition starting at sector {start} overlaps the previous entry ending at {previous_end}")]
    Overlap { start: u64, previous_end: u64 },

    #[error("logical partition starting at sector {start} is not inside an extended partition")]
    OrphanLogical { start: u64 },

    #[error("{device} has more than one extended partition")]
    MultipleExtended { device: String },

    #[error("{table:?} partition tables cannot hold {role} partitions")]
    RoleNotSupported {
        table: PartitionTableType,
        role: PartitionRole,
    },
}

/// Serializable description of a device layout (used partitions only)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiskLayout {
    /// Device path (e.g., "/dev/sda")
    pub device_path: String,

    /// Logical sector size in bytes
    pub sector_size: u64,

    #[serde(default)]
    pub table: PartitionTableType,

    /// Sectors available for partitions (excludes GPT headers etc.)
    pub usable: SectorRange,

    #[serde(default)]
    pub partitions: Vec<Partition>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PartitionList {
    device_path: String,
    sector_size: u64,
    table: PartitionTableType,
    usable: SectorRange,
    entries: Vec<Partition>,
}

impl PartitionList {
    /// Build a list from the used partitions of a device. Unallocated entries
    /// in `partitions` are ignored and re-derived.
    pub fn new(
        device_path: impl Into<String>,
        sector_size: u64,
        table: PartitionTableType,
        usable: SectorRange,
        partitions: Vec<Partition>,
    ) -> Result<Self, ListError> {
        let mut list = Self {
            device_path: device_path.into(),
            sector_size,
            table,
            usable,
            entries: Vec::new(),
        };
        list.entries = list.tile(partitions)?;
        Ok(list)
    }

    /// A device without any partitions
    pub fn empty(
        device_path: impl Into<String>,
        sector_size: u64,
        table: PartitionTableType,
        usable: SectorRange,
    ) -> Self {
        let device_path = device_path.into();
        let entries = if usable.is_empty() {
            Vec::new()
        } else {
            vec![Partition::unallocated(
                &device_path,
                usable.start,
                usable.end,
                sector_size,
            )]
        };
        Self {
            device_path,
            sector_size,
            table,
            usable,
            entries,
        }
    }

    pub fn from_layout(layout: DiskLayout) -> Result<Self, ListError> {
        Self::new(
            layout.device_path,
            layout.sector_size,
            layout.table,
            layout.usable,
            layout.partitions,
        )
    }

    pub fn to_layout(&self) -> DiskLayout {
        DiskLayout {
            device_path: self.device_path.clone(),
            sector_size: self.sector_size,
            table: self.table,
            usable: self.usable,
            partitions: self.used().cloned().collect(),
        }
    }

    /// Same device, different set of used partitions
    pub fn with_used(&self, partitions: Vec<Partition>) -> Result<Self, ListError> {
        Ok(Self {
            device_path: self.device_path.clone(),
            sector_size: self.sector_size,
            table: self.table,
            usable: self.usable,
            entries: self.tile(partitions)?,
        })
    }

    /// Same entries with one replaced; length and all other entries untouched.
    /// The replacement keeps the geometry and role of the entry it replaces.
    pub fn substitute(&self, index: usize, replacement: Partition) -> Option<Self> {
        let current = self.entries.get(index)?;
        if !current.same_geometry(&replacement) || current.role != replacement.role {
            return None;
        }
        let mut entries = self.entries.clone();
        entries[index] = replacement;
        Some(Self {
            entries,
            ..self.clone()
        })
    }

    /// Sort, validate and fill the gaps between used partitions.
    fn tile(&self, partitions: Vec<Partition>) -> Result<Vec<Partition>, ListError> {
        let mut used: Vec<Partition> = partitions
            .into_iter()
            .filter(|p| !p.is_unallocated())
            .collect();

        for partition in &used {
            if partition.device_path != self.device_path {
                return Err(ListError::DeviceMismatch {
                    expected: self.device_path.clone(),
                    found: partition.device_path.clone(),
                });
            }
            if partition.end_sector < partition.start_sector {
                return Err(ListError::InvertedRange {
                    start: partition.start_sector,
                    end: partition.end_sector,
                });
            }
            if !self.usable.contains(&partition.range()) {
                return Err(ListError::OutOfRange {
                    start: partition.start_sector,
                    end: partition.end_sector,
                    usable_start: self.usable.start,
                    usable_end: self.usable.end,
                });
            }
            if partition.role != PartitionRole::Primary && !self.table.supports_logical() {
                return Err(ListError::RoleNotSupported {
                    table: self.table,
                    role: partition.role,
                });
            }
        }

        used.sort_by_key(|p| (p.start_sector, p.role != PartitionRole::Extended));

        let (logicals, outer): (Vec<Partition>, Vec<Partition>) = used
            .into_iter()
            .partition(|p| p.role == PartitionRole::Logical);

        let mut extended = outer.iter().filter(|p| p.role == PartitionRole::Extended);
        let extended_range = extended.next().map(Partition::range);
        if extended.next().is_some() {
            return Err(ListError::MultipleExtended {
                device: self.device_path.clone(),
            });
        }

        for logical in &logicals {
            if !extended_range.is_some_and(|range| range.contains(&logical.range())) {
                return Err(ListError::OrphanLogical {
                    start: logical.start_sector,
                });
            }
        }

        let mut entries = Vec::with_capacity(outer.len() * 2 + logicals.len() * 2 + 1);
        let mut cursor = self.usable.start;
        for partition in outer {
            self.push_gap_then(&mut entries, &mut cursor, partition.start_sector)?;
            cursor = partition.end_sector;

            if partition.role == PartitionRole::Extended {
                let mut inner = partition.start_sector;
                let end = partition.end_sector;
                entries.push(partition);
                for logical in &logicals {
                    self.push_gap_then(&mut entries, &mut inner, logical.start_sector)?;
                    inner = logical.end_sector;
                    entries.push(logical.clone());
                }
                if inner < end {
                    entries.push(self.gap(inner, end));
                }
            } else {
                entries.push(partition);
            }
        }
        if cursor < self.usable.end {
            entries.push(self.gap(cursor, self.usable.end));
        }

        Ok(entries)
    }

    fn push_gap_then(
        &self,
        entries: &mut Vec<Partition>,
        cursor: &mut u64,
        next_start: u64,
    ) -> Result<(), ListError> {
        if next_start < *cursor {
            return Err(ListError::Overlap {
                start: next_start,
                previous_end: *cursor,
            });
        }
        if next_start > *cursor {
            entries.push(self.gap(*cursor, next_start));
        }
        Ok(())
    }

    fn gap(&self, start: u64, end: u64) -> Partition {
        Partition::unallocated(&self.device_path, start, end, self.sector_size)
    }

    pub fn device_path(&self) -> &str {
        &self.device_path
    }

    pub fn sector_size(&self) -> u64 {
        self.sector_size
    }

    pub fn table(&self) -> PartitionTableType {
        self.table
    }

    pub fn usable(&self) -> SectorRange {
        self.usable
    }

    pub fn entries(&self) -> &[Partition] {
        &self.entries
    }

    pub fn get(&self, index: usize) -> Option<&Partition> {
        self.entries.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Partition> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries that are not unallocated placeholders
    pub fn used(&self) -> impl Iterator<Item = &Partition> {
        self.entries.iter().filter(|p| !p.is_unallocated())
    }

    pub fn extended(&self) -> Option<&Partition> {
        self.entries
            .iter()
            .find(|p| p.role == PartitionRole::Extended)
    }

    pub fn is_inside_extended(&self, range: &SectorRange) -> bool {
        self.extended()
            .is_some_and(|extended| extended.range().contains(range))
    }

    /// Sectors covered by the list. The extended container is skipped since
    /// its logicals and inner gaps already cover it.
    pub fn coverage(&self) -> u64 {
        self.entries
            .iter()
            .filter(|p| p.role != PartitionRole::Extended)
            .map(Partition::length)
            .sum()
    }

    pub fn free_sectors(&self) -> u64 {
        self.entries
            .iter()
            .filter(|p| p.is_unallocated())
            .map(Partition::length)
            .sum()
    }

    /// Locate the entry `partition` refers to: same device and role, and an
    /// overlapping range. An exact geometry match wins over a mere overlap.
    pub fn find_matching(&self, partition: &Partition) -> Option<usize> {
        let candidates = || {
            self.entries.iter().enumerate().filter(|(_, entry)| {
                entry.role == partition.role && entry.device_path == partition.device_path
            })
        };
        candidates()
            .find(|(_, entry)| entry.range() == partition.range())
            .or_else(|| candidates().find(|(_, entry)| entry.overlaps(partition)))
            .map(|(index, _)| index)
    }

    /// Index of the unallocated entry that fully contains `range`
    pub fn find_gap_containing(&self, range: &SectorRange) -> Option<usize> {
        self.entries
            .iter()
            .position(|entry| entry.is_unallocated() && entry.range().contains(range))
    }

    /// Innermost entry holding `sector` (a logical or inner gap wins over the extended)
    pub fn entry_at_sector(&self, sector: u64) -> Option<&Partition> {
        self.entries
            .iter()
            .filter(|entry| entry.range().contains_sector(sector))
            .min_by_key(|entry| entry.role == PartitionRole::Extended)
    }

    pub fn find_by_number(&self, number: u32) -> Option<&Partition> {
        self.used().find(|p| p.number == Some(number))
    }

    /// Primary plus extended entries (they share the table's primary slots)
    pub fn primary_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|p| matches!(p.role, PartitionRole::Primary | PartitionRole::Extended))
            .count()
    }

    /// Lowest unused partition number for a new partition of `role`
    pub fn next_number(&self, role: PartitionRole) -> Option<u32> {
        let taken: Vec<u32> = self.used().filter_map(|p| p.number).collect();
        let candidates = match role {
            PartitionRole::Logical => FIRST_LOGICAL_NUMBER..=MAX_LOGICAL_NUMBER,
            PartitionRole::Primary | PartitionRole::Extended => {
                1..=self.table.max_primaries() as u32
            }
            PartitionRole::Unallocated => return None,
        };
        candidates.into_iter().find(|n| !taken.contains(n))
    }

    /// Whether a primary partition can be created inside `gap`
    pub fn can_add_primary(&self, gap: &Partition) -> bool {
        gap.is_unallocated()
            && !self.is_inside_extended(&gap.range())
            && self.primary_count() < self.table.max_primaries()
            && self.next_number(PartitionRole::Primary).is_some()
    }

    /// Whether an extended partition can be created inside `gap`
    pub fn can_add_extended(&self, gap: &Partition) -> bool {
        self.table.supports_logical() && self.extended().is_none() && self.can_add_primary(gap)
    }

    /// Whether a logical partition can be created inside `gap`
    pub fn can_add_logical(&self, gap: &Partition) -> bool {
        gap.is_unallocated()
            && self.table.supports_logical()
            && self.is_inside_extended(&gap.range())
            && self.next_number(PartitionRole::Logical).is_some()
    }

    /// Widest range `partition` could occupy without touching a sibling at its
    /// nesting level: logicals stay inside the extended, the rest inside the
    /// usable range.
    pub fn growth_bounds(&self, partition: &Partition) -> SectorRange {
        let logical = partition.role == PartitionRole::Logical;
        let bounds = if logical {
            self.extended().map(Partition::range).unwrap_or(self.usable)
        } else {
            self.usable
        };

        let siblings = self.used().filter(|p| {
            (p.role == PartitionRole::Logical) == logical && !p.same_geometry(partition)
        });

        let mut lower = bounds.start;
        let mut upper = bounds.end;
        for sibling in siblings {
            if sibling.end_sector <= partition.start_sector {
                lower = lower.max(sibling.end_sector);
            } else if sibling.start_sector >= partition.end_sector {
                upper = upper.min(sibling.start_sector);
            }
        }
        SectorRange::new(lower, upper)
    }

    /// Mount points currently assigned in this layout
    pub fn mount_points(&self) -> Vec<&str> {
        self.used()
            .filter_map(|p| p.mount_point.as_deref())
            .filter(|mount_point| !mount_point.is_empty())
            .collect()
    }
}

impl<'a> IntoIterator for &'a PartitionList {
    type Item = &'a Partition;
    type IntoIter = std::slice::Iter<'a, Partition>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}
