// SPDX-License-Identifier: GPL-3.0-only

//! Partition snapshot - one contiguous sector range on a device
//!
//! A `Partition` is a value: the preview list is rebuilt after every staged
//! edit, so nothing holds a reference into it. Identity across rebuilds is
//! the owning device plus the sector range.

use serde::{Deserialize, Serialize};

use crate::SectorRange;

/// Partition table type
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PartitionTableType {
    /// GPT (GUID Partition Table)
    #[default]
    Gpt,

    /// MBR/DOS (Master Boot Record)
    Msdos,
}

impl PartitionTableType {
    /// Label name understood by parted
    pub fn as_parted_str(&self) -> &'static str {
        match self {
            Self::Gpt => "gpt",
            Self::Msdos => "msdos",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "gpt" => Some(Self::Gpt),
            "dos" | "mbr" | "msdos" => Some(Self::Msdos),
            _ => None,
        }
    }

    /// Maximum number of primary (plus extended) entries in the table
    pub fn max_primaries(&self) -> usize {
        match self {
            Self::Gpt => 128,
            Self::Msdos => 4,
        }
    }

    /// Whether the table supports extended/logical partitions
    pub fn supports_logical(&self) -> bool {
        matches!(self, Self::Msdos)
    }
}

/// Role of an entry in a partition list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PartitionRole {
    Primary,
    Extended,
    Logical,
    Unallocated,
}

impl PartitionRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::Extended => "extended",
            Self::Logical => "logical",
            Self::Unallocated => "unallocated",
        }
    }
}

impl std::fmt::Display for PartitionRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Filesystem kinds the installer can create or recognise
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FsType {
    /// No filesystem (raw or freshly created partition)
    #[default]
    Empty,
    Ext2,
    Ext3,
    Ext4,
    Btrfs,
    Xfs,
    Fat16,
    Fat32,
    /// EFI system partition (FAT32 with the ESP flag)
    Efi,
    LinuxSwap,
    Ntfs,
    /// Present on disk but not recognised
    Unknown,
}

impl FsType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Empty => "",
            Self::Ext2 => "ext2",
            Self::Ext3 => "ext3",
            Self::Ext4 => "ext4",
            Self::Btrfs => "btrfs",
            Self::Xfs => "xfs",
            Self::Fat16 => "fat16",
            Self::Fat32 => "fat32",
            Self::Efi => "efi",
            Self::LinuxSwap => "linux-swap",
            Self::Ntfs => "ntfs",
            Self::Unknown => "unknown",
        }
    }

    /// Parse a filesystem name; unrecognised names map to `Unknown`
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "" | "empty" | "none" => Self::Empty,
            "ext2" => Self::Ext2,
            "ext3" => Self::Ext3,
            "ext4" => Self::Ext4,
            "btrfs" => Self::Btrfs,
            "xfs" => Self::Xfs,
            "fat16" => Self::Fat16,
            "fat32" | "vfat" => Self::Fat32,
            "efi" => Self::Efi,
            "linux-swap" | "swap" => Self::LinuxSwap,
            "ntfs" => Self::Ntfs,
            _ => Self::Unknown,
        }
    }

    /// Whether a user-chosen mount point makes sense for this filesystem
    pub fn supports_mount_point(&self) -> bool {
        !matches!(
            self,
            Self::Empty | Self::LinuxSwap | Self::Efi | Self::Unknown
        )
    }

    /// Whether the installer can create this filesystem
    pub fn is_creatable(&self) -> bool {
        !matches!(self, Self::Empty | Self::Unknown)
    }

    /// Whether the filesystem can follow a partition resize while unmounted
    pub fn is_resizable(&self) -> bool {
        matches!(
            self,
            Self::Ext2 | Self::Ext3 | Self::Ext4 | Self::Ntfs | Self::LinuxSwap
        )
    }

    /// Filesystem type hint passed to `parted mkpart`
    pub fn parted_name(&self) -> &'static str {
        match self {
            Self::Efi | Self::Fat32 => "fat32",
            Self::Fat16 => "fat16",
            Self::LinuxSwap => "linux-swap",
            Self::Empty | Self::Unknown => "",
            other => other.as_str(),
        }
    }
}

impl std::fmt::Display for FsType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty => f.write_str("none"),
            other => f.write_str(other.as_str()),
        }
    }
}

/// Snapshot of one partition (or one unallocated region)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Partition {
    /// Owning disk device path (e.g., "/dev/sda")
    pub device_path: String,

    /// Partition number (1-based), `None` for unallocated space
    #[serde(default)]
    pub number: Option<u32>,

    /// First sector (inclusive)
    pub start_sector: u64,

    /// End sector (exclusive)
    pub end_sector: u64,

    /// Sector size of the owning device in bytes
    pub sector_size: u64,

    pub role: PartitionRole,

    #[serde(default)]
    pub filesystem: FsType,

    #[serde(default)]
    pub mount_point: Option<String>,

    /// Filesystem label
    #[serde(default)]
    pub label: String,
}

impl Partition {
    /// Placeholder entry for a free region
    pub fn unallocated(device_path: &str, start: u64, end: u64, sector_size: u64) -> Self {
        Self {
            device_path: device_path.to_string(),
            number: None,
            start_sector: start,
            end_sector: end,
            sector_size,
            role: PartitionRole::Unallocated,
            filesystem: FsType::Empty,
            mount_point: None,
            label: String::new(),
        }
    }

    pub fn range(&self) -> SectorRange {
        SectorRange::new(self.start_sector, self.end_sector)
    }

    /// Length in sectors
    pub fn length(&self) -> u64 {
        self.range().len()
    }

    pub fn byte_length(&self) -> u64 {
        self.length().saturating_mul(self.sector_size)
    }

    pub fn is_unallocated(&self) -> bool {
        self.role == PartitionRole::Unallocated
    }

    /// Same device and at least one shared sector
    pub fn overlaps(&self, other: &Partition) -> bool {
        self.device_path == other.device_path && self.range().overlaps(&other.range())
    }

    /// Same device and identical sector range
    pub fn same_geometry(&self, other: &Partition) -> bool {
        self.device_path == other.device_path && self.range() == other.range()
    }

    /// Block device node for this partition (e.g., "/dev/sda1", "/dev/nvme0n1p1")
    pub fn node_path(&self) -> Option<String> {
        self.number
            .map(|number| partition_node_path(&self.device_path, number))
    }

    /// Get a display name for this entry
    pub fn display_name(&self) -> String {
        match self.node_path() {
            Some(path) => path,
            None if self.is_unallocated() => "Free space".to_string(),
            None => "New partition".to_string(),
        }
    }
}

/// Kernel node name for partition `number` of `device_path`. Disks whose
/// name ends in a digit take a `p` separator.
pub fn partition_node_path(device_path: &str, number: u32) -> String {
    if device_path.ends_with(|c: char| c.is_ascii_digit()) {
        format!("{device_path}p{number}")
    } else {
        format!("{device_path}{number}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Partition {
        Partition {
            device_path: "/dev/sda".to_string(),
            number: Some(2),
            start_sector: 2048,
            end_sector: 2048 + 204_800,
            sector_size: 512,
            role: PartitionRole::Primary,
            filesystem: FsType::Ext4,
            mount_point: Some("/data".to_string()),
            label: String::new(),
        }
    }

    #[test]
    fn length_is_half_open() {
        let partition = sample();
        assert_eq!(partition.length(), 204_800);
        assert_eq!(partition.byte_length(), 100 * crate::MEBIBYTE);
    }

    #[test]
    fn node_path_handles_nvme_names() {
        let mut partition = sample();
        assert_eq!(partition.node_path().as_deref(), Some("/dev/sda2"));
        partition.device_path = "/dev/nvme0n1".to_string();
        assert_eq!(partition.node_path().as_deref(), Some("/dev/nvme0n1p2"));
        partition.number = None;
        assert_eq!(partition.node_path(), None);
    }

    #[test]
    fn node_names_follow_the_kernel() {
        assert_eq!(partition_node_path("/dev/sdb", 3), "/dev/sdb3");
        assert_eq!(partition_node_path("/dev/mmcblk0", 3), "/dev/mmcblk0p3");
        assert_eq!(partition_node_path("/dev/vda", 12), "/dev/vda12");
    }

    #[test]
    fn overlap_requires_same_device() {
        let a = sample();
        let mut b = sample();
        assert!(a.overlaps(&b));
        b.device_path = "/dev/sdb".to_string();
        assert!(!a.overlaps(&b));
    }

    #[test]
    fn mount_point_support_by_filesystem() {
        assert!(FsType::Ext4.supports_mount_point());
        assert!(!FsType::LinuxSwap.supports_mount_point());
        assert!(!FsType::Efi.supports_mount_point());
        assert_eq!(FsType::parse("vfat"), FsType::Fat32);
        assert_eq!(FsType::parse("reiser4"), FsType::Unknown);
    }

    #[test]
    fn test_partition_serialization() {
        let partition = sample();
        let json = serde_json::to_string(&partition).unwrap();
        let deserialized: Partition = serde_json::from_str(&json).unwrap();
        assert_eq!(partition, deserialized);
    }
}
