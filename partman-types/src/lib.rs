// SPDX-License-Identifier: GPL-3.0-only

//! Canonical data types for the installer partition manager
//!
//! - `Partition` → one snapshot of a partition or free region
//! - `PartitionList` → the gapless, ordered layout of one device
//! - `SectorRange` → half-open sector ranges and size helpers
//!
//! The operation model (`partman-ops`) and the command tool (`partman-sys`)
//! both consume these types by value.

pub mod common;
pub mod partition;
pub mod partition_list;

pub use common::{
    ALIGNMENT_BYTES, GIBIBYTE, KIBIBYTE, MEBIBYTE, SectorRange, align_down, align_up,
    bytes_to_pretty, pretty_to_bytes,
};
pub use partition::{
    FsType, Partition, PartitionRole, PartitionTableType, partition_node_path,
};
pub use partition_list::{DiskLayout, FIRST_LOGICAL_NUMBER, ListError, PartitionList};
