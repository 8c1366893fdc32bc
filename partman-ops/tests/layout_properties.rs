// SPDX-License-Identifier: GPL-3.0-only

//! Preview invariants over generated layouts.
//!
//! Every case builds a GPT layout of non-overlapping partitions with random
//! gaps between them, then folds a single operation into it.

use partman_contracts::OperationKind;
use partman_ops::Operation;
use partman_types::{
    FsType, Partition, PartitionList, PartitionRole, PartitionTableType, SectorRange,
};
use proptest::prelude::*;
use proptest::sample::Index;

const DEVICE: &str = "/dev/vdb";
const FIRST_SECTOR: u64 = 2048;

/// Filesystems that all take a mount point
const FILESYSTEMS: [FsType; 5] = [
    FsType::Ext4,
    FsType::Xfs,
    FsType::Btrfs,
    FsType::Fat32,
    FsType::Ntfs,
];

/// (free sectors before, partition sectors, filesystem)
type Slot = (u64, u64, usize);

fn build(slots: &[Slot], tail: u64) -> PartitionList {
    let mut cursor = FIRST_SECTOR;
    let mut partitions = Vec::with_capacity(slots.len());
    for (number, &(gap, length, fs)) in slots.iter().enumerate() {
        let start = cursor + gap;
        partitions.push(Partition {
            device_path: DEVICE.to_string(),
            number: Some(number as u32 + 1),
            start_sector: start,
            end_sector: start + length,
            sector_size: 512,
            role: PartitionRole::Primary,
            filesystem: FILESYSTEMS[fs],
            mount_point: None,
            label: String::new(),
        });
        cursor = start + length;
    }
    PartitionList::new(
        DEVICE,
        512,
        PartitionTableType::Gpt,
        SectorRange::new(FIRST_SECTOR, cursor + tail),
        partitions,
    )
    .unwrap()
}

fn layouts() -> impl Strategy<Value = PartitionList> {
    (
        prop::collection::vec((0u64..4096, 1u64..20_000, 0..FILESYSTEMS.len()), 1..8),
        0u64..4096,
    )
        .prop_map(|(slots, tail)| build(&slots, tail))
}

fn ranges(list: &PartitionList) -> Vec<SectorRange> {
    list.iter().map(Partition::range).collect()
}

fn pick_used(list: &PartitionList, index: Index) -> Partition {
    let used: Vec<&Partition> = list.used().collect();
    used[index.index(used.len())].clone()
}

fn format_op(original: &Partition, shift: usize) -> Operation {
    let current = FILESYSTEMS
        .iter()
        .position(|fs| *fs == original.filesystem)
        .unwrap();
    let mut target = original.clone();
    target.filesystem = FILESYSTEMS[(current + shift) % FILESYSTEMS.len()];
    Operation::new(OperationKind::Format, original.clone(), target).unwrap()
}

fn mount_op(original: &Partition, mount_point: &str) -> Operation {
    let mut target = original.clone();
    target.mount_point = Some(mount_point.to_string());
    Operation::new(OperationKind::MountPoint, original.clone(), target).unwrap()
}

fn assert_no_overlap(list: &PartitionList) {
    let used: Vec<&Partition> = list.used().collect();
    for pair in used.windows(2) {
        assert!(pair[0].end_sector <= pair[1].start_sector);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn format_keeps_length_and_every_range(
        list in layouts(),
        which in any::<Index>(),
        shift in 1..FILESYSTEMS.len(),
    ) {
        let original = pick_used(&list, which);
        let next = format_op(&original, shift).try_apply_to_visual(&list).unwrap();

        prop_assert_eq!(next.len(), list.len());
        prop_assert_eq!(ranges(&next), ranges(&list));
        for (before, after) in list.iter().zip(next.iter()) {
            if !before.same_geometry(&original) {
                prop_assert_eq!(before, after);
            }
        }
    }

    #[test]
    fn mount_point_keeps_length_and_every_range(
        list in layouts(),
        which in any::<Index>(),
        name in "[a-z]{1,8}",
    ) {
        let original = pick_used(&list, which);
        let mount_point = format!("/{name}");
        let next = mount_op(&original, &mount_point).try_apply_to_visual(&list).unwrap();

        prop_assert_eq!(ranges(&next), ranges(&list));
        let changed = next.entry_at_sector(original.start_sector).unwrap();
        prop_assert_eq!(changed.mount_point.as_deref(), Some(mount_point.as_str()));
        prop_assert_eq!(changed.filesystem, original.filesystem);
    }

    #[test]
    fn format_and_mount_point_are_idempotent(
        list in layouts(),
        which in any::<Index>(),
        shift in 1..FILESYSTEMS.len(),
    ) {
        let original = pick_used(&list, which);
        for op in [format_op(&original, shift), mount_op(&original, "/srv")] {
            let once = op.try_apply_to_visual(&list).unwrap();
            let twice = op.try_apply_to_visual(&once).unwrap();
            prop_assert_eq!(once, twice);
        }
    }

    #[test]
    fn create_keeps_coverage_and_takes_exactly_its_length(
        list in layouts(),
        which in any::<Index>(),
        length_seed in any::<u64>(),
        offset_seed in any::<u64>(),
    ) {
        let gaps: Vec<&Partition> = list.iter().filter(|p| p.is_unallocated()).collect();
        prop_assume!(!gaps.is_empty());
        let gap = gaps[which.index(gaps.len())].clone();

        let length = 1 + length_seed % gap.length();
        let start = gap.start_sector + offset_seed % (gap.length() - length + 1);
        let number = list.used().filter_map(|p| p.number).max().unwrap_or(0) + 1;
        let target = Partition {
            device_path: DEVICE.to_string(),
            number: Some(number),
            start_sector: start,
            end_sector: start + length,
            sector_size: 512,
            role: PartitionRole::Primary,
            filesystem: FsType::Ext4,
            mount_point: None,
            label: String::new(),
        };
        let op = Operation::new(OperationKind::Create, gap, target).unwrap();
        let next = op.try_apply_to_visual(&list).unwrap();

        prop_assert_eq!(next.coverage(), list.coverage());
        prop_assert_eq!(next.free_sectors(), list.free_sectors() - length);
        prop_assert_eq!(next.used().count(), list.used().count() + 1);
        assert_no_overlap(&next);
    }

    #[test]
    fn delete_merges_the_freed_range_with_its_neighbours(
        list in layouts(),
        which in any::<Index>(),
    ) {
        let original = pick_used(&list, which);
        let op = Operation::new(
            OperationKind::Delete,
            original.clone(),
            Partition::unallocated(DEVICE, 0, 0, 512),
        )
        .unwrap();
        let next = op.try_apply_to_visual(&list).unwrap();

        prop_assert_eq!(next.coverage(), list.coverage());
        prop_assert_eq!(next.used().count(), list.used().count() - 1);
        prop_assert_eq!(next.free_sectors(), list.free_sectors() + original.length());

        let free = next.entry_at_sector(original.start_sector).unwrap();
        prop_assert!(free.is_unallocated());
        prop_assert!(free.range().contains(&original.range()));
        for pair in next.entries().windows(2) {
            prop_assert!(!(pair[0].is_unallocated() && pair[1].is_unallocated()));
        }
    }
}
