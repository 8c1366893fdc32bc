// SPDX-License-Identifier: GPL-3.0-only

//! Ordered pending operations for one session
//!
//! Operations are kept in confirmation order, which is also the order they
//! reach the disk. The queue never reorders; it only refuses operations that
//! cannot be replayed and, on request, collapses redundant edits.

use tracing::{debug, info};

use partman_contracts::OperationKind;
use partman_types::{Partition, PartitionList, SectorRange};

use crate::{Operation, QueueError};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OperationQueue {
    operations: Vec<Operation>,
}

impl OperationQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an operation.
    ///
    /// Rejects the `Invalid` guard and any operation on sectors that an
    /// earlier queued delete removed and nothing has re-created since.
    pub fn push(&mut self, op: Operation) -> Result<(), QueueError> {
        if op.kind() == OperationKind::Invalid {
            return Err(QueueError::InvalidOperation);
        }

        if op.kind() != OperationKind::Create {
            let referenced = op.original();
            if let Some(range) = self
                .deleted_ranges(referenced.device_path.as_str())
                .into_iter()
                .find(|range| range.overlaps(&referenced.range()))
            {
                return Err(QueueError::ReferencesDeleted {
                    kind: op.kind(),
                    device: referenced.device_path.clone(),
                    start: range.start,
                    end: range.end,
                });
            }
        }

        debug!(operation = %op, position = self.operations.len(), "queued");
        self.operations.push(op);
        Ok(())
    }

    /// Drop the most recent operation (undo)
    pub fn pop(&mut self) -> Option<Operation> {
        self.operations.pop()
    }

    pub fn clear(&mut self) {
        self.operations.clear();
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Operation> {
        self.operations.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Operation> {
        self.operations.iter()
    }

    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    /// Preview list with every queued operation folded into `base`
    pub fn preview(&self, base: &PartitionList) -> Result<PartitionList, QueueError> {
        self.operations
            .iter()
            .filter(|op| op.device_path() == base.device_path())
            .try_fold(base.clone(), |list, op| {
                op.try_apply_to_visual(&list).map_err(QueueError::from)
            })
    }

    /// Collapse redundant operations before a drain. Returns how many
    /// operations were removed.
    ///
    /// - a Format or MountPoint directly following one of the same kind on
    ///   the same partition merges into it (first original, latest target);
    /// - a Create followed later by a Delete of the same partition, with
    ///   only Format, MountPoint or Resize of it in between, vanishes along
    ///   with those edits. The pair stays when another partition was created
    ///   on the device in between, since that one was numbered while the
    ///   dropped partition still held its number.
    pub fn compact(&mut self) -> usize {
        let before = self.operations.len();
        let mut compacted: Vec<Operation> = Vec::with_capacity(before);

        for op in self.operations.drain(..) {
            match op.kind() {
                OperationKind::Format | OperationKind::MountPoint => {
                    if let Some((index, merged)) = merge_with_previous(&compacted, &op) {
                        debug!(operation = %merged, "merged successive edit");
                        compacted[index] = merged;
                        continue;
                    }
                    compacted.push(op);
                }
                OperationKind::Delete => {
                    let chain = uncommitted_chain(&compacted, op.original())
                        .filter(|chain| !numbered_after(&compacted, chain, op.device_path()));
                    if let Some(chain) = chain {
                        debug!(
                            operation = %op,
                            dropped = chain.len() + 1,
                            "dropped create/delete pair"
                        );
                        for index in chain.into_iter().rev() {
                            compacted.remove(index);
                        }
                        continue;
                    }
                    compacted.push(op);
                }
                OperationKind::Create | OperationKind::Resize | OperationKind::Invalid => {
                    compacted.push(op);
                }
            }
        }

        self.operations = compacted;
        let removed = before - self.operations.len();
        if removed > 0 {
            info!(removed, remaining = self.operations.len(), "compacted operation queue");
        }
        removed
    }

    /// Ranges on `device` removed by a queued Delete and not re-created by a
    /// later Create
    fn deleted_ranges(&self, device: &str) -> Vec<SectorRange> {
        let mut ranges: Vec<SectorRange> = Vec::new();
        for op in self.operations.iter().filter(|op| op.device_path() == device) {
            match op.kind() {
                OperationKind::Delete => ranges.push(op.original().range()),
                OperationKind::Create => {
                    let created = op.target().range();
                    ranges.retain(|range| !range.overlaps(&created));
                }
                OperationKind::Format
                | OperationKind::MountPoint
                | OperationKind::Resize
                | OperationKind::Invalid => {}
            }
        }
        ranges
    }
}

impl<'a> IntoIterator for &'a OperationQueue {
    type Item = &'a Operation;
    type IntoIter = std::slice::Iter<'a, Operation>;

    fn into_iter(self) -> Self::IntoIter {
        self.operations.iter()
    }
}

/// Whether `op` leaves a partition with the role and geometry of `partition`
fn leaves(op: &Operation, partition: &Partition) -> bool {
    op.resulting()
        .is_some_and(|p| p.role == partition.role && p.same_geometry(partition))
}

/// Merge `op` into the last queued operation on the same partition when both
/// are of the same kind.
fn merge_with_previous(queued: &[Operation], op: &Operation) -> Option<(usize, Operation)> {
    let index = queued.iter().rposition(|previous| {
        leaves(previous, op.original())
            || (previous.kind() != OperationKind::Create
                && previous.original().overlaps(op.original()))
    })?;
    let previous = &queued[index];
    if previous.kind() != op.kind() || !leaves(previous, op.original()) {
        return None;
    }
    // Editing back to the starting value is not a merge; keep both.
    let merged = previous.retarget(op.target().clone()).ok()?;
    Some((index, merged))
}

/// Positions of a not-yet-committed Create of `deleted` and every edit of that
/// partition queued after it. `None` when the partition already exists on
/// disk or the chain holds anything besides Format, MountPoint or Resize.
fn uncommitted_chain(queued: &[Operation], deleted: &Partition) -> Option<Vec<usize>> {
    let mut tracked = deleted.clone();
    let mut chain = Vec::new();

    for (index, op) in queued.iter().enumerate().rev() {
        if leaves(op, &tracked) {
            chain.push(index);
            match op.kind() {
                OperationKind::Create => {
                    chain.reverse();
                    return Some(chain);
                }
                OperationKind::Resize => tracked = op.original().clone(),
                OperationKind::Format | OperationKind::MountPoint => {}
                OperationKind::Delete | OperationKind::Invalid => return None,
            }
        } else if op.kind() == OperationKind::Delete && op.original().overlaps(&tracked) {
            return None;
        }
    }
    None
}

/// Whether a Create on `device` follows the start of `chain`
fn numbered_after(queued: &[Operation], chain: &[usize], device: &str) -> bool {
    chain.first().is_some_and(|&first| {
        queued[first + 1..]
            .iter()
            .any(|op| op.kind() == OperationKind::Create && op.device_path() == device)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use partman_types::{FsType, PartitionRole, PartitionTableType};

    const DEVICE: &str = "/dev/vda";

    fn part(number: u32, start: u64, end: u64, fs: FsType, mount: Option<&str>) -> Partition {
        Partition {
            device_path: DEVICE.to_string(),
            number: Some(number),
            start_sector: start,
            end_sector: end,
            sector_size: 512,
            role: PartitionRole::Primary,
            filesystem: fs,
            mount_point: mount.map(str::to_string),
            label: String::new(),
        }
    }

    fn base() -> PartitionList {
        PartitionList::new(
            DEVICE,
            512,
            PartitionTableType::Gpt,
            SectorRange::new(2048, 200_000),
            vec![part(1, 2048, 50_000, FsType::Ext4, Some("/"))],
        )
        .unwrap()
    }

    fn create(start: u64, end: u64) -> Operation {
        let gap = Partition::unallocated(DEVICE, 50_000, 200_000, 512);
        Operation::new(
            OperationKind::Create,
            gap,
            part(2, start, end, FsType::Ext4, Some("/data")),
        )
        .unwrap()
    }

    fn mount(p: &Partition, to: &str) -> Operation {
        let mut target = p.clone();
        target.mount_point = Some(to.to_string());
        Operation::new(OperationKind::MountPoint, p.clone(), target).unwrap()
    }

    fn format(p: &Partition, fs: FsType) -> Operation {
        let mut target = p.clone();
        target.filesystem = fs;
        Operation::new(OperationKind::Format, p.clone(), target).unwrap()
    }

    fn delete(p: &Partition) -> Operation {
        Operation::new(
            OperationKind::Delete,
            p.clone(),
            Partition::unallocated(DEVICE, 0, 0, 512),
        )
        .unwrap()
    }

    #[test]
    fn invalid_is_refused() {
        let mut queue = OperationQueue::new();
        assert_eq!(
            queue.push(Operation::invalid()),
            Err(QueueError::InvalidOperation)
        );
        assert!(queue.is_empty());
    }

    #[test]
    fn edits_of_deleted_partition_are_refused() {
        let list = base();
        let root = list.find_by_number(1).unwrap().clone();
        let mut queue = OperationQueue::new();
        queue.push(delete(&root)).unwrap();

        let err = queue.push(mount(&root, "/mnt")).unwrap_err();
        assert!(matches!(
            err,
            QueueError::ReferencesDeleted {
                kind: OperationKind::MountPoint,
                start: 2048,
                end: 50_000,
                ..
            }
        ));
    }

    #[test]
    fn recreated_range_can_be_edited_again() {
        let list = base();
        let root = list.find_by_number(1).unwrap().clone();
        let mut queue = OperationQueue::new();
        queue.push(delete(&root)).unwrap();

        let gap = Partition::unallocated(DEVICE, 2048, 200_000, 512);
        let fresh = part(1, 2048, 40_000, FsType::Xfs, None);
        queue
            .push(Operation::new(OperationKind::Create, gap, fresh.clone()).unwrap())
            .unwrap();
        queue.push(mount(&fresh, "/srv")).unwrap();
        assert_eq!(queue.len(), 3);

        let preview = queue.preview(&list).unwrap();
        let srv = preview.find_by_number(1).unwrap();
        assert_eq!(srv.mount_point.as_deref(), Some("/srv"));
        assert_eq!(srv.end_sector, 40_000);
    }

    #[test]
    fn preview_folds_in_order() {
        let list = base();
        let created = create(50_000, 100_000);
        let new_part = created.target().clone();
        let mut queue = OperationQueue::new();
        queue.push(created).unwrap();
        queue.push(format(&new_part, FsType::Xfs)).unwrap();

        let preview = queue.preview(&list).unwrap();
        assert_eq!(preview.find_by_number(2).unwrap().filesystem, FsType::Xfs);
        assert_eq!(preview.coverage(), list.coverage());
    }

    #[test]
    fn successive_mount_point_edits_collapse() {
        let list = base();
        let root = list.find_by_number(1).unwrap().clone();
        let first = mount(&root, "/a");
        let second = mount(first.target(), "/b");

        let mut queue = OperationQueue::new();
        queue.push(first).unwrap();
        queue.push(second).unwrap();
        assert_eq!(queue.compact(), 1);

        let only = queue.get(0).unwrap();
        assert_eq!(only.original().mount_point.as_deref(), Some("/"));
        assert_eq!(only.target().mount_point.as_deref(), Some("/b"));
    }

    #[test]
    fn edit_back_to_start_is_kept() {
        let list = base();
        let root = list.find_by_number(1).unwrap().clone();
        let away = mount(&root, "/a");
        let back = mount(away.target(), "/");

        let mut queue = OperationQueue::new();
        queue.push(away).unwrap();
        queue.push(back).unwrap();
        assert_eq!(queue.compact(), 0);
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn create_then_delete_vanishes() {
        let list = base();
        let created = create(50_000, 100_000);
        let new_part = created.target().clone();
        let formatted = format(&new_part, FsType::Btrfs);
        let after_format = formatted.target().clone();

        let mut queue = OperationQueue::new();
        queue.push(created).unwrap();
        let root = list.find_by_number(1).unwrap().clone();
        queue.push(mount(&root, "/sys")).unwrap();
        queue.push(formatted).unwrap();
        queue.push(delete(&after_format)).unwrap();

        assert_eq!(queue.compact(), 3);
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.get(0).unwrap().kind(), OperationKind::MountPoint);
    }

    #[test]
    fn delete_of_existing_partition_is_kept() {
        let list = base();
        let root = list.find_by_number(1).unwrap().clone();
        let formatted = format(&root, FsType::Xfs);
        let after = formatted.target().clone();

        let mut queue = OperationQueue::new();
        queue.push(formatted).unwrap();
        queue.push(delete(&after)).unwrap();
        assert_eq!(queue.compact(), 0);
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn create_delete_pair_is_kept_when_a_later_create_took_the_next_number() {
        let disk = PartitionList::empty(
            DEVICE,
            512,
            PartitionTableType::Gpt,
            SectorRange::new(2048, 200_000),
        );
        let first_gap = disk.entries()[0].clone();
        let a = part(1, 2048, 50_000, FsType::Ext4, None);
        let create_a = Operation::new(OperationKind::Create, first_gap, a.clone()).unwrap();

        let mut queue = OperationQueue::new();
        queue.push(create_a).unwrap();
        let preview = queue.preview(&disk).unwrap();
        let rest = preview.entry_at_sector(60_000).unwrap().clone();
        let c = part(2, 50_000, 120_000, FsType::Ext4, Some("/data"));
        queue
            .push(Operation::new(OperationKind::Create, rest, c).unwrap())
            .unwrap();
        queue.push(delete(&a)).unwrap();
        let before = queue.preview(&disk).unwrap();

        assert_eq!(queue.compact(), 0);
        assert_eq!(queue.len(), 3);
        assert_eq!(queue.preview(&disk).unwrap(), before);
        assert_eq!(before.find_by_number(2).unwrap().start_sector, 50_000);
    }

    #[test]
    fn later_create_numbered_without_the_pair_does_not_block_it() {
        let disk = PartitionList::empty(
            DEVICE,
            512,
            PartitionTableType::Gpt,
            SectorRange::new(2048, 200_000),
        );
        let gap = disk.entries()[0].clone();
        let a = part(1, 2048, 50_000, FsType::Ext4, None);

        let mut queue = OperationQueue::new();
        queue
            .push(Operation::new(OperationKind::Create, gap.clone(), a.clone()).unwrap())
            .unwrap();
        queue.push(delete(&a)).unwrap();
        let again = part(1, 2048, 100_000, FsType::Xfs, Some("/srv"));
        queue
            .push(Operation::new(OperationKind::Create, gap, again.clone()).unwrap())
            .unwrap();

        assert_eq!(queue.compact(), 2);
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.get(0).unwrap().target(), &again);
    }

    #[test]
    fn resized_create_then_delete_vanishes() {
        let created = create(50_000, 100_000);
        let new_part = created.target().clone();
        let mut grown = new_part.clone();
        grown.end_sector = 150_000;
        let resize = Operation::new(OperationKind::Resize, new_part, grown.clone()).unwrap();

        let mut queue = OperationQueue::new();
        queue.push(created).unwrap();
        queue.push(resize).unwrap();
        queue.push(delete(&grown)).unwrap();
        assert_eq!(queue.compact(), 3);
        assert!(queue.is_empty());
    }
}
