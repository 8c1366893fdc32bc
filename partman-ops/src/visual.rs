// SPDX-License-Identifier: GPL-3.0-only

//! Preview application of operations
//!
//! Folding an operation into a [`PartitionList`] yields the next preview
//! list. Nothing here touches the disk or blocks, so it runs on every edit.
//! Positions are always re-derived from geometry: a numeric index from an
//! earlier list means nothing once another operation has been folded in.

use tracing::{debug, error};

use partman_contracts::OperationKind;
use partman_types::{Partition, PartitionList, PartitionRole};

use crate::{ApplyError, Operation};

/// Next preview list after `op`; see [`Operation::apply_to_visual`].
pub fn apply(list: &PartitionList, op: &Operation) -> PartitionList {
    op.apply_to_visual(list)
}

impl Operation {
    /// Fold this operation into `list`.
    ///
    /// A failure is a programming error (stale reference, invalid kind): it
    /// panics in debug builds and leaves the preview unchanged in release
    /// builds.
    pub fn apply_to_visual(&self, list: &PartitionList) -> PartitionList {
        match self.try_apply_to_visual(list) {
            Ok(next) => next,
            Err(err) => {
                error!(operation = %self, "preview update failed: {err}");
                debug_assert!(false, "preview update failed for {self}: {err}");
                list.clone()
            }
        }
    }

    /// Fold this operation into `list`, returning a new list.
    ///
    /// `list` is never modified; on error no partial result exists.
    pub fn try_apply_to_visual(&self, list: &PartitionList) -> Result<PartitionList, ApplyError> {
        match self.kind() {
            OperationKind::Format | OperationKind::MountPoint => self.substitute(list),
            OperationKind::Create => self.visual_create(list),
            OperationKind::Delete => self.visual_delete(list),
            OperationKind::Resize => self.visual_resize(list),
            OperationKind::Invalid => Err(ApplyError::InvalidOperation),
        }
    }

    /// Position of the entry `original` refers to in `list`
    fn find_index_original(&self, list: &PartitionList) -> Result<usize, ApplyError> {
        if self.device_path() != list.device_path() {
            return Err(self.stale());
        }
        let index = list
            .find_matching(self.original())
            .ok_or_else(|| self.stale())?;
        debug!(operation = %self, index, "located original partition");
        Ok(index)
    }

    /// Position of the free region that will host a new partition
    fn find_index_new(&self, list: &PartitionList) -> Result<usize, ApplyError> {
        if self.device_path() != list.device_path() {
            return Err(self.stale());
        }
        list.find_gap_containing(&self.target().range())
            .ok_or_else(|| self.stale())
    }

    /// Replace one entry in place; used by kinds that keep boundaries.
    fn substitute(&self, list: &PartitionList) -> Result<PartitionList, ApplyError> {
        let index = self.find_index_original(list)?;
        list.substitute(index, self.target().clone())
            .ok_or_else(|| ApplyError::Conflict {
                kind: self.kind(),
                reason: "entry geometry differs from the operation target".to_string(),
            })
    }

    fn visual_create(&self, list: &PartitionList) -> Result<PartitionList, ApplyError> {
        let gap_index = self.find_index_new(list)?;
        let target = self.target();

        if target.role == PartitionRole::Extended && list.extended().is_some() {
            return Err(self.conflict("an extended partition already exists"));
        }
        if let Some(number) = target.number.filter(|n| list.find_by_number(*n).is_some()) {
            return Err(self.conflict(&format!("partition number {number} is taken")));
        }

        debug!(operation = %self, gap_index, "creating partition in free region");
        let mut used = used_partitions(list);
        used.push(target.clone());
        Ok(list.with_used(used)?)
    }

    fn visual_delete(&self, list: &PartitionList) -> Result<PartitionList, ApplyError> {
        let index = self.find_index_original(list)?;
        let doomed = &list.entries()[index];

        if doomed.role == PartitionRole::Extended
            && list.used().any(|p| p.role == PartitionRole::Logical)
        {
            return Err(self.conflict("extended partition still holds logical partitions"));
        }

        let used = list
            .used()
            .filter(|p| !p.same_geometry(doomed) || p.role != doomed.role)
            .cloned()
            .collect();
        Ok(list.with_used(used)?)
    }

    fn visual_resize(&self, list: &PartitionList) -> Result<PartitionList, ApplyError> {
        let index = self.find_index_original(list)?;
        let current = &list.entries()[index];
        let target = self.target();

        let bounds = list.growth_bounds(current);
        if !bounds.contains(&target.range()) {
            return Err(self.conflict(&format!(
                "new range [{}..{}) leaves the free range [{}..{})",
                target.start_sector, target.end_sector, bounds.start, bounds.end
            )));
        }
        if current.role == PartitionRole::Extended
            && list
                .used()
                .filter(|p| p.role == PartitionRole::Logical)
                .any(|logical| !target.range().contains(&logical.range()))
        {
            return Err(self.conflict("extended partition would no longer hold its logicals"));
        }

        let used = list
            .used()
            .map(|p| {
                if p.same_geometry(current) && p.role == current.role {
                    target.clone()
                } else {
                    p.clone()
                }
            })
            .collect();
        Ok(list.with_used(used)?)
    }

    fn stale(&self) -> ApplyError {
        let reference = match self.kind() {
            OperationKind::Create => self.target(),
            _ => self.original(),
        };
        ApplyError::StaleReference {
            kind: self.kind(),
            device: reference.device_path.clone(),
            start: reference.start_sector,
            end: reference.end_sector,
        }
    }

    fn conflict(&self, reason: &str) -> ApplyError {
        ApplyError::Conflict {
            kind: self.kind(),
            reason: reason.to_string(),
        }
    }
}

fn used_partitions(list: &PartitionList) -> Vec<Partition> {
    list.used().cloned().collect()
}
