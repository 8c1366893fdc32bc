// SPDX-License-Identifier: GPL-3.0-only

//! Staged edit plans
//!
//! A plan is a TOML file with one `[[step]]` table per user edit, in the
//! order the user made them:
//!
//! ```toml
//! [[step]]
//! action = "create"
//! at_sector = 2048
//! filesystem = "ext4"
//! mount_point = "/"
//! size = "20 GiB"
//!
//! [[step]]
//! action = "format"
//! partition = 3
//! filesystem = "xfs"
//! ```
//!
//! Each step is planned against the preview left by the steps before it,
//! exactly as an interactive front end would.

use std::path::Path;

use anyhow::{Context, Result, anyhow, bail};
use serde::Deserialize;
use tracing::debug;

use partman_ops::{Alignment, NewPartition, Operation, OperationQueue, Planner};
use partman_types::{FsType, Partition, PartitionList, PartitionRole, pretty_to_bytes};

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Plan {
    #[serde(rename = "step", default)]
    pub steps: Vec<Step>,
}

/// Which entry of the current preview a step acts on
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Selector {
    /// Partition number
    pub partition: Option<u32>,
    /// Any sector inside the entry
    pub at_sector: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Step {
    Create {
        #[serde(flatten)]
        select: Selector,
        #[serde(default = "primary")]
        role: PartitionRole,
        #[serde(default)]
        align: Alignment,
        filesystem: Option<FsType>,
        mount_point: Option<String>,
        /// `"<value> <unit>"`; omitted means the configured default for the
        /// filesystem and mount point, or the whole gap
        size: Option<String>,
        #[serde(default)]
        label: String,
    },
    Delete {
        #[serde(flatten)]
        select: Selector,
    },
    Format {
        #[serde(flatten)]
        select: Selector,
        filesystem: FsType,
    },
    Mount {
        #[serde(flatten)]
        select: Selector,
        /// Omitted clears the mount point
        mount_point: Option<String>,
    },
    Resize {
        #[serde(flatten)]
        select: Selector,
        size: String,
    },
}

fn primary() -> PartitionRole {
    PartitionRole::Primary
}

impl Plan {
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).context("invalid plan")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read plan {}", path.display()))?;
        Self::from_toml(&content).with_context(|| format!("in {}", path.display()))
    }

    /// Plan and queue every step against `base`. Returns the queue and the
    /// final preview.
    pub fn stage(
        &self,
        base: &PartitionList,
        planner: &Planner,
    ) -> Result<(OperationQueue, PartitionList)> {
        let mut queue = OperationQueue::new();
        let mut preview = base.clone();

        for (index, step) in self.steps.iter().enumerate() {
            let op = step
                .plan(&preview, planner)
                .with_context(|| format!("step {}", index + 1))?;
            debug!(step = index + 1, operation = %op, "staging");
            queue
                .push(op)
                .with_context(|| format!("step {}", index + 1))?;
            preview = queue
                .preview(base)
                .with_context(|| format!("step {}", index + 1))?;
        }
        Ok((queue, preview))
    }
}

impl Step {
    fn selector(&self) -> &Selector {
        match self {
            Step::Create { select, .. }
            | Step::Delete { select }
            | Step::Format { select, .. }
            | Step::Mount { select, .. }
            | Step::Resize { select, .. } => select,
        }
    }

    fn plan(&self, preview: &PartitionList, planner: &Planner) -> Result<Operation> {
        let entry = self.selector().resolve(preview)?;
        let op = match self {
            Step::Create {
                role,
                align,
                filesystem,
                mount_point,
                size,
                label,
                ..
            } => {
                let filesystem = filesystem.unwrap_or(planner.default_filesystem);
                let size_bytes = match size.as_deref() {
                    Some("all") => entry.byte_length(),
                    Some(size) => parse_size(size)?,
                    None => planner
                        .suggested_size(filesystem, mount_point.as_deref())
                        .unwrap_or_else(|| entry.byte_length()),
                };
                let request = NewPartition {
                    role: *role,
                    align: *align,
                    filesystem,
                    mount_point: mount_point.clone(),
                    size_bytes,
                    label: label.clone(),
                };
                planner.plan_create(preview, entry, &request)?
            }
            Step::Delete { .. } => planner.plan_delete(preview, entry)?,
            Step::Format { filesystem, .. } => planner.plan_format(entry, *filesystem)?,
            Step::Mount { mount_point, .. } => {
                planner.plan_mount_point(preview, entry, mount_point.as_deref())?
            }
            Step::Resize { size, .. } => planner.plan_resize(preview, entry, parse_size(size)?)?,
        };
        Ok(op)
    }
}

impl Selector {
    fn resolve<'a>(&self, list: &'a PartitionList) -> Result<&'a Partition> {
        match (self.partition, self.at_sector) {
            (Some(number), None) => list
                .find_by_number(number)
                .ok_or_else(|| anyhow!("no partition {number} on {}", list.device_path())),
            (None, Some(sector)) => list
                .entry_at_sector(sector)
                .ok_or_else(|| anyhow!("sector {sector} is outside {}", list.device_path())),
            (Some(_), Some(_)) => bail!("give either `partition` or `at_sector`, not both"),
            (None, None) => bail!("step needs `partition` or `at_sector`"),
        }
    }
}

fn parse_size(size: &str) -> Result<u64> {
    pretty_to_bytes(size).with_context(|| format!("invalid size {size:?}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use partman_contracts::OperationKind;
    use partman_types::{GIBIBYTE, MEBIBYTE, PartitionTableType, SectorRange};

    fn blank_disk() -> PartitionList {
        PartitionList::empty(
            "/dev/sda",
            512,
            PartitionTableType::Gpt,
            SectorRange::new(2048, 100 * GIBIBYTE / 512),
        )
    }

    #[test]
    fn parses_every_action() {
        let plan = Plan::from_toml(
            r#"
            [[step]]
            action = "create"
            at_sector = 2048
            filesystem = "efi"
            size = "512 MiB"

            [[step]]
            action = "format"
            partition = 1
            filesystem = "linux-swap"

            [[step]]
            action = "mount"
            partition = 1

            [[step]]
            action = "resize"
            partition = 1
            size = "1 GiB"

            [[step]]
            action = "delete"
            partition = 1
            "#,
        )
        .unwrap();

        assert_eq!(plan.steps.len(), 5);
        assert!(matches!(
            &plan.steps[0],
            Step::Create {
                role: PartitionRole::Primary,
                align: Alignment::Start,
                filesystem: Some(FsType::Efi),
                ..
            }
        ));
        assert!(matches!(
            &plan.steps[1],
            Step::Format {
                filesystem: FsType::LinuxSwap,
                ..
            }
        ));
        assert!(matches!(
            &plan.steps[2],
            Step::Mount {
                mount_point: None,
                ..
            }
        ));
    }

    #[test]
    fn unknown_action_is_rejected() {
        assert!(Plan::from_toml("[[step]]\naction = \"shrink\"\npartition = 1\n").is_err());
    }

    #[test]
    fn stages_against_the_running_preview() {
        let disk = blank_disk();
        let planner = Planner {
            efi_size_bytes: 300 * MEBIBYTE,
            ..Planner::default()
        };
        let plan = Plan::from_toml(
            r#"
            [[step]]
            action = "create"
            at_sector = 2048
            filesystem = "efi"

            [[step]]
            action = "create"
            at_sector = 1000000
            mount_point = "/"
            size = "all"

            [[step]]
            action = "mount"
            partition = 2
            mount_point = "/srv"
            "#,
        )
        .unwrap();

        let (queue, preview) = plan.stage(&disk, &planner).unwrap();
        assert_eq!(queue.len(), 3);
        assert_eq!(queue.get(0).map(Operation::kind), Some(OperationKind::Create));

        let efi = preview.find_by_number(1).unwrap();
        assert_eq!(efi.byte_length(), 300 * MEBIBYTE);
        let root = preview.find_by_number(2).unwrap();
        assert_eq!(root.filesystem, FsType::Ext4);
        assert_eq!(root.mount_point.as_deref(), Some("/srv"));
        assert_eq!(preview.free_sectors(), 0);
        assert_eq!(preview.coverage(), disk.coverage());
    }

    #[test]
    fn sizes_with_units_stage() {
        let disk = blank_disk();
        let plan = Plan::from_toml(
            r#"
            [[step]]
            action = "create"
            at_sector = 2048
            mount_point = "/"
            size = "20 GiB"

            [[step]]
            action = "create"
            at_sector = 90000000
            filesystem = "linux-swap"
            align = "end"
            size = "512 MiB"

            [[step]]
            action = "resize"
            partition = 1
            size = "30 GiB"
            "#,
        )
        .unwrap();

        let (queue, preview) = plan.stage(&disk, &Planner::default()).unwrap();
        assert_eq!(queue.len(), 3);
        assert_eq!(preview.find_by_number(1).unwrap().byte_length(), 30 * GIBIBYTE);
        let swap = preview.find_by_number(2).unwrap();
        assert_eq!(swap.byte_length(), 512 * MEBIBYTE);
        assert_eq!(swap.end_sector, disk.usable().end);
    }

    #[test]
    fn failing_step_is_named() {
        let disk = blank_disk();
        let plan = Plan::from_toml("[[step]]\naction = \"delete\"\npartition = 4\n").unwrap();

        let err = plan.stage(&disk, &Planner::default()).unwrap_err();
        assert_eq!(err.to_string(), "step 1");
        assert!(format!("{err:#}").contains("no partition 4"));
    }

    #[test]
    fn selector_needs_exactly_one_key() {
        let disk = blank_disk();
        let both = Selector {
            partition: Some(1),
            at_sector: Some(2048),
        };
        assert!(both.resolve(&disk).is_err());
        assert!(Selector::default().resolve(&disk).is_err());
    }
}
