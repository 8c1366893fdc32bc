// SPDX-License-Identifier: GPL-3.0-only

//! Partitioning tool backed by parted and the mkfs family
//!
//! Each request becomes one or more command lines. Partition table edits go
//! through `parted -s` in sector units; filesystems are created and resized
//! with the per-filesystem tools. Mount points are only recorded: the
//! installer writes them to the target system's fstab later.

use std::sync::{Mutex, PoisonError};

use serde::Serialize;
use tracing::{debug, info, warn};

use partman_contracts::{PartitionTool, ToolOutcome, ToolRequest, ToolStep};
use partman_types::{FsType, KIBIBYTE};

use crate::cmd::{self, CommandSpec};
use crate::error::{Result, SysError};

/// A mount point recorded for a partition node
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MountEntry {
    pub node: String,
    pub mount_point: String,
    pub filesystem: FsType,
}

#[derive(Debug, Default)]
pub struct CommandTool {
    dry_run: bool,
    history: Mutex<Vec<String>>,
    mount_table: Mutex<Vec<MountEntry>>,
}

impl CommandTool {
    pub fn new(dry_run: bool) -> Self {
        Self {
            dry_run,
            ..Self::default()
        }
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// Every command line issued (or rendered, in dry-run mode), in order
    pub fn history(&self) -> Vec<String> {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn mount_table(&self) -> Vec<MountEntry> {
        self.mount_table
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn record_mount_point(&self, request: &ToolRequest) -> Result<String> {
        let node = node_path(request)?;
        let mut table = self
            .mount_table
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        table.retain(|entry| entry.node != node);

        match request.mount_point.as_deref().filter(|m| !m.is_empty()) {
            Some(mount_point) => {
                table.retain(|entry| entry.mount_point != mount_point);
                table.push(MountEntry {
                    node: node.clone(),
                    mount_point: mount_point.to_string(),
                    filesystem: request.filesystem,
                });
                Ok(format!("{node} -> {mount_point}"))
            }
            None => Ok(format!("{node} -> (none)")),
        }
    }

    fn run_all(&self, request: &ToolRequest) -> Result<String> {
        if request.step == ToolStep::RecordMountPoint {
            return self.record_mount_point(request);
        }

        let mut output = Vec::new();
        for spec in commands_for(request)? {
            let outcome = cmd::run(&spec, self.dry_run)?;
            self.history
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(outcome.command.clone());
            output.push(if outcome.executed {
                outcome.stdout.trim().to_string()
            } else {
                outcome.command
            });
        }
        Ok(output.join("\n"))
    }
}

impl PartitionTool for CommandTool {
    fn name(&self) -> &str {
        if self.dry_run { "parted (dry run)" } else { "parted" }
    }

    fn execute(&self, request: &ToolRequest) -> ToolOutcome {
        debug!("{}", request.describe());
        match self.run_all(request) {
            Ok(output) => {
                info!(step = %request.step, "{}", request.describe());
                ToolOutcome::ok(output)
            }
            Err(error) => {
                warn!(step = %request.step, "{}: {error}", request.describe());
                ToolOutcome::failed(error.to_string())
            }
        }
    }
}

/// Command lines for one request, in execution order
pub fn commands_for(request: &ToolRequest) -> Result<Vec<CommandSpec>> {
    match request.step {
        ToolStep::MakePartition => make_partition(request),
        ToolStep::RemovePartition => Ok(vec![
            parted(request)
                .arg("rm")
                .arg(partition_number(request)?.to_string()),
        ]),
        ToolStep::ResizePartition => Ok(vec![
            parted(request)
                .arg("unit")
                .arg("s")
                .arg("resizepart")
                .arg(partition_number(request)?.to_string())
                .arg(last_sector(request)?),
        ]),
        ToolStep::MakeFilesystem => Ok(vec![make_filesystem(request)?]),
        ToolStep::ResizeFilesystem => Ok(vec![resize_filesystem(request)?]),
        ToolStep::RecordMountPoint => Ok(Vec::new()),
    }
}

fn parted(request: &ToolRequest) -> CommandSpec {
    CommandSpec::new("parted")
        .arg("-s")
        .arg(request.device_path.clone())
}

fn make_partition(request: &ToolRequest) -> Result<Vec<CommandSpec>> {
    let mut mkpart = parted(request)
        .arg("unit")
        .arg("s")
        .arg("mkpart")
        .arg(request.role.as_str());
    let hint = request.filesystem.parted_name();
    if !hint.is_empty() {
        mkpart = mkpart.arg(hint);
    }
    mkpart = mkpart
        .arg(format!("{}s", request.start_sector))
        .arg(last_sector(request)?);

    let mut commands = vec![mkpart];
    if request.filesystem == FsType::Efi {
        commands.push(
            parted(request)
                .arg("set")
                .arg(partition_number(request)?.to_string())
                .arg("esp")
                .arg("on"),
        );
    }
    Ok(commands)
}

fn make_filesystem(request: &ToolRequest) -> Result<CommandSpec> {
    let node = node_path(request)?;
    let label = request.label.trim();
    let spec = match request.filesystem {
        FsType::Ext2 | FsType::Ext3 | FsType::Ext4 => {
            let program = match request.filesystem {
                FsType::Ext2 => "mkfs.ext2",
                FsType::Ext3 => "mkfs.ext3",
                _ => "mkfs.ext4",
            };
            with_label(CommandSpec::new(program).arg("-F"), "-L", label)
        }
        FsType::Btrfs => with_label(CommandSpec::new("mkfs.btrfs").arg("-f"), "-L", label),
        FsType::Xfs => with_label(CommandSpec::new("mkfs.xfs").arg("-f"), "-L", label),
        FsType::Fat16 => {
            with_label(CommandSpec::new("mkfs.vfat").arg("-F").arg("16"), "-n", label)
        }
        FsType::Fat32 | FsType::Efi => {
            with_label(CommandSpec::new("mkfs.vfat").arg("-F").arg("32"), "-n", label)
        }
        FsType::LinuxSwap => with_label(CommandSpec::new("mkswap"), "-L", label),
        FsType::Ntfs => {
            with_label(CommandSpec::new("mkfs.ntfs").arg("-Q").arg("-F"), "-L", label)
        }
        FsType::Empty | FsType::Unknown => {
            return Err(SysError::Unsupported(format!(
                "cannot create a {:?} filesystem",
                request.filesystem
            )));
        }
    };
    Ok(spec.arg(node))
}

fn resize_filesystem(request: &ToolRequest) -> Result<CommandSpec> {
    let node = node_path(request)?;
    let bytes = request
        .end_sector
        .saturating_sub(request.start_sector)
        .saturating_mul(request.sector_size);
    match request.filesystem {
        FsType::Ext2 | FsType::Ext3 | FsType::Ext4 => Ok(CommandSpec::new("resize2fs")
            .arg(node)
            .arg(format!("{}K", bytes / KIBIBYTE))),
        FsType::Ntfs => Ok(CommandSpec::new("ntfsresize")
            .arg("-f")
            .arg("-s")
            .arg(bytes.to_string())
            .arg(node)),
        FsType::LinuxSwap => Ok(CommandSpec::new("mkswap").arg(node)),
        other => Err(SysError::Unsupported(format!(
            "{} filesystems cannot be resized offline",
            other.as_str()
        ))),
    }
}

fn with_label(spec: CommandSpec, flag: &str, label: &str) -> CommandSpec {
    if label.is_empty() {
        spec
    } else {
        spec.arg(flag.to_string()).arg(label.to_string())
    }
}

fn partition_number(request: &ToolRequest) -> Result<u32> {
    request.partition_number.ok_or_else(|| {
        SysError::Unsupported(format!("{} has no partition number", request.describe()))
    })
}

fn node_path(request: &ToolRequest) -> Result<String> {
    request.partition_path().ok_or_else(|| {
        SysError::Unsupported(format!("{} has no partition node", request.describe()))
    })
}

/// parted takes inclusive end sectors
fn last_sector(request: &ToolRequest) -> Result<String> {
    if request.end_sector <= request.start_sector {
        return Err(SysError::Unsupported(format!(
            "{} has an empty range",
            request.describe()
        )));
    }
    Ok(format!("{}s", request.end_sector - 1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use partman_contracts::OperationKind;
    use partman_types::PartitionRole;

    fn request(step: ToolStep, fs: FsType) -> ToolRequest {
        ToolRequest {
            device_path: "/dev/sda".to_string(),
            kind: OperationKind::Create,
            step,
            role: PartitionRole::Primary,
            start_sector: 2048,
            end_sector: 206_848,
            sector_size: 512,
            partition_number: Some(1),
            filesystem: fs,
            label: String::new(),
            mount_point: Some("/data".to_string()),
        }
    }

    fn rendered(request: &ToolRequest) -> Vec<String> {
        commands_for(request)
            .unwrap()
            .iter()
            .map(CommandSpec::render)
            .collect()
    }

    #[test]
    fn mkpart_uses_inclusive_end_sector() {
        assert_eq!(
            rendered(&request(ToolStep::MakePartition, FsType::Ext4)),
            vec!["parted -s /dev/sda unit s mkpart primary ext4 2048s 206847s"]
        );
    }

    #[test]
    fn efi_partition_gets_esp_flag() {
        let commands = rendered(&request(ToolStep::MakePartition, FsType::Efi));
        assert_eq!(commands.len(), 2);
        assert_eq!(commands[1], "parted -s /dev/sda set 1 esp on");
    }

    #[test]
    fn mkfs_is_chosen_per_filesystem() {
        let mut xfs = request(ToolStep::MakeFilesystem, FsType::Xfs);
        xfs.label = "home".to_string();
        assert_eq!(rendered(&xfs), vec!["mkfs.xfs -f -L home /dev/sda1"]);
        assert_eq!(
            rendered(&request(ToolStep::MakeFilesystem, FsType::Efi)),
            vec!["mkfs.vfat -F 32 /dev/sda1"]
        );
        assert!(commands_for(&request(ToolStep::MakeFilesystem, FsType::Empty)).is_err());
    }

    #[test]
    fn resize_filesystem_targets_new_size() {
        assert_eq!(
            rendered(&request(ToolStep::ResizeFilesystem, FsType::Ext4)),
            vec!["resize2fs /dev/sda1 102400K"]
        );
        assert!(commands_for(&request(ToolStep::ResizeFilesystem, FsType::Xfs)).is_err());
    }

    #[test]
    fn remove_needs_a_partition_number() {
        let mut rm = request(ToolStep::RemovePartition, FsType::Ext4);
        assert_eq!(rendered(&rm), vec!["parted -s /dev/sda rm 1"]);
        rm.partition_number = None;
        assert!(commands_for(&rm).is_err());
    }

    #[test]
    fn dry_run_records_commands_without_running_them() {
        let tool = CommandTool::new(true);
        let outcome = tool.execute(&request(ToolStep::MakePartition, FsType::Ext4));
        assert!(outcome.success);
        assert_eq!(
            tool.history(),
            vec!["parted -s /dev/sda unit s mkpart primary ext4 2048s 206847s"]
        );
    }

    #[test]
    fn mount_points_are_recorded_not_mounted() {
        let tool = CommandTool::new(true);
        let mut record = request(ToolStep::RecordMountPoint, FsType::Ext4);
        assert!(tool.execute(&record).success);
        record.mount_point = Some("/srv".to_string());
        assert!(tool.execute(&record).success);

        assert!(tool.history().is_empty());
        assert_eq!(
            tool.mount_table(),
            vec![MountEntry {
                node: "/dev/sda1".to_string(),
                mount_point: "/srv".to_string(),
                filesystem: FsType::Ext4,
            }]
        );
    }

    #[test]
    fn unsupported_request_fails_with_diagnostics() {
        let tool = CommandTool::new(true);
        let outcome = tool.execute(&request(ToolStep::ResizeFilesystem, FsType::Btrfs));
        assert!(!outcome.success);
        assert!(outcome.diagnostics.contains("cannot be resized offline"));
    }
}
