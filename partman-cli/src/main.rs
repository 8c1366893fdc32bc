// SPDX-License-Identifier: GPL-3.0-only

//! Installer partition manager front end
//!
//! Reads a device layout snapshot (JSON) and a staged edit plan (TOML),
//! shows the resulting layout, and can replay the edits on the device.

mod logging;
mod plan;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use partman_ops::{OperationQueue, Planner, spawn_drain};
use partman_sys::{CommandTool, PartitionDefaults, Settings};
use partman_types::{DiskLayout, PartitionList, bytes_to_pretty};

use crate::plan::Plan;

/// Stage and apply partition edits
#[derive(Parser)]
#[command(name = "partman")]
#[command(about = "Installer partition manager", long_about = None)]
struct Cli {
    /// Settings file, instead of the packaged defaults and OEM override
    #[arg(long, global = true, env = "PARTMAN_SETTINGS")]
    settings: Option<PathBuf>,

    /// Also write daily rolling logs to this directory
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    /// More log output (repeat for trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the layout that results from a plan
    Preview {
        /// Device layout snapshot (JSON)
        layout: PathBuf,
        /// Staged edits (TOML)
        plan: PathBuf,
        /// Print the resulting layout as JSON
        #[arg(long)]
        json: bool,
    },
    /// Replay a plan on the device
    Apply {
        /// Device layout snapshot (JSON)
        layout: PathBuf,
        /// Staged edits (TOML)
        plan: PathBuf,
        /// Print the commands instead of running them
        #[arg(long)]
        dry_run: bool,
        /// Keep redundant edits instead of folding them
        #[arg(long)]
        no_compact: bool,
    },
    /// Print the resolved partition settings
    Settings,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose, logging::resolve_log_dir(cli.log_dir).as_deref());

    let settings = match &cli.settings {
        Some(path) => Settings::load(&[path])?,
        None => Settings::system()?,
    };
    let defaults = settings.partition_defaults();

    match cli.command {
        Commands::Preview { layout, plan, json } => {
            let base = load_layout(&layout)?;
            let (queue, preview) = Plan::load(&plan)?.stage(&base, &planner(&defaults))?;

            if json {
                println!("{}", serde_json::to_string_pretty(&preview.to_layout())?);
            } else {
                print_queue(&queue);
                println!();
                print_layout(&preview);
            }
        }

        Commands::Apply {
            layout,
            plan,
            dry_run,
            no_compact,
        } => {
            let base = load_layout(&layout)?;
            let (mut queue, _) = Plan::load(&plan)?.stage(&base, &planner(&defaults))?;
            if !no_compact {
                let removed = queue.compact();
                if removed > 0 {
                    info!(removed, "folded redundant edits");
                }
            }

            let tool = Arc::new(CommandTool::new(dry_run));
            let handle = spawn_drain(queue, Arc::clone(&tool));
            let cancel = handle.cancellation_token();
            let interrupt = tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("interrupted, stopping after the running operation");
                    cancel.cancel();
                }
            });
            let result = handle.wait().await.context("drain worker panicked")?;
            interrupt.abort();

            if dry_run {
                for command in tool.history() {
                    println!("{command}");
                }
            }
            let mount_table = tool.mount_table();
            if !mount_table.is_empty() {
                eprintln!("{}", serde_json::to_string_pretty(&mount_table)?);
            }
            println!("{}", serde_json::to_string_pretty(&result)?);

            if let Some(failure) = &result.failure {
                warn!(index = failure.index, "apply stopped early");
                bail!(
                    "operation {} ({}) failed: {}",
                    failure.index,
                    failure.kind,
                    failure.reason
                );
            }
        }

        Commands::Settings => {
            eprintln!("sources: {:?}", settings.sources());
            println!("{}", serde_json::to_string_pretty(&defaults)?);
        }
    }

    Ok(())
}

fn planner(defaults: &PartitionDefaults) -> Planner {
    Planner {
        minimum_size_bytes: defaults.minimum_size_bytes,
        boot_size_bytes: defaults.boot_space_bytes,
        efi_size_bytes: defaults.efi_space_bytes,
        default_filesystem: defaults.default_filesystem,
    }
}

fn load_layout(path: &Path) -> Result<PartitionList> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read layout {}", path.display()))?;
    let layout: DiskLayout = serde_json::from_str(&content)
        .with_context(|| format!("invalid layout {}", path.display()))?;
    PartitionList::from_layout(layout)
        .with_context(|| format!("inconsistent layout {}", path.display()))
}

fn print_queue(queue: &OperationQueue) {
    println!("{} staged operation(s)", queue.len());
    for (index, op) in queue.iter().enumerate() {
        println!("  {index:>2}  {op}");
    }
}

fn print_layout(list: &PartitionList) {
    println!("{} ({})", list.device_path(), list.table().as_parted_str());
    println!(
        "{:<16} {:>12} {:>12} {:<10} {:<10} {:<12} {:>10}",
        "Entry", "Start", "End", "Role", "Filesystem", "Mount", "Size"
    );
    for entry in list.iter() {
        println!(
            "{:<16} {:>12} {:>12} {:<10} {:<10} {:<12} {:>10}",
            entry.display_name(),
            entry.start_sector,
            entry.end_sector,
            entry.role.as_str(),
            entry.filesystem.as_str(),
            entry.mount_point.as_deref().unwrap_or("-"),
            bytes_to_pretty(&entry.byte_length(), false),
        );
    }
    println!(
        "free: {}",
        bytes_to_pretty(&(list.free_sectors() * list.sector_size()), true)
    );
}
