// SPDX-License-Identifier: GPL-3.0-only

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::{Duration, SystemTime};

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

pub const LOG_DIR_ENV: &str = "PARTMAN_LOG_DIR";

const LOG_PREFIX: &str = "partman.log";
const KEEP_DAYS: u64 = 7;
const CRATES: [&str; 5] = [
    "partman",
    "partman_types",
    "partman_ops",
    "partman_sys",
    "partman_contracts",
];

/// Set up stderr logging, plus a daily rolling file under `log_dir` when
/// one is given. `RUST_LOG` overrides the default filter.
pub fn init(verbose: u8, log_dir: Option<&Path>) {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let mut directives = vec!["warn".to_string()];
        directives.extend(CRATES.iter().map(|krate| format!("{krate}={level}")));
        EnvFilter::new(directives.join(","))
    });

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(verbose > 0);

    let Some(dir) = log_dir else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .init();
        return;
    };

    match file_writer(dir) {
        Ok((writer, guard)) => {
            let file_layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_target(true)
                .with_ansi(false);

            tracing_subscriber::registry()
                .with(env_filter)
                .with(stderr_layer)
                .with(file_layer)
                .init();

            // Dropping the guard would stop the background writer.
            let _ = LOG_GUARD.set(guard);
        }
        Err(e) => {
            eprintln!("partman: failed to initialize file logging: {e:#}");
            tracing_subscriber::registry()
                .with(env_filter)
                .with(stderr_layer)
                .init();
        }
    }
}

fn file_writer(
    dir: &Path,
) -> anyhow::Result<(tracing_appender::non_blocking::NonBlocking, WorkerGuard)> {
    if let Err(e) = fs::create_dir_all(dir) {
        return Err(anyhow::anyhow!(
            "create log directory failed: {} ({})",
            dir.display(),
            e
        ));
    }

    let prefix = OsString::from(LOG_PREFIX);
    cleanup_old_logs(dir, &prefix);

    let appender = tracing_appender::rolling::daily(dir, &prefix);
    Ok(tracing_appender::non_blocking(appender))
}

/// `--log-dir` wins over `PARTMAN_LOG_DIR`
pub fn resolve_log_dir(flag: Option<PathBuf>) -> Option<PathBuf> {
    flag.or_else(|| std::env::var_os(LOG_DIR_ENV).map(PathBuf::from))
}

fn cleanup_old_logs(dir: &Path, prefix: &OsString) {
    let cutoff = SystemTime::now().checked_sub(Duration::from_secs(KEEP_DAYS * 24 * 60 * 60));
    let Some(cutoff) = cutoff else { return };

    let prefix = prefix.to_string_lossy();

    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };

    for entry in entries.flatten() {
        let Ok(file_type) = entry.file_type() else {
            continue;
        };
        if !file_type.is_file() {
            continue;
        }

        // Only files written by our appender.
        if !entry.file_name().to_string_lossy().starts_with(prefix.as_ref()) {
            continue;
        }

        let modified = entry.metadata().and_then(|metadata| metadata.modified());
        if modified.is_ok_and(|modified| modified < cutoff) {
            let _ = fs::remove_file(entry.path());
        }
    }
}
