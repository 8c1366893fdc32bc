// SPDX-License-Identifier: GPL-3.0-only

use std::path::PathBuf;

use thiserror::Error;

/// Error types for settings and command execution
#[derive(Error, Debug)]
pub enum SysError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse settings file {path:?}: {reason}")]
    SettingsParse { path: PathBuf, reason: String },

    #[error("Required tool not found in PATH: {0}")]
    ToolNotFound(String),

    #[error("Command `{command}` failed: {stderr}")]
    CommandFailed { command: String, stderr: String },

    #[error("Unsupported request: {0}")]
    Unsupported(String),
}

/// Result type alias for system operations
pub type Result<T> = std::result::Result<T, SysError>;
