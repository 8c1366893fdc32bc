// SPDX-License-Identifier: GPL-3.0-only

//! Running external programs, or only rendering them in dry-run mode

use std::process::Command;

use tracing::debug;

use crate::error::{Result, SysError};

#[derive(Debug, Clone)]
pub struct CommandOutcome {
    pub command: String,
    pub stdout: String,
    pub stderr: String,
    pub executed: bool,
}

/// One program invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: &'static str,
    pub args: Vec<String>,
}

impl CommandSpec {
    pub fn new(program: &'static str) -> Self {
        Self {
            program,
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn render(&self) -> String {
        render(self.program, &self.args)
    }
}

pub fn render(command: &str, args: &[String]) -> String {
    if args.is_empty() {
        command.to_string()
    } else {
        format!("{} {}", command, args.join(" "))
    }
}

pub fn run(spec: &CommandSpec, dry_run: bool) -> Result<CommandOutcome> {
    let rendered = spec.render();
    if dry_run {
        debug!("dry run: {rendered}");
        return Ok(CommandOutcome {
            command: rendered,
            stdout: String::new(),
            stderr: String::new(),
            executed: false,
        });
    }

    let binary = which::which(spec.program)
        .map_err(|_| SysError::ToolNotFound(spec.program.to_string()))?;
    debug!("running {rendered}");

    let output = Command::new(binary)
        .args(&spec.args)
        .output()
        .map_err(|error| SysError::CommandFailed {
            command: rendered.clone(),
            stderr: error.to_string(),
        })?;

    if !output.status.success() {
        return Err(SysError::CommandFailed {
            command: rendered,
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    Ok(CommandOutcome {
        command: rendered,
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        executed: true,
    })
}
