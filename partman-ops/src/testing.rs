// SPDX-License-Identifier: GPL-3.0-only

//! In-memory partitioning tool for tests and dry runs

use std::sync::{Mutex, PoisonError};

use partman_contracts::{OperationKind, PartitionTool, ToolOutcome, ToolRequest, ToolStep};

#[derive(Debug, Clone)]
enum Trigger {
    Step(ToolStep),
    Kind(OperationKind),
}

impl Trigger {
    fn matches(&self, request: &ToolRequest) -> bool {
        match self {
            Self::Step(step) => request.step == *step,
            Self::Kind(kind) => request.kind == *kind,
        }
    }
}

/// Records every request and answers success unless scripted to fail.
#[derive(Debug, Default)]
pub struct RecordingTool {
    requests: Mutex<Vec<ToolRequest>>,
    failures: Vec<(Trigger, String)>,
}

impl RecordingTool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every request for `step` with `diagnostics`
    pub fn fail_on(mut self, step: ToolStep, diagnostics: &str) -> Self {
        self.failures
            .push((Trigger::Step(step), diagnostics.to_string()));
        self
    }

    /// Fail every request issued by an operation of `kind`
    pub fn fail_on_kind(mut self, kind: OperationKind, diagnostics: &str) -> Self {
        self.failures
            .push((Trigger::Kind(kind), diagnostics.to_string()));
        self
    }

    /// Requests received so far, in order
    pub fn requests(&self) -> Vec<ToolRequest> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn steps(&self) -> Vec<ToolStep> {
        self.requests().iter().map(|r| r.step).collect()
    }
}

impl PartitionTool for RecordingTool {
    fn name(&self) -> &str {
        "recording"
    }

    fn execute(&self, request: &ToolRequest) -> ToolOutcome {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request.clone());

        match self
            .failures
            .iter()
            .find(|(trigger, _)| trigger.matches(request))
        {
            Some((_, diagnostics)) => ToolOutcome::failed(diagnostics.clone()),
            None => ToolOutcome::ok(request.describe()),
        }
    }
}
