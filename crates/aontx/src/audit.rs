use std::time::Instant;

/// Status of a step in the audit log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum StepStatus {
    /// Step has not started.
    Pending,
    /// Step action is in progress.
    Running,
    /// Step action succeeded.
    Succeeded,
    /// Step action failed (for a chain root: every alternative failed).
    Failed,
    /// Step was compensated during rollback.
    Compensated,
}

/// Record of one step's progress through an execution.
#[derive(Debug, Clone)]
pub struct StepRecord {
    /// Registration index of the step.
    pub index: usize,
    /// Current status.
    pub status: StepStatus,
    /// When the step action started.
    pub started_at: Option<Instant>,
    /// When the step last changed status after starting.
    pub completed_at: Option<Instant>,
    /// For chain roots: which alternative settled the tree (0 is the primary action).
    pub alternative: Option<usize>,
}

impl StepRecord {
    fn pending(index: usize) -> Self {
        Self {
            index,
            status: StepStatus::Pending,
            started_at: None,
            completed_at: None,
            alternative: None,
        }
    }
}

/// Audit log tracking every step of one execution.
#[derive(Debug, Default, Clone)]
pub struct AuditLog {
    records: Vec<StepRecord>,
    rolled_back: bool,
}

impl AuditLog {
    /// Create a new empty audit log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_steps(count: usize) -> Self {
        Self {
            records: (0..count).map(StepRecord::pending).collect(),
            rolled_back: false,
        }
    }

    fn record_mut(&mut self, index: usize) -> &mut StepRecord {
        if index >= self.records.len() {
            let start = self.records.len();
            self.records.extend((start..=index).map(StepRecord::pending));
        }
        &mut self.records[index]
    }

    pub(crate) fn record_start(&mut self, index: usize) {
        let record = self.record_mut(index);
        record.status = StepStatus::Running;
        record.started_at = Some(Instant::now());
    }

    pub(crate) fn record_success(&mut self, index: usize) {
        let record = self.record_mut(index);
        record.status = StepStatus::Succeeded;
        record.completed_at = Some(Instant::now());
    }

    pub(crate) fn record_failure(&mut self, index: usize) {
        let record = self.record_mut(index);
        record.status = StepStatus::Failed;
        record.completed_at = Some(Instant::now());
    }

    pub(crate) fn record_alternative(&mut self, index: usize, alternative: usize) {
        self.record_mut(index).alternative = Some(alternative);
    }

    pub(crate) fn record_compensated(&mut self, index: usize) {
        let record = self.record_mut(index);
        record.status = StepStatus::Compensated;
        record.completed_at = Some(Instant::now());
    }

    pub(crate) fn mark_rolled_back(&mut self) {
        self.rolled_back = true;
    }

    /// Get all records in the audit log, ordered by step index.
    #[must_use]
    pub fn records(&self) -> &[StepRecord] {
        &self.records
    }

    /// Whether a rollback pass ran to completion.
    #[must_use]
    pub fn rolled_back(&self) -> bool {
        self.rolled_back
    }

    /// Get a summary of the execution for display.
    #[must_use]
    pub fn summary(&self) -> String {
        let mut lines = Vec::new();
        for record in &self.records {
            let status = match record.status {
                StepStatus::Pending => "·",
                StepStatus::Running => "…",
                StepStatus::Succeeded => "✓",
                StepStatus::Failed => "✗",
                StepStatus::Compensated => "↩",
            };
            match record.alternative {
                Some(alternative) if alternative > 0 => lines.push(format!(
                    "{status} step {} (alternative {alternative})",
                    record.index
                )),
                _ => lines.push(format!("{status} step {}", record.index)),
            }
        }
        lines.join("\n")
    }
}
