use crate::device::{ActionStatus, ExecutionOutcome};

/// Ordered outcomes of one macro run. Execution stops at the first failed
/// action, so a failed result ends with its failing outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MacroResult {
    pub name: String,
    pub outcomes: Vec<ExecutionOutcome>,
    pub status: ActionStatus,
}

impl MacroResult {
    pub fn new(name: impl Into<String>, outcomes: Vec<ExecutionOutcome>) -> Self {
        let status = if outcomes.iter().all(ExecutionOutcome::is_success) {
            ActionStatus::Succeeded
        } else {
            ActionStatus::Failed
        };
        Self {
            name: name.into(),
            outcomes,
            status,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ActionStatus::Succeeded
    }

    /// One-based step number and outcome of the failing action.
    pub fn failure(&self) -> Option<(usize, &ExecutionOutcome)> {
        self.outcomes
            .iter()
            .enumerate()
            .find(|(_, o)| !o.is_success())
            .map(|(i, o)| (i + 1, o))
    }

    pub fn woke_device(&self) -> bool {
        self.outcomes.iter().any(|o| o.woke_device)
    }
}
