// transitions.rs — Stage transition table for a repository event.
//
//   Scheduled → Analyzing → CheckAnalyzing → WorkflowHooks → SignKey
//     → GitInfo → Workflow → Done
//   Analyzing → WorkflowHooks        (no analysis needed)
//   WorkflowHooks → GitInfo          (no signing key needed)
//   WorkflowHooks → Done | Skipped   (nothing to trigger)
//   any non-terminal → itself        (still waiting on a collaborator)
//   any non-terminal → Error         (fatal failure or cancellation)
//
// Every (stage, outcome) pair not listed is rejected.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Processing stage of a repository event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventStage {
    Scheduled,
    Analyzing,
    CheckAnalyzing,
    WorkflowHooks,
    SignKey,
    GitInfo,
    Workflow,
    Done,
    Error,
    Skipped,
}

impl EventStage {
    pub const ALL: [EventStage; 10] = [
        EventStage::Scheduled,
        EventStage::Analyzing,
        EventStage::CheckAnalyzing,
        EventStage::WorkflowHooks,
        EventStage::SignKey,
        EventStage::GitInfo,
        EventStage::Workflow,
        EventStage::Done,
        EventStage::Error,
        EventStage::Skipped,
    ];

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            EventStage::Done | EventStage::Error | EventStage::Skipped
        )
    }
}

impl fmt::Display for EventStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EventStage::Scheduled => "Scheduled",
            EventStage::Analyzing => "Analyzing",
            EventStage::CheckAnalyzing => "CheckAnalyzing",
            EventStage::WorkflowHooks => "WorkflowHooks",
            EventStage::SignKey => "SignKey",
            EventStage::GitInfo => "GitInfo",
            EventStage::Workflow => "Workflow",
            EventStage::Done => "Done",
            EventStage::Error => "Error",
            EventStage::Skipped => "Skipped",
        };
        f.write_str(s)
    }
}

/// What a stage handler concluded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageOutcome {
    /// Ingestion accepted the event and its payload is extracted.
    Accepted,
    /// Analysis requests went out; completion is polled.
    AnalysesRequested,
    /// Nothing to analyze for this event.
    NoAnalysisRequired,
    /// Every analysis reached a resolved status.
    AnalysesResolved,
    /// At least one workflow was selected.
    HooksSelected { signing_key_required: bool },
    /// No workflow matched. `analyzed` tells whether analyses ran.
    NothingToTrigger { analyzed: bool },
    /// The signing key (and initiator) are known.
    SigningKeyResolved,
    /// Every dispatch has its git info or is terminal.
    GitInfoResolved,
    /// Every dispatch reached Done, Error or Skipped.
    DispatchesSettled,
    /// Still waiting on a collaborator; stay in the current stage.
    Pending,
    /// Fatal failure, or external cancellation.
    Failed,
}

impl fmt::Display for StageOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageOutcome::Accepted => write!(f, "accepted"),
            StageOutcome::AnalysesRequested => write!(f, "analyses_requested"),
            StageOutcome::NoAnalysisRequired => write!(f, "no_analysis_required"),
            StageOutcome::AnalysesResolved => write!(f, "analyses_resolved"),
            StageOutcome::HooksSelected {
                signing_key_required,
            } => write!(f, "hooks_selected(signing_key={})", signing_key_required),
            StageOutcome::NothingToTrigger { analyzed } => {
                write!(f, "nothing_to_trigger(analyzed={})", analyzed)
            }
            StageOutcome::SigningKeyResolved => write!(f, "signing_key_resolved"),
            StageOutcome::GitInfoResolved => write!(f, "git_info_resolved"),
            StageOutcome::DispatchesSettled => write!(f, "dispatches_settled"),
            StageOutcome::Pending => write!(f, "pending"),
            StageOutcome::Failed => write!(f, "failed"),
        }
    }
}

/// Look up the next stage. `None` means the pair is not in the table.
pub fn next_stage(current: EventStage, outcome: StageOutcome) -> Option<EventStage> {
    use EventStage as S;
    use StageOutcome as O;

    if current.is_terminal() {
        return None;
    }

    let next = match (current, outcome) {
        (_, O::Pending) => current,
        (_, O::Failed) => S::Error,

        (S::Scheduled, O::Accepted) => S::Analyzing,

        (S::Analyzing, O::AnalysesRequested) => S::CheckAnalyzing,
        (S::Analyzing, O::NoAnalysisRequired) => S::WorkflowHooks,

        (S::CheckAnalyzing, O::AnalysesResolved) => S::WorkflowHooks,

        (
            S::WorkflowHooks,
            O::HooksSelected {
                signing_key_required: true,
            },
        ) => S::SignKey,
        (
            S::WorkflowHooks,
            O::HooksSelected {
                signing_key_required: false,
            },
        ) => S::GitInfo,
        (S::WorkflowHooks, O::NothingToTrigger { analyzed: true }) => S::Done,
        (S::WorkflowHooks, O::NothingToTrigger { analyzed: false }) => S::Skipped,

        (S::SignKey, O::SigningKeyResolved) => S::GitInfo,

        (S::GitInfo, O::GitInfoResolved) => S::Workflow,

        (S::Workflow, O::DispatchesSettled) => S::Done,

        _ => return None,
    };
    Some(next)
}
