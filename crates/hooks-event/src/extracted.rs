// extracted.rs — Typed payload describing what an event changed.
//
// One variant per event kind. A record only ever holds the variant that
// matches its classification, so fields belonging to another kind cannot be
// populated by mistake.

use serde::{Deserialize, Serialize};

use crate::classification::EventName;

/// A change on a git ref: commits, author and touched paths.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitChange {
    pub commit: String,
    /// Commit the ref pointed to before the change (empty for a new ref).
    #[serde(default)]
    pub commit_from: String,
    #[serde(default)]
    pub commit_message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit_author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit_author_email: Option<String>,
    #[serde(default)]
    pub paths: Vec<String>,
    #[serde(rename = "ref")]
    pub git_ref: String,
}

/// A pull request and the change on its source ref.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequestChange {
    #[serde(flatten)]
    pub change: GitChange,
    pub pull_request_id: i64,
    /// Ref the pull request merges into.
    pub pull_request_ref_to: String,
}

/// Target of a manually triggered run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManualTarget {
    pub project: String,
    pub workflow: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_commit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_branch: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_tag: Option<String>,
}

impl ManualTarget {
    /// Fully qualified ref: a tag wins over a branch.
    pub fn git_ref(&self) -> Option<String> {
        match (&self.target_tag, &self.target_branch) {
            (Some(tag), _) => Some(format!("refs/tags/{}", tag)),
            (None, Some(branch)) => Some(format!("refs/heads/{}", branch)),
            (None, None) => None,
        }
    }
}

/// Target of a scheduled (cron) tick.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerTarget {
    pub project: String,
    pub workflow: String,
    pub vcs: String,
    pub repository: String,
    pub cron: String,
    pub timezone: String,
}

/// The workflow run whose outgoing signal produced this event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowRunSource {
    pub project: String,
    pub workflow: String,
    pub workflow_run_id: String,
    pub target_vcs: String,
    pub target_repository: String,
    pub outgoing_hook_event_uuid: String,
}

/// Target of a generic webhook call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookTarget {
    pub project: String,
    pub vcs: String,
    pub repository: String,
    pub workflow: String,
    pub hook_id: String,
}

/// Kind-specific extracted payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExtractedData {
    /// push, workflow-update and model-update.
    Git(GitChange),

    /// pull-request and pull-request-comment.
    PullRequest(PullRequestChange),

    Manual(ManualTarget),

    Scheduler(SchedulerTarget),

    WorkflowRun(WorkflowRunSource),

    Webhook(WebhookTarget),
}

impl ExtractedData {
    pub fn kind(&self) -> &'static str {
        match self {
            ExtractedData::Git(_) => "git",
            ExtractedData::PullRequest(_) => "pull_request",
            ExtractedData::Manual(_) => "manual",
            ExtractedData::Scheduler(_) => "scheduler",
            ExtractedData::WorkflowRun(_) => "workflow_run",
            ExtractedData::Webhook(_) => "webhook",
        }
    }

    /// Whether this variant is the one carried by events named `name`.
    pub fn matches(&self, name: EventName) -> bool {
        matches!(
            (self, name),
            (
                ExtractedData::Git(_),
                EventName::Push | EventName::WorkflowUpdate | EventName::ModelUpdate
            ) | (
                ExtractedData::PullRequest(_),
                EventName::PullRequest | EventName::PullRequestComment
            ) | (ExtractedData::Manual(_), EventName::Manual)
                | (ExtractedData::Scheduler(_), EventName::Scheduler)
                | (ExtractedData::WorkflowRun(_), EventName::WorkflowRun)
                | (ExtractedData::Webhook(_), EventName::Webhook)
        )
    }

    pub fn git_ref(&self) -> Option<String> {
        match self {
            ExtractedData::Git(change)
            | ExtractedData::PullRequest(PullRequestChange { change, .. }) => {
                non_empty(&change.git_ref)
            }
            ExtractedData::Manual(target) => target.git_ref(),
            _ => None,
        }
    }

    pub fn commit(&self) -> Option<String> {
        match self {
            ExtractedData::Git(change)
            | ExtractedData::PullRequest(PullRequestChange { change, .. }) => {
                non_empty(&change.commit)
            }
            ExtractedData::Manual(target) => target.target_commit.clone(),
            _ => None,
        }
    }

    /// Commit before the change, used to compute the changed files.
    pub fn commit_from(&self) -> Option<String> {
        match self {
            ExtractedData::Git(change)
            | ExtractedData::PullRequest(PullRequestChange { change, .. }) => {
                non_empty(&change.commit_from)
            }
            _ => None,
        }
    }

    pub fn paths(&self) -> &[String] {
        match self {
            ExtractedData::Git(change)
            | ExtractedData::PullRequest(PullRequestChange { change, .. }) => {
                &change.paths
            }
            _ => &[],
        }
    }
}

fn non_empty(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}
