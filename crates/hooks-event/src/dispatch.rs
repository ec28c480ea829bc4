// dispatch.rs — One attempt to start one workflow for a repository event.
//
// A WorkflowDispatch moves through its own substates:
//   Scheduled → AwaitingGitInfo → Ready → Done
//   (or Error / Skipped from any non-terminal substate)
// Identity fields live in an immutable DispatchTarget; only the substate,
// error, git info and run correlation change, and never out of a terminal
// substate.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use glob::Pattern;
use serde::{Deserialize, Serialize};

use crate::error::HookError;
use crate::model::{Initiator, OperationStatus};

pub const PATH_FILTER_MISS: &str = "no updated file matches the path filters";

/// Where a selected workflow lives and what it runs on.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchTarget {
    pub project_key: String,
    pub vcs_identifier: String,
    pub repository_identifier: String,
    pub workflow_name: String,
    pub entity_id: String,
    #[serde(rename = "ref")]
    pub git_ref: String,
    pub commit: String,
    /// Kind of hook that selected the workflow (repository, scheduler, ...).
    #[serde(default)]
    pub hook_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_commit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Glob patterns; when non-empty, at least one updated file must match.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub path_filters: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initiator: Option<Initiator>,
    /// The workflow only starts on commits with a verified signing key.
    #[serde(default)]
    pub require_signing_key: bool,
    /// Set when the model or workflow is deprecated or disabled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disabled_reason: Option<String>,
}

impl DispatchTarget {
    /// Check identity fields and path filters.
    pub fn validate(&self) -> Result<(), HookError> {
        let required = [
            ("project_key", &self.project_key),
            ("vcs_identifier", &self.vcs_identifier),
            ("repository_identifier", &self.repository_identifier),
            ("workflow_name", &self.workflow_name),
        ];
        for (field, value) in required {
            if value.is_empty() {
                return Err(HookError::InvalidTarget(format!(
                    "{} is empty for workflow {:?}",
                    field, self.workflow_name
                )));
            }
        }
        self.compiled_filters().map(|_| ())
    }

    fn compiled_filters(&self) -> Result<Vec<Pattern>, HookError> {
        self.path_filters
            .iter()
            .map(|filter| {
                Pattern::new(filter).map_err(|source| HookError::PathFilter {
                    filter: filter.clone(),
                    source,
                })
            })
            .collect()
    }

    /// Whether the updated files pass the path filters.
    pub fn accepts_files(&self, updated_files: &[String]) -> Result<bool, HookError> {
        let patterns = self.compiled_filters()?;
        if patterns.is_empty() {
            return Ok(true);
        }
        Ok(updated_files
            .iter()
            .any(|file| patterns.iter().any(|p| p.matches(file))))
    }
}

/// Substate of a dispatch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DispatchStatus {
    #[default]
    Scheduled,
    AwaitingGitInfo,
    Ready,
    Done,
    Error,
    Skipped,
}

impl DispatchStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DispatchStatus::Done | DispatchStatus::Error | DispatchStatus::Skipped
        )
    }

    pub fn can_transition_to(&self, next: DispatchStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        if matches!(next, DispatchStatus::Error | DispatchStatus::Skipped) {
            return true;
        }
        matches!(
            (self, next),
            (DispatchStatus::Scheduled, DispatchStatus::AwaitingGitInfo)
                | (DispatchStatus::AwaitingGitInfo, DispatchStatus::Ready)
                | (DispatchStatus::Ready, DispatchStatus::Done)
        )
    }
}

impl fmt::Display for DispatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchStatus::Scheduled => write!(f, "Scheduled"),
            DispatchStatus::AwaitingGitInfo => write!(f, "AwaitingGitInfo"),
            DispatchStatus::Ready => write!(f, "Ready"),
            DispatchStatus::Done => write!(f, "Done"),
            DispatchStatus::Error => write!(f, "Error"),
            DispatchStatus::Skipped => write!(f, "Skipped"),
        }
    }
}

/// Git data needed to start a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitInfo {
    #[serde(default)]
    pub semver_current: String,
    #[serde(default)]
    pub semver_next: String,
    #[serde(default)]
    pub updated_files: Vec<String>,
}

/// The git-info retrieval running for a dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitInfoOperation {
    pub uuid: String,
    pub status: OperationStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub last_check: DateTime<Utc>,
}

/// Correlation with the workflow run once it started.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunCorrelation {
    pub run_id: String,
    pub run_number: i64,
}

/// A workflow selected to run for a repository event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowDispatch {
    #[serde(flatten)]
    target: DispatchTarget,
    status: DispatchStatus,
    #[serde(default)]
    error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    run: Option<RunCorrelation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    git_info: Option<GitInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    operation: Option<GitInfoOperation>,
}

impl WorkflowDispatch {
    /// Create a dispatch for a validated target. Disabled targets start
    /// Skipped with their reason as error text.
    pub fn new(target: DispatchTarget) -> Result<Self, HookError> {
        target.validate()?;
        let (status, error) = match &target.disabled_reason {
            Some(reason) => (DispatchStatus::Skipped, reason.clone()),
            None => (DispatchStatus::Scheduled, String::new()),
        };
        Ok(Self {
            target,
            status,
            error,
            run: None,
            git_info: None,
            operation: None,
        })
    }

    pub fn target(&self) -> &DispatchTarget {
        &self.target
    }

    pub fn workflow_name(&self) -> &str {
        &self.target.workflow_name
    }

    pub fn status(&self) -> DispatchStatus {
        self.status
    }

    pub fn error(&self) -> &str {
        &self.error
    }

    pub fn run(&self) -> Option<&RunCorrelation> {
        self.run.as_ref()
    }

    /// Run number, 0 while no run started.
    pub fn run_number(&self) -> i64 {
        self.run.as_ref().map_or(0, |r| r.run_number)
    }

    pub fn git_info(&self) -> Option<&GitInfo> {
        self.git_info.as_ref()
    }

    pub fn operation(&self) -> Option<&GitInfoOperation> {
        self.operation.as_ref()
    }

    pub fn is_terminated(&self) -> bool {
        self.status.is_terminal()
    }

    fn transition(&mut self, next: DispatchStatus) -> Result<(), HookError> {
        if !self.status.can_transition_to(next) {
            return Err(HookError::InvalidDispatchTransition {
                workflow: self.target.workflow_name.clone(),
                from: self.status.to_string(),
                to: next.to_string(),
            });
        }
        self.status = next;
        Ok(())
    }

    /// The git-info operation was requested.
    pub fn begin_git_info(
        &mut self,
        operation_uuid: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<(), HookError> {
        self.transition(DispatchStatus::AwaitingGitInfo)?;
        self.operation = Some(GitInfoOperation {
            uuid: operation_uuid.into(),
            status: OperationStatus::Pending,
            error: None,
            last_check: now,
        });
        Ok(())
    }

    /// Whether the pending operation may be polled again.
    pub fn git_info_check_due(&self, now: DateTime<Utc>, interval: Duration) -> bool {
        match &self.operation {
            Some(op) if op.status == OperationStatus::Pending => op
                .last_check
                .checked_add_signed(interval)
                .is_some_and(|due| due <= now),
            _ => false,
        }
    }

    pub fn note_git_info_check(&mut self, now: DateTime<Utc>) {
        if let Some(op) = self.operation.as_mut() {
            op.last_check = now;
        }
    }

    /// Git info arrived. The dispatch becomes Ready, or Skipped when the
    /// path filters exclude every updated file.
    pub fn resolve_git_info(&mut self, info: GitInfo) -> Result<(), HookError> {
        if self.status != DispatchStatus::AwaitingGitInfo {
            return Err(HookError::InvalidDispatchTransition {
                workflow: self.target.workflow_name.clone(),
                from: self.status.to_string(),
                to: DispatchStatus::Ready.to_string(),
            });
        }
        let accepted = self.target.accepts_files(&info.updated_files)?;
        if let Some(op) = self.operation.as_mut() {
            op.status = OperationStatus::Done;
        }
        self.git_info = Some(info);
        if accepted {
            self.transition(DispatchStatus::Ready)
        } else {
            self.skip(PATH_FILTER_MISS)
        }
    }

    /// The git-info operation failed.
    pub fn fail_git_info(&mut self, message: impl Into<String>) -> Result<(), HookError> {
        let message = message.into();
        self.transition(DispatchStatus::Error)?;
        if let Some(op) = self.operation.as_mut() {
            op.status = OperationStatus::Error;
            op.error = Some(message.clone());
        }
        self.error = message;
        Ok(())
    }

    /// The workflow run started.
    pub fn mark_started(&mut self, run: RunCorrelation) -> Result<(), HookError> {
        self.transition(DispatchStatus::Done)?;
        self.run = Some(run);
        Ok(())
    }

    pub fn fail(&mut self, message: impl Into<String>) -> Result<(), HookError> {
        self.transition(DispatchStatus::Error)?;
        self.error = message.into();
        Ok(())
    }

    pub fn skip(&mut self, reason: impl Into<String>) -> Result<(), HookError> {
        self.transition(DispatchStatus::Skipped)?;
        self.error = reason.into();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target(workflow: &str) -> DispatchTarget {
        DispatchTarget {
            project_key: "PROJ".into(),
            vcs_identifier: "github".into(),
            repository_identifier: "org/repo".into(),
            workflow_name: workflow.into(),
            entity_id: "ent-1".into(),
            git_ref: "refs/heads/main".into(),
            commit: "abc123".into(),
            hook_type: "repository".into(),
            ..Default::default()
        }
    }

    fn info(files: &[&str]) -> GitInfo {
        GitInfo {
            semver_current: "1.0.0".into(),
            semver_next: "1.0.1".into(),
            updated_files: files.iter().map(|f| f.to_string()).collect(),
        }
    }

    #[test]
    fn new_dispatch_starts_scheduled() {
        let d = WorkflowDispatch::new(target("build")).unwrap();
        assert_eq!(d.status(), DispatchStatus::Scheduled);
        assert_eq!(d.run_number(), 0);
        assert!(d.error().is_empty());
    }

    #[test]
    fn disabled_target_starts_skipped() {
        let mut t = target("build");
        t.disabled_reason = Some("workflow is disabled".into());
        let d = WorkflowDispatch::new(t).unwrap();
        assert_eq!(d.status(), DispatchStatus::Skipped);
        assert_eq!(d.error(), "workflow is disabled");
    }

    #[test]
    fn empty_identity_field_is_rejected() {
        let mut t = target("build");
        t.vcs_identifier.clear();
        assert!(matches!(
            WorkflowDispatch::new(t),
            Err(HookError::InvalidTarget(_))
        ));
    }

    #[test]
    fn bad_path_filter_is_rejected() {
        let mut t = target("build");
        t.path_filters = vec!["src/[".into()];
        assert!(matches!(
            WorkflowDispatch::new(t),
            Err(HookError::PathFilter { .. })
        ));
    }

    #[test]
    fn full_forward_walk() {
        let now = Utc::now();
        let mut d = WorkflowDispatch::new(target("build")).unwrap();
        d.begin_git_info("op-1", now).unwrap();
        assert_eq!(d.status(), DispatchStatus::AwaitingGitInfo);
        d.resolve_git_info(info(&["src/main.rs"])).unwrap();
        assert_eq!(d.status(), DispatchStatus::Ready);
        assert_eq!(d.operation().unwrap().status, OperationStatus::Done);
        d.mark_started(RunCorrelation {
            run_id: "run-1".into(),
            run_number: 7,
        })
        .unwrap();
        assert_eq!(d.status(), DispatchStatus::Done);
        assert_eq!(d.run_number(), 7);
    }

    #[test]
    fn path_filters_exclude_unrelated_changes() {
        let mut t = target("docs");
        t.path_filters = vec!["docs/**".into()];
        let mut d = WorkflowDispatch::new(t).unwrap();
        d.begin_git_info("op-1", Utc::now()).unwrap();
        d.resolve_git_info(info(&["src/main.rs"])).unwrap();
        assert_eq!(d.status(), DispatchStatus::Skipped);
        assert_eq!(d.error(), PATH_FILTER_MISS);
    }

    #[test]
    fn path_filters_accept_matching_changes() {
        let mut t = target("docs");
        t.path_filters = vec!["docs/*.md".into()];
        let mut d = WorkflowDispatch::new(t).unwrap();
        d.begin_git_info("op-1", Utc::now()).unwrap();
        d.resolve_git_info(info(&["src/main.rs", "docs/intro.md"]))
            .unwrap();
        assert_eq!(d.status(), DispatchStatus::Ready);
    }

    #[test]
    fn terminal_dispatch_never_moves() {
        let mut d = WorkflowDispatch::new(target("build")).unwrap();
        d.fail("could not start").unwrap();
        assert!(d.is_terminated());

        assert!(matches!(
            d.skip("late"),
            Err(HookError::InvalidDispatchTransition { .. })
        ));
        assert!(d.fail("again").is_err());
        assert!(d.begin_git_info("op", Utc::now()).is_err());
        assert!(d
            .mark_started(RunCorrelation {
                run_id: "r".into(),
                run_number: 1
            })
            .is_err());
        assert_eq!(d.status(), DispatchStatus::Error);
        assert_eq!(d.error(), "could not start");
    }

    #[test]
    fn cannot_start_before_git_info() {
        let mut d = WorkflowDispatch::new(target("build")).unwrap();
        let result = d.mark_started(RunCorrelation {
            run_id: "r".into(),
            run_number: 1,
        });
        assert!(result.is_err());
        assert_eq!(d.status(), DispatchStatus::Scheduled);
    }

    #[test]
    fn git_info_failure_records_operation_error() {
        let mut d = WorkflowDispatch::new(target("build")).unwrap();
        d.begin_git_info("op-1", Utc::now()).unwrap();
        d.fail_git_info("unknown commit").unwrap();
        assert_eq!(d.status(), DispatchStatus::Error);
        let op = d.operation().unwrap();
        assert_eq!(op.status, OperationStatus::Error);
        assert_eq!(op.error.as_deref(), Some("unknown commit"));
    }

    #[test]
    fn check_due_respects_interval() {
        let start = Utc::now();
        let mut d = WorkflowDispatch::new(target("build")).unwrap();
        d.begin_git_info("op-1", start).unwrap();
        let interval = Duration::seconds(5);
        assert!(!d.git_info_check_due(start + Duration::seconds(2), interval));
        assert!(d.git_info_check_due(start + Duration::seconds(5), interval));
    }

    #[test]
    fn huge_interval_is_never_due() {
        let start = Utc::now();
        let mut d = WorkflowDispatch::new(target("build")).unwrap();
        d.begin_git_info("op-1", start).unwrap();
        assert!(!d.git_info_check_due(start, Duration::milliseconds(i64::MAX)));
    }

    #[test]
    fn serialization_keeps_target_flat() {
        let d = WorkflowDispatch::new(target("build")).unwrap();
        let json = serde_json::to_value(&d).unwrap();
        assert_eq!(json["workflow_name"], "build");
        assert_eq!(json["status"], "Scheduled");
        let restored: WorkflowDispatch = serde_json::from_value(json).unwrap();
        assert_eq!(restored, d);
    }
}
