// model.rs — Small value types shared by repository events and dispatches.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The actor (human or automation) an event is attributed to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Initiator {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// Username on the VCS server, when the actor has no local account.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vcs_username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vcs_email: Option<String>,
}

impl Initiator {
    pub fn user(user_id: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            username: Some(username.into()),
            ..Default::default()
        }
    }

    pub fn vcs_user(vcs_username: impl Into<String>) -> Self {
        Self {
            vcs_username: Some(vcs_username.into()),
            ..Default::default()
        }
    }

    /// Name to show for this initiator.
    pub fn display_name(&self) -> Option<&str> {
        self.username
            .as_deref()
            .or(self.vcs_username.as_deref())
            .or(self.user_id.as_deref())
    }
}

/// Fully qualified name of a project entity (workflow, model, ...) living in
/// a repository.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityFullName {
    pub project_key: String,
    pub vcs_name: String,
    pub repo_name: String,
    pub name: String,
    #[serde(rename = "ref")]
    pub git_ref: String,
}

impl fmt::Display for EntityFullName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}/{}@{}",
            self.project_key, self.vcs_name, self.repo_name, self.name, self.git_ref
        )
    }
}

/// A hook definition left out by policy. Informational only, never retried.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedHook {
    pub hook_id: String,
    pub project_key: String,
    pub workflow_name: String,
    pub reason: String,
}

/// Resolution status of one project's analysis.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum AnalysisStatus {
    #[default]
    InProgress,
    Success,
    Skipped,
    Error,
}

impl AnalysisStatus {
    pub fn is_resolved(&self) -> bool {
        !matches!(self, AnalysisStatus::InProgress)
    }
}

impl fmt::Display for AnalysisStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnalysisStatus::InProgress => write!(f, "InProgress"),
            AnalysisStatus::Success => write!(f, "Success"),
            AnalysisStatus::Skipped => write!(f, "Skipped"),
            AnalysisStatus::Error => write!(f, "Error"),
        }
    }
}

/// Outcome of the analysis requested on one target project.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisOutcome {
    pub analyze_id: String,
    pub project_key: String,
    pub status: AnalysisStatus,
    #[serde(default)]
    pub error: String,
    /// Lookups made while the analysis was unresolved. Independent of the
    /// event's error counter.
    #[serde(default)]
    pub find_retry_count: u64,
}

impl AnalysisOutcome {
    pub fn requested(project_key: impl Into<String>, analyze_id: impl Into<String>) -> Self {
        Self {
            analyze_id: analyze_id.into(),
            project_key: project_key.into(),
            ..Default::default()
        }
    }
}

/// Status of an asynchronous operation run by a collaborator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperationStatus {
    #[default]
    Pending,
    Done,
    Error,
}

impl fmt::Display for OperationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationStatus::Pending => write!(f, "Pending"),
            OperationStatus::Done => write!(f, "Done"),
            OperationStatus::Error => write!(f, "Error"),
        }
    }
}

/// The in-flight signing-key lookup of an event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SigningKeyOperation {
    pub id: String,
    pub status: OperationStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_full_name_display() {
        let name = EntityFullName {
            project_key: "PROJ".into(),
            vcs_name: "github".into(),
            repo_name: "org/repo".into(),
            name: "build".into(),
            git_ref: "refs/heads/main".into(),
        };
        assert_eq!(name.to_string(), "PROJ/github/org/repo/build@refs/heads/main");
    }

    #[test]
    fn only_in_progress_is_unresolved() {
        assert!(!AnalysisStatus::InProgress.is_resolved());
        assert!(AnalysisStatus::Success.is_resolved());
        assert!(AnalysisStatus::Skipped.is_resolved());
        assert!(AnalysisStatus::Error.is_resolved());
    }

    #[test]
    fn initiator_display_name_prefers_username() {
        let mut initiator = Initiator::vcs_user("octocat");
        assert_eq!(initiator.display_name(), Some("octocat"));
        initiator.username = Some("jdoe".into());
        assert_eq!(initiator.display_name(), Some("jdoe"));
    }

    #[test]
    fn empty_initiator_fields_are_omitted() {
        let json = serde_json::to_string(&Initiator::vcs_user("octocat")).unwrap();
        assert_eq!(json, r#"{"vcs_username":"octocat"}"#);
    }
}
