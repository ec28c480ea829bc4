// common/mod.rs — In-memory collaborators for driving the engine in tests.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

use hooks_event::{
    AnalysisPoll, AnalysisRequest, AnalysisRequester, AnalysisResult, AnalysisStatus,
    Classification, CollaboratorError, Collaborators, DispatchTarget, EngineConfig, EventName,
    ExtractedData, GitChange, GitInfo, GitInfoRequest, GitInfoResolver, HookError, HookSelection,
    HookSelector, Initiator, InitiatorRequest, InitiatorResolver, LifecycleEngine,
    LifecycleNotice, ManualTarget, NotificationSink, OperationPoll, PayloadExtractor,
    PullRequestChange, RepositoryEvent, RunCorrelation, SigningKeyRequest, SigningKeyResolver,
    WorkflowStartRequest, WorkflowStarter,
};

/// What the fake collaborators answer.
#[derive(Default)]
pub struct Script {
    pub projects: Vec<String>,
    /// Failures returned by `projects_for_repository` before it succeeds.
    pub project_lookup_failures: Mutex<VecDeque<CollaboratorError>>,
    /// InProgress answers before an analysis resolves. `None` never resolves.
    pub analysis_polls_before_done: Option<usize>,
    pub analysis_polls: Mutex<HashMap<String, usize>>,
    pub targets: Vec<DispatchTarget>,
    pub updated_files: Vec<String>,
    /// Workflows whose start is rejected.
    pub rejected_starts: Vec<String>,
    /// Workflows whose start crashes the starter.
    pub crashing_starts: Vec<String>,
    /// Transient start failures per workflow before it starts.
    pub flaky_starts: Mutex<HashMap<String, usize>>,
    pub started: Mutex<Vec<WorkflowStartRequest>>,
    pub run_numbers: AtomicI64,
    pub signing_key: Option<String>,
}

impl Script {
    pub fn started_workflows(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .started
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.target.workflow_name.clone())
            .collect();
        names.sort();
        names
    }
}

struct Fake(Arc<Script>);

impl PayloadExtractor for Fake {
    fn extract(
        &self,
        classification: Classification,
        _vcs_server_name: &str,
        _repository_name: &str,
        _body: &[u8],
    ) -> Result<ExtractedData, CollaboratorError> {
        let change = GitChange {
            commit: "abc123".into(),
            commit_from: "def456".into(),
            commit_message: "update pipeline".into(),
            git_ref: "refs/heads/main".into(),
            paths: vec![".cds/workflows/build.yml".into()],
            ..Default::default()
        };
        match classification.name() {
            EventName::Push | EventName::WorkflowUpdate | EventName::ModelUpdate => {
                Ok(ExtractedData::Git(change))
            }
            EventName::PullRequest | EventName::PullRequestComment => {
                Ok(ExtractedData::PullRequest(PullRequestChange {
                    change,
                    pull_request_id: 7,
                    pull_request_ref_to: "refs/heads/main".into(),
                }))
            }
            EventName::Manual => Ok(ExtractedData::Manual(ManualTarget {
                project: "PROJ".into(),
                workflow: "build".into(),
                target_branch: Some("main".into()),
                ..Default::default()
            })),
            other => Err(CollaboratorError::fatal(format!(
                "no extractor for {} events",
                other
            ))),
        }
    }
}

impl AnalysisRequester for Fake {
    fn projects_for_repository(
        &self,
        _vcs_server_name: &str,
        _repository_name: &str,
    ) -> Result<Vec<String>, CollaboratorError> {
        if let Some(err) = self.0.project_lookup_failures.lock().unwrap().pop_front() {
            return Err(err);
        }
        Ok(self.0.projects.clone())
    }

    fn request_analysis(&self, request: &AnalysisRequest) -> Result<String, CollaboratorError> {
        Ok(format!("analysis-{}", request.project_key))
    }

    fn analysis_status(
        &self,
        _project_key: &str,
        analysis_id: &str,
    ) -> Result<AnalysisPoll, CollaboratorError> {
        let Some(before_done) = self.0.analysis_polls_before_done else {
            return Ok(AnalysisPoll::InProgress);
        };
        let mut polls = self.0.analysis_polls.lock().unwrap();
        let seen = polls.entry(analysis_id.to_string()).or_insert(0);
        *seen += 1;
        if *seen <= before_done {
            return Ok(AnalysisPoll::InProgress);
        }
        Ok(AnalysisPoll::Resolved(AnalysisResult {
            status: AnalysisStatus::Success,
            ..Default::default()
        }))
    }
}

impl HookSelector for Fake {
    fn select(&self, _event: &RepositoryEvent) -> Result<HookSelection, CollaboratorError> {
        Ok(HookSelection {
            targets: self.0.targets.clone(),
            ..Default::default()
        })
    }
}

impl SigningKeyResolver for Fake {
    fn request_signing_key(&self, request: &SigningKeyRequest) -> Result<String, CollaboratorError> {
        Ok(format!("sign-op-{}", request.commit))
    }

    fn signing_key_status(
        &self,
        _operation_id: &str,
    ) -> Result<OperationPoll<String>, CollaboratorError> {
        match &self.0.signing_key {
            Some(key) => Ok(OperationPoll::Done(key.clone())),
            None => Ok(OperationPoll::Failed("commit is not signed".into())),
        }
    }
}

impl InitiatorResolver for Fake {
    fn resolve_initiator(&self, request: &InitiatorRequest) -> Result<Initiator, CollaboratorError> {
        Ok(Initiator {
            vcs_username: Some(format!("owner-of-{}", request.sign_key)),
            ..Default::default()
        })
    }
}

impl GitInfoResolver for Fake {
    fn request_git_info(&self, request: &GitInfoRequest) -> Result<String, CollaboratorError> {
        Ok(format!("git-op-{}", request.commit))
    }

    fn git_info_status(
        &self,
        _operation_uuid: &str,
    ) -> Result<OperationPoll<GitInfo>, CollaboratorError> {
        Ok(OperationPoll::Done(GitInfo {
            semver_current: "1.2.0".into(),
            semver_next: "1.2.1".into(),
            updated_files: self.0.updated_files.clone(),
        }))
    }
}

impl WorkflowStarter for Fake {
    fn start(&self, request: &WorkflowStartRequest) -> Result<RunCorrelation, CollaboratorError> {
        let name = &request.target.workflow_name;
        if self.0.crashing_starts.contains(name) {
            panic!("workflow starter crashed on {}", name);
        }
        if self.0.rejected_starts.contains(name) {
            return Err(CollaboratorError::fatal(format!("workflow {} is invalid", name)));
        }
        if let Some(left) = self.0.flaky_starts.lock().unwrap().get_mut(name) {
            if *left > 0 {
                *left -= 1;
                return Err(CollaboratorError::transient("workflow service unavailable"));
            }
        }
        self.0.started.lock().unwrap().push(request.clone());
        let run_number = self.0.run_numbers.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(RunCorrelation {
            run_id: format!("run-{}", name),
            run_number,
        })
    }
}

pub fn collaborators(script: &Arc<Script>) -> Collaborators {
    Collaborators {
        extractor: Box::new(Fake(script.clone())),
        analysis: Box::new(Fake(script.clone())),
        hooks: Box::new(Fake(script.clone())),
        signing_keys: Box::new(Fake(script.clone())),
        initiators: Box::new(Fake(script.clone())),
        git_info: Box::new(Fake(script.clone())),
        workflows: Box::new(Fake(script.clone())),
    }
}

/// Config polling git info without delay.
pub fn test_config() -> EngineConfig {
    EngineConfig {
        git_info_check_interval_secs: 0,
        ..Default::default()
    }
}

pub fn engine(script: &Arc<Script>) -> LifecycleEngine {
    LifecycleEngine::new(collaborators(script), test_config())
}

pub fn target(project: &str, workflow: &str) -> DispatchTarget {
    DispatchTarget {
        project_key: project.into(),
        vcs_identifier: "github".into(),
        repository_identifier: "org/repo".into(),
        workflow_name: workflow.into(),
        entity_id: format!("entity-{}", workflow),
        git_ref: "refs/heads/main".into(),
        commit: "abc123".into(),
        hook_type: "repository".into(),
        ..Default::default()
    }
}

pub fn new_event(name: &str, event_type: &str) -> RepositoryEvent {
    let classification = Classification::parse(name, event_type).unwrap();
    RepositoryEvent::new("github", "org/repo", classification, b"{}".to_vec())
}

/// Advance until the record is terminal.
pub fn drive(engine: &LifecycleEngine, event: &mut RepositoryEvent) {
    for _ in 0..50 {
        if event.is_terminated() {
            return;
        }
        engine.advance(event).unwrap();
    }
    panic!("event {} did not terminate: {}", event.full_name(), event.stage());
}

/// Records every notice it receives.
#[derive(Clone, Default)]
pub struct RecordingSink(pub Arc<Mutex<Vec<LifecycleNotice>>>);

impl NotificationSink for RecordingSink {
    fn send(&self, notice: &LifecycleNotice) -> Result<(), HookError> {
        self.0.lock().unwrap().push(notice.clone());
        Ok(())
    }
}
