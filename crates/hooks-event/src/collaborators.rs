// collaborators.rs — Ports to the systems the lifecycle engine drives.
//
// Each trait is a request/response boundary: the VCS providers, the project
// analysis service, the signing-key infrastructure and the workflow engine
// live behind them. Asynchronous work is modelled as "request returns an id,
// status lookup polls it"; a lookup never blocks waiting for completion.
//
// All ports are `Send + Sync` so dispatch workers can share them.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::classification::{Classification, EventName};
use crate::dispatch::{DispatchTarget, GitInfo, RunCorrelation};
use crate::error::CollaboratorError;
use crate::event::RepositoryEvent;
use crate::extracted::ExtractedData;
use crate::model::{AnalysisStatus, EntityFullName, Initiator, SkippedHook};

/// Result of polling an asynchronous operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationPoll<T> {
    Pending,
    Done(T),
    Failed(String),
}

/// Turns a raw payload into the typed data for its event kind.
pub trait PayloadExtractor: Send + Sync {
    fn extract(
        &self,
        classification: Classification,
        vcs_server_name: &str,
        repository_name: &str,
        body: &[u8],
    ) -> Result<ExtractedData, CollaboratorError>;
}

/// Analysis request for one project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisRequest {
    pub project_key: String,
    pub vcs_name: String,
    pub repo_name: String,
    #[serde(rename = "ref")]
    pub git_ref: String,
    pub commit: String,
    pub hook_event_uuid: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initiator: Option<Initiator>,
}

/// A resolved analysis and what it found.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnalysisResult {
    pub status: AnalysisStatus,
    pub error: String,
    pub models: Vec<EntityFullName>,
    pub workflows: Vec<EntityFullName>,
}

/// State of a requested analysis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnalysisPoll {
    InProgress,
    Resolved(AnalysisResult),
    /// The analysis service does not know the id (yet).
    NotFound,
}

pub trait AnalysisRequester: Send + Sync {
    /// Projects that have the repository configured.
    fn projects_for_repository(
        &self,
        vcs_server_name: &str,
        repository_name: &str,
    ) -> Result<Vec<String>, CollaboratorError>;

    /// Returns the analysis id.
    fn request_analysis(&self, request: &AnalysisRequest) -> Result<String, CollaboratorError>;

    fn analysis_status(
        &self,
        project_key: &str,
        analysis_id: &str,
    ) -> Result<AnalysisPoll, CollaboratorError>;
}

/// Workflows selected for an event, and what policy left out.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HookSelection {
    pub targets: Vec<DispatchTarget>,
    pub skipped_workflows: Vec<EntityFullName>,
    pub skipped_hooks: Vec<SkippedHook>,
}

/// Matches an event against configured hooks.
pub trait HookSelector: Send + Sync {
    fn select(&self, event: &RepositoryEvent) -> Result<HookSelection, CollaboratorError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SigningKeyRequest {
    pub project_key: String,
    pub vcs_name: String,
    pub repo_name: String,
    pub commit: String,
    #[serde(rename = "ref")]
    pub git_ref: String,
    pub hook_event_uuid: Uuid,
}

pub trait SigningKeyResolver: Send + Sync {
    /// Returns the operation id.
    fn request_signing_key(&self, request: &SigningKeyRequest) -> Result<String, CollaboratorError>;

    /// Polls to the signing key identifier.
    fn signing_key_status(
        &self,
        operation_id: &str,
    ) -> Result<OperationPoll<String>, CollaboratorError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitiatorRequest {
    pub project_key: String,
    pub vcs_name: String,
    pub repo_name: String,
    pub commit: String,
    pub sign_key: String,
    pub hook_event_uuid: Uuid,
}

/// Maps a signing key to the actor it belongs to.
pub trait InitiatorResolver: Send + Sync {
    fn resolve_initiator(&self, request: &InitiatorRequest) -> Result<Initiator, CollaboratorError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitInfoRequest {
    pub project_key: String,
    pub vcs_name: String,
    pub repo_name: String,
    #[serde(rename = "ref")]
    pub git_ref: String,
    pub commit: String,
    /// Changed files are computed since this commit when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub changesets_since: Option<String>,
    pub get_changesets: bool,
    pub get_semver: bool,
    pub hook_event_uuid: Uuid,
}

pub trait GitInfoResolver: Send + Sync {
    /// Returns the operation uuid.
    fn request_git_info(&self, request: &GitInfoRequest) -> Result<String, CollaboratorError>;

    fn git_info_status(
        &self,
        operation_uuid: &str,
    ) -> Result<OperationPoll<GitInfo>, CollaboratorError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowStartRequest {
    pub hook_event_uuid: Uuid,
    pub event_name: EventName,
    pub target: DispatchTarget,
    pub git_info: GitInfo,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sign_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initiator: Option<Initiator>,
}

/// Starts a workflow run. Once started, a run is never retracted.
pub trait WorkflowStarter: Send + Sync {
    fn start(&self, request: &WorkflowStartRequest) -> Result<RunCorrelation, CollaboratorError>;
}

/// The full set of ports the engine needs.
pub struct Collaborators {
    pub extractor: Box<dyn PayloadExtractor>,
    pub analysis: Box<dyn AnalysisRequester>,
    pub hooks: Box<dyn HookSelector>,
    pub signing_keys: Box<dyn SigningKeyResolver>,
    pub initiators: Box<dyn InitiatorResolver>,
    pub git_info: Box<dyn GitInfoResolver>,
    pub workflows: Box<dyn WorkflowStarter>,
}
