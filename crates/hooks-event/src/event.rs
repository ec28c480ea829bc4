// event.rs — RepositoryEvent: one inbound occurrence from one repository.
//
// The record is created at Scheduled by the ingestion boundary and is then
// mutated only by the lifecycle engine. Classification and the raw body never
// change; extracted data is written once; the stage only moves along the
// transition table.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::classification::{Classification, EventName, EventType};
use crate::dispatch::WorkflowDispatch;
use crate::error::HookError;
use crate::extracted::ExtractedData;
use crate::model::{
    AnalysisOutcome, EntityFullName, Initiator, OperationStatus, SigningKeyOperation, SkippedHook,
};
use crate::transitions::{next_stage, EventStage, StageOutcome};

/// Lifecycle record of a repository event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryEvent {
    uuid: Uuid,
    vcs_server_name: String,
    repository_name: String,
    #[serde(flatten)]
    classification: Classification,
    /// Raw payload, kept for audit and replay.
    #[serde(with = "body_base64", default)]
    body: Vec<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    extracted_data: Option<ExtractedData>,
    stage: EventStage,
    created: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    processing_started: Option<DateTime<Utc>>,
    last_update: DateTime<Utc>,
    #[serde(default)]
    last_error: String,
    #[serde(default)]
    nb_errors: u64,
    #[serde(default)]
    pub(crate) analyses: Vec<AnalysisOutcome>,
    #[serde(default)]
    pub(crate) model_updated: Vec<EntityFullName>,
    #[serde(default)]
    pub(crate) workflow_updated: Vec<EntityFullName>,
    #[serde(default)]
    pub(crate) skipped_workflows: Vec<EntityFullName>,
    #[serde(default)]
    pub(crate) skipped_hooks: Vec<SkippedHook>,
    #[serde(default)]
    pub(crate) workflow_dispatches: Vec<WorkflowDispatch>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) sign_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) signing_key_operation: Option<SigningKeyOperation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) initiator: Option<Initiator>,
    /// Restricts analysis and hook selection to one project.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    hook_project_key: Option<String>,
}

impl RepositoryEvent {
    /// Create a new record at Scheduled. The classification was validated
    /// when it was built.
    pub fn new(
        vcs_server_name: impl Into<String>,
        repository_name: impl Into<String>,
        classification: Classification,
        body: Vec<u8>,
    ) -> Self {
        let now = Utc::now();
        Self {
            uuid: Uuid::new_v4(),
            vcs_server_name: vcs_server_name.into(),
            repository_name: repository_name.into(),
            classification,
            body,
            extracted_data: None,
            stage: EventStage::Scheduled,
            created: now,
            processing_started: None,
            last_update: now,
            last_error: String::new(),
            nb_errors: 0,
            analyses: Vec::new(),
            model_updated: Vec::new(),
            workflow_updated: Vec::new(),
            skipped_workflows: Vec::new(),
            skipped_hooks: Vec::new(),
            workflow_dispatches: Vec::new(),
            sign_key: None,
            signing_key_operation: None,
            initiator: None,
            hook_project_key: None,
        }
    }

    pub fn with_uuid(mut self, uuid: Uuid) -> Self {
        self.uuid = uuid;
        self
    }

    pub fn with_initiator(mut self, initiator: Initiator) -> Self {
        self.initiator = Some(initiator);
        self
    }

    pub fn with_hook_project_key(mut self, project_key: impl Into<String>) -> Self {
        self.hook_project_key = Some(project_key.into());
        self
    }

    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    pub fn vcs_server_name(&self) -> &str {
        &self.vcs_server_name
    }

    pub fn repository_name(&self) -> &str {
        &self.repository_name
    }

    pub fn classification(&self) -> Classification {
        self.classification
    }

    pub fn event_name(&self) -> EventName {
        self.classification.name()
    }

    pub fn event_type(&self) -> EventType {
        self.classification.event_type()
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn extracted_data(&self) -> Option<&ExtractedData> {
        self.extracted_data.as_ref()
    }

    pub fn stage(&self) -> EventStage {
        self.stage
    }

    pub fn created(&self) -> DateTime<Utc> {
        self.created
    }

    pub fn processing_started(&self) -> Option<DateTime<Utc>> {
        self.processing_started
    }

    pub fn last_update(&self) -> DateTime<Utc> {
        self.last_update
    }

    pub fn last_error(&self) -> &str {
        &self.last_error
    }

    pub fn nb_errors(&self) -> u64 {
        self.nb_errors
    }

    pub fn analyses(&self) -> &[AnalysisOutcome] {
        &self.analyses
    }

    pub fn model_updated(&self) -> &[EntityFullName] {
        &self.model_updated
    }

    pub fn workflow_updated(&self) -> &[EntityFullName] {
        &self.workflow_updated
    }

    pub fn skipped_workflows(&self) -> &[EntityFullName] {
        &self.skipped_workflows
    }

    pub fn skipped_hooks(&self) -> &[SkippedHook] {
        &self.skipped_hooks
    }

    pub fn workflow_dispatches(&self) -> &[WorkflowDispatch] {
        &self.workflow_dispatches
    }

    pub fn sign_key(&self) -> Option<&str> {
        self.sign_key.as_deref()
    }

    pub fn signing_key_operation(&self) -> Option<&SigningKeyOperation> {
        self.signing_key_operation.as_ref()
    }

    /// Status of the signing-key lookup, if one was requested.
    pub fn signing_key_status(&self) -> Option<OperationStatus> {
        self.signing_key_operation.as_ref().map(|op| op.status)
    }

    pub fn initiator(&self) -> Option<&Initiator> {
        self.initiator.as_ref()
    }

    pub fn hook_project_key(&self) -> Option<&str> {
        self.hook_project_key.as_deref()
    }

    /// `<vcs>/<repo>/<uuid>`, unique across the system.
    pub fn full_name(&self) -> String {
        format!(
            "{}/{}/{}",
            self.vcs_server_name, self.repository_name, self.uuid
        )
    }

    pub fn is_terminated(&self) -> bool {
        self.stage.is_terminal()
    }

    /// Store the extracted payload. Written once, and only with the variant
    /// matching the record's event name.
    pub fn set_extracted_data(&mut self, data: ExtractedData) -> Result<(), HookError> {
        if self.extracted_data.is_some() {
            return Err(HookError::ExtractedData {
                uuid: self.uuid,
                reason: "already set".to_string(),
            });
        }
        if !data.matches(self.event_name()) {
            return Err(HookError::ExtractedData {
                uuid: self.uuid,
                reason: format!(
                    "{} payload does not belong to a {} event",
                    data.kind(),
                    self.event_name()
                ),
            });
        }
        self.extracted_data = Some(data);
        self.touch();
        Ok(())
    }

    /// Apply a stage outcome through the transition table.
    pub fn apply(&mut self, outcome: StageOutcome) -> Result<EventStage, HookError> {
        if self.is_terminated() {
            return Err(HookError::Terminated {
                uuid: self.uuid,
                stage: self.stage.to_string(),
            });
        }
        let next = next_stage(self.stage, outcome).ok_or_else(|| HookError::InvalidTransition {
            uuid: self.uuid,
            from: self.stage.to_string(),
            outcome: outcome.to_string(),
        })?;
        if self.processing_started.is_none() {
            self.processing_started = Some(Utc::now());
        }
        self.stage = next;
        self.touch();
        Ok(next)
    }

    /// Record a failure. The counter is cumulative.
    pub fn record_error(&mut self, message: impl Into<String>) {
        self.last_error = message.into();
        self.nb_errors += 1;
        self.touch();
    }

    pub(crate) fn clear_error(&mut self) {
        self.last_error.clear();
    }

    /// Stop further progression. Dispatches already started are left alone.
    pub fn cancel(&mut self, reason: impl Into<String>) -> Result<(), HookError> {
        self.apply(StageOutcome::Failed)?;
        self.last_error = reason.into();
        Ok(())
    }

    /// Advance last_update; it never goes backwards.
    pub(crate) fn touch(&mut self) {
        let now = Utc::now();
        if now > self.last_update {
            self.last_update = now;
        }
    }

    /// Whether any analysis was requested for this event.
    pub fn analyzed(&self) -> bool {
        !self.analyses.is_empty()
    }
}

mod body_base64 {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(body: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(body))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extracted::{GitChange, ManualTarget};

    fn push_event() -> RepositoryEvent {
        let classification = Classification::parse("push", "").unwrap();
        RepositoryEvent::new(
            "github",
            "org/repo",
            classification,
            br#"{"ref":"refs/heads/main"}"#.to_vec(),
        )
    }

    #[test]
    fn new_event_is_scheduled_and_not_terminated() {
        let event = push_event();
        assert_eq!(event.stage(), EventStage::Scheduled);
        assert!(!event.is_terminated());
        assert!(event.processing_started().is_none());
        assert_eq!(event.nb_errors(), 0);
    }

    #[test]
    fn full_name_is_vcs_repo_uuid() {
        let uuid = Uuid::new_v4();
        let event = push_event().with_uuid(uuid);
        assert_eq!(event.full_name(), format!("github/org/repo/{}", uuid));
    }

    #[test]
    fn extracted_data_is_written_once() {
        let mut event = push_event();
        event
            .set_extracted_data(ExtractedData::Git(GitChange::default()))
            .unwrap();
        let again = event.set_extracted_data(ExtractedData::Git(GitChange::default()));
        assert!(matches!(again, Err(HookError::ExtractedData { .. })));
    }

    #[test]
    fn extracted_data_must_match_the_event_kind() {
        let mut event = push_event();
        let result = event.set_extracted_data(ExtractedData::Manual(ManualTarget::default()));
        assert!(matches!(result, Err(HookError::ExtractedData { .. })));
        assert!(event.extracted_data().is_none());
    }

    #[test]
    fn apply_moves_through_the_table_and_stamps_processing() {
        let mut event = push_event();
        let before = event.last_update();
        assert_eq!(
            event.apply(StageOutcome::Accepted).unwrap(),
            EventStage::Analyzing
        );
        assert!(event.processing_started().is_some());
        assert!(event.last_update() >= before);
    }

    #[test]
    fn illegal_outcome_is_rejected_without_mutation() {
        let mut event = push_event();
        let result = event.apply(StageOutcome::DispatchesSettled);
        assert!(matches!(result, Err(HookError::InvalidTransition { .. })));
        assert_eq!(event.stage(), EventStage::Scheduled);
    }

    #[test]
    fn is_terminated_matches_terminal_stages() {
        for stage in EventStage::ALL {
            let mut event = push_event();
            event.stage = stage;
            assert_eq!(event.is_terminated(), stage.is_terminal(), "{}", stage);
        }
    }

    #[test]
    fn cancel_moves_to_error_and_blocks_further_progress() {
        let mut event = push_event();
        event.apply(StageOutcome::Accepted).unwrap();
        event.cancel("stopped by operator").unwrap();
        assert_eq!(event.stage(), EventStage::Error);
        assert_eq!(event.last_error(), "stopped by operator");
        assert!(matches!(
            event.apply(StageOutcome::Pending),
            Err(HookError::Terminated { .. })
        ));
        assert!(event.cancel("again").is_err());
    }

    #[test]
    fn error_counter_is_cumulative() {
        let mut event = push_event();
        event.record_error("timeout");
        event.record_error("timeout again");
        event.clear_error();
        assert_eq!(event.nb_errors(), 2);
        assert!(event.last_error().is_empty());
    }

    #[test]
    fn record_serializes_body_as_base64_and_round_trips() {
        let event = push_event().with_initiator(Initiator::user("u-1", "jdoe"));
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event_name"], "push");
        assert_eq!(json["event_type"], "");
        assert_eq!(json["body"], "eyJyZWYiOiJyZWZzL2hlYWRzL21haW4ifQ==");
        assert!(json.get("user_id").is_none());
        let restored: RepositoryEvent = serde_json::from_value(json).unwrap();
        assert_eq!(restored, event);
    }
}
