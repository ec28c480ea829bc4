// outgoing.rs — Workflow-run signals and the hooks they trigger.
//
// When a workflow run reaches a state other workflows listen to, a
// WorkflowRunOutgoingEvent is recorded with one trigger per listening hook.
// Each trigger creates a `workflow-run` RepositoryEvent on the hook's
// repository; the outgoing event is done once every trigger settled.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::classification::{Classification, EventName, EventType};
use crate::error::HookError;
use crate::event::RepositoryEvent;
use crate::extracted::{ExtractedData, WorkflowRunSource};

/// The run that emitted the signal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowRunSignal {
    pub workflow_project: String,
    pub workflow_vcs_server: String,
    pub workflow_repository: String,
    pub workflow_name: String,
    pub workflow_run_id: String,
    pub run_number: i64,
    pub run_status: String,
}

/// A hook listening for workflow-run signals.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutgoingHook {
    pub hook_id: String,
    pub project_key: String,
    pub vcs_server: String,
    pub repository: String,
    pub workflow_name: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TriggerStatus {
    #[default]
    Scheduled,
    Done,
    Error,
    Skipped,
}

impl TriggerStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TriggerStatus::Scheduled)
    }
}

impl fmt::Display for TriggerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TriggerStatus::Scheduled => write!(f, "Scheduled"),
            TriggerStatus::Done => write!(f, "Done"),
            TriggerStatus::Error => write!(f, "Error"),
            TriggerStatus::Skipped => write!(f, "Skipped"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutgoingHookTrigger {
    pub hook: OutgoingHook,
    pub status: TriggerStatus,
    #[serde(default)]
    pub error: String,
    /// The repository event created for this hook.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repository_event_id: Option<Uuid>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutgoingStatus {
    #[default]
    Scheduled,
    Triggering,
    Done,
    Error,
}

impl OutgoingStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, OutgoingStatus::Done | OutgoingStatus::Error)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowRunOutgoingEvent {
    uuid: Uuid,
    created: DateTime<Utc>,
    last_update: DateTime<Utc>,
    signal: WorkflowRunSignal,
    status: OutgoingStatus,
    #[serde(default)]
    last_error: String,
    #[serde(default)]
    nb_errors: u64,
    #[serde(default)]
    hooks_to_trigger: Vec<OutgoingHookTrigger>,
}

impl WorkflowRunOutgoingEvent {
    pub fn new(signal: WorkflowRunSignal, hooks: Vec<OutgoingHook>) -> Self {
        let now = Utc::now();
        let mut event = Self {
            uuid: Uuid::new_v4(),
            created: now,
            last_update: now,
            signal,
            status: OutgoingStatus::Scheduled,
            last_error: String::new(),
            nb_errors: 0,
            hooks_to_trigger: hooks
                .into_iter()
                .map(|hook| OutgoingHookTrigger {
                    hook,
                    status: TriggerStatus::Scheduled,
                    error: String::new(),
                    repository_event_id: None,
                })
                .collect(),
        };
        event.settle();
        event
    }

    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    pub fn signal(&self) -> &WorkflowRunSignal {
        &self.signal
    }

    pub fn status(&self) -> OutgoingStatus {
        self.status
    }

    pub fn last_error(&self) -> &str {
        &self.last_error
    }

    pub fn nb_errors(&self) -> u64 {
        self.nb_errors
    }

    pub fn last_update(&self) -> DateTime<Utc> {
        self.last_update
    }

    pub fn triggers(&self) -> &[OutgoingHookTrigger] {
        &self.hooks_to_trigger
    }

    /// `<project>/<vcs>/<repo>/<workflow>/<uuid>`
    pub fn full_name(&self) -> String {
        format!(
            "{}/{}/{}/{}/{}",
            self.signal.workflow_project,
            self.signal.workflow_vcs_server,
            self.signal.workflow_repository,
            self.signal.workflow_name,
            self.uuid
        )
    }

    pub fn is_terminated(&self) -> bool {
        self.status.is_terminal()
    }

    /// Build the `workflow-run` event a hook receives.
    pub fn repository_event_for(&self, hook: &OutgoingHook) -> Result<RepositoryEvent, HookError> {
        let classification = Classification::new(EventName::WorkflowRun, EventType::Empty)?;
        let body = serde_json::to_vec(&self.signal)?;
        let mut event = RepositoryEvent::new(
            hook.vcs_server.clone(),
            hook.repository.clone(),
            classification,
            body,
        )
        .with_hook_project_key(hook.project_key.clone());
        event.set_extracted_data(ExtractedData::WorkflowRun(WorkflowRunSource {
            project: self.signal.workflow_project.clone(),
            workflow: self.signal.workflow_name.clone(),
            workflow_run_id: self.signal.workflow_run_id.clone(),
            target_vcs: hook.vcs_server.clone(),
            target_repository: hook.repository.clone(),
            outgoing_hook_event_uuid: self.uuid.to_string(),
        }))?;
        Ok(event)
    }

    /// Record the result of triggering one hook.
    pub fn record_trigger(
        &mut self,
        hook_id: &str,
        result: Result<Uuid, String>,
    ) -> Result<(), HookError> {
        let trigger = self.live_trigger(hook_id)?;
        match result {
            Ok(repository_event_id) => {
                trigger.status = TriggerStatus::Done;
                trigger.repository_event_id = Some(repository_event_id);
            }
            Err(error) => {
                trigger.status = TriggerStatus::Error;
                trigger.error = error.clone();
                self.last_error = error;
                self.nb_errors += 1;
            }
        }
        self.settle();
        Ok(())
    }

    pub fn skip_trigger(&mut self, hook_id: &str, reason: &str) -> Result<(), HookError> {
        let trigger = self.live_trigger(hook_id)?;
        trigger.status = TriggerStatus::Skipped;
        trigger.error = reason.to_string();
        self.settle();
        Ok(())
    }

    /// Abort the outgoing event; triggers already done stay done.
    pub fn fail(&mut self, reason: &str) -> Result<(), HookError> {
        if self.is_terminated() {
            return Err(HookError::OutgoingTrigger {
                uuid: self.uuid,
                hook_id: String::new(),
                reason: "outgoing event is terminated".to_string(),
            });
        }
        self.status = OutgoingStatus::Error;
        self.last_error = reason.to_string();
        self.touch();
        Ok(())
    }

    fn live_trigger(&mut self, hook_id: &str) -> Result<&mut OutgoingHookTrigger, HookError> {
        let uuid = self.uuid;
        if self.status.is_terminal() {
            return Err(HookError::OutgoingTrigger {
                uuid,
                hook_id: hook_id.to_string(),
                reason: "outgoing event is terminated".to_string(),
            });
        }
        let trigger = self
            .hooks_to_trigger
            .iter_mut()
            .find(|t| t.hook.hook_id == hook_id)
            .ok_or_else(|| HookError::OutgoingTrigger {
                uuid,
                hook_id: hook_id.to_string(),
                reason: "unknown hook".to_string(),
            })?;
        if trigger.status.is_terminal() {
            return Err(HookError::OutgoingTrigger {
                uuid,
                hook_id: hook_id.to_string(),
                reason: format!("trigger already {}", trigger.status),
            });
        }
        Ok(trigger)
    }

    fn settle(&mut self) {
        if self.hooks_to_trigger.iter().all(|t| t.status.is_terminal()) {
            self.status = OutgoingStatus::Done;
        } else if self.hooks_to_trigger.iter().any(|t| t.status.is_terminal()) {
            self.status = OutgoingStatus::Triggering;
        }
        self.touch();
    }

    fn touch(&mut self) {
        let now = Utc::now();
        if now > self.last_update {
            self.last_update = now;
        }
    }
}
