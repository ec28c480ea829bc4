// callback.rs — Results pushed back by collaborators instead of polled.
//
// A callback is addressed by event uuid, VCS server and repository. It either
// resolves one analysis or settles the signing-key operation.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::HookError;
use crate::event::RepositoryEvent;
use crate::legacy::resolve_initiator;
use crate::model::{AnalysisStatus, EntityFullName, Initiator, OperationStatus, SkippedHook};

/// Outcome of one analysis, pushed by the analysis service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisCallback {
    pub analysis_id: String,
    pub analysis_status: AnalysisStatus,
    #[serde(default)]
    pub error: String,
    #[serde(default)]
    pub models: Vec<EntityFullName>,
    #[serde(default)]
    pub workflows: Vec<EntityFullName>,
    #[serde(default)]
    pub skipped_workflows: Vec<EntityFullName>,
    #[serde(default)]
    pub skipped_hooks: Vec<SkippedHook>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initiator: Option<Initiator>,
    // Older senders only fill these two.
    #[serde(default, rename = "user_id", skip_serializing)]
    pub deprecated_user_id: Option<String>,
    #[serde(default, rename = "username", skip_serializing)]
    pub deprecated_username: Option<String>,
}

impl AnalysisCallback {
    /// Initiator carried by the callback, upgrading deprecated fields.
    pub fn resolved_initiator(&self) -> Option<Initiator> {
        resolve_initiator(
            self.initiator.clone(),
            self.deprecated_user_id.as_deref(),
            self.deprecated_username.as_deref(),
        )
    }
}

/// Final state of the signing-key operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SigningKeyCallback {
    pub operation_id: String,
    pub status: OperationStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sign_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "callback", rename_all = "snake_case")]
pub enum CallbackPayload {
    Analysis(AnalysisCallback),
    SigningKey(SigningKeyCallback),
}

impl CallbackPayload {
    pub fn kind(&self) -> &'static str {
        match self {
            CallbackPayload::Analysis(_) => "analysis",
            CallbackPayload::SigningKey(_) => "signing_key",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HookEventCallback {
    pub hook_event_uuid: Uuid,
    pub vcs_server_name: String,
    pub repository_name: String,
    #[serde(flatten)]
    pub payload: CallbackPayload,
}

impl HookEventCallback {
    /// Apply the callback to its event. The record is left untouched when
    /// the callback is addressed elsewhere or names an unknown operation.
    pub(crate) fn apply_to(&self, event: &mut RepositoryEvent) -> Result<(), HookError> {
        let uuid = event.uuid();
        if self.hook_event_uuid != uuid
            || self.vcs_server_name != event.vcs_server_name()
            || self.repository_name != event.repository_name()
        {
            return Err(HookError::CallbackMismatch {
                uuid,
                reason: format!(
                    "addressed to {}/{}/{}",
                    self.vcs_server_name, self.repository_name, self.hook_event_uuid
                ),
            });
        }
        if event.is_terminated() {
            return Err(HookError::Terminated {
                uuid,
                stage: event.stage().to_string(),
            });
        }

        match &self.payload {
            CallbackPayload::Analysis(cb) => {
                let analysis = event
                    .analyses
                    .iter_mut()
                    .find(|a| a.analyze_id == cb.analysis_id)
                    .ok_or_else(|| HookError::CallbackMismatch {
                        uuid,
                        reason: format!("unknown analysis {}", cb.analysis_id),
                    })?;
                if analysis.status.is_resolved() {
                    return Err(HookError::CallbackMismatch {
                        uuid,
                        reason: format!(
                            "analysis {} already resolved ({})",
                            cb.analysis_id, analysis.status
                        ),
                    });
                }
                analysis.status = cb.analysis_status;
                analysis.error = cb.error.clone();
                event.model_updated.extend(cb.models.iter().cloned());
                event.workflow_updated.extend(cb.workflows.iter().cloned());
                event
                    .skipped_workflows
                    .extend(cb.skipped_workflows.iter().cloned());
                event.skipped_hooks.extend(cb.skipped_hooks.iter().cloned());
                if event.initiator.is_none() {
                    event.initiator = cb.resolved_initiator();
                }
            }
            CallbackPayload::SigningKey(cb) => {
                let operation = event
                    .signing_key_operation
                    .as_mut()
                    .filter(|op| op.id == cb.operation_id)
                    .ok_or_else(|| HookError::CallbackMismatch {
                        uuid,
                        reason: format!("unknown signing key operation {}", cb.operation_id),
                    })?;
                operation.status = cb.status;
                operation.error = cb.error.clone();
                if cb.status == OperationStatus::Done {
                    event.sign_key = cb.sign_key.clone();
                }
            }
        }
        event.touch();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classification::Classification;
    use crate::model::{AnalysisOutcome, SigningKeyOperation};

    fn event_with_analysis() -> RepositoryEvent {
        let mut event = RepositoryEvent::new(
            "github",
            "org/repo",
            Classification::parse("push", "").unwrap(),
            Vec::new(),
        );
        event
            .analyses
            .push(AnalysisOutcome::requested("PROJ", "an-1"));
        event
    }

    fn analysis_callback(event: &RepositoryEvent, json_extra: &str) -> HookEventCallback {
        let json = format!(
            r#"{{
                "hook_event_uuid": "{}",
                "vcs_server_name": "github",
                "repository_name": "org/repo",
                "callback": "analysis",
                "analysis_id": "an-1",
                "analysis_status": "Success"{}
            }}"#,
            event.uuid(),
            json_extra
        );
        serde_json::from_str(&json).unwrap()
    }

    #[test]
    fn analysis_callback_resolves_the_outcome() {
        let mut event = event_with_analysis();
        let cb = analysis_callback(
            &event,
            r#", "workflows": [{"project_key":"PROJ","vcs_name":"github","repo_name":"org/repo","name":"build","ref":"refs/heads/main"}]"#,
        );
        cb.apply_to(&mut event).unwrap();
        assert_eq!(event.analyses()[0].status, AnalysisStatus::Success);
        assert_eq!(event.workflow_updated().len(), 1);
    }

    #[test]
    fn replayed_analysis_callback_is_rejected() {
        let mut event = event_with_analysis();
        let cb = analysis_callback(
            &event,
            r#", "models": [{"project_key":"PROJ","vcs_name":"github","repo_name":"org/repo","name":"docker","ref":"refs/heads/main"}]"#,
        );
        cb.apply_to(&mut event).unwrap();
        assert!(matches!(
            cb.apply_to(&mut event),
            Err(HookError::CallbackMismatch { .. })
        ));
        assert_eq!(event.model_updated().len(), 1);
    }

    #[test]
    fn callback_after_polling_resolved_is_rejected() {
        let mut event = event_with_analysis();
        event.analyses[0].status = AnalysisStatus::Error;
        event.analyses[0].error = "analysis an-1 not resolved after 60 checks".into();
        let cb = analysis_callback(&event, "");
        assert!(cb.apply_to(&mut event).is_err());
        assert_eq!(event.analyses()[0].status, AnalysisStatus::Error);
    }

    #[test]
    fn deprecated_callback_user_fields_map_to_initiator() {
        let mut event = event_with_analysis();
        let cb = analysis_callback(&event, r#", "user_id": "u-1", "username": "jdoe""#);
        cb.apply_to(&mut event).unwrap();
        assert_eq!(event.initiator().unwrap().username.as_deref(), Some("jdoe"));

        let json = serde_json::to_value(&cb).unwrap();
        assert!(json.get("user_id").is_none());
        assert!(json.get("username").is_none());
    }

    #[test]
    fn misaddressed_callback_is_rejected() {
        let mut event = event_with_analysis();
        let mut cb = analysis_callback(&event, "");
        cb.repository_name = "org/other".into();
        assert!(matches!(
            cb.apply_to(&mut event),
            Err(HookError::CallbackMismatch { .. })
        ));
        assert_eq!(event.analyses()[0].status, AnalysisStatus::InProgress);
    }

    #[test]
    fn unknown_analysis_is_rejected() {
        let mut event = event_with_analysis();
        let mut cb = analysis_callback(&event, "");
        if let CallbackPayload::Analysis(a) = &mut cb.payload {
            a.analysis_id = "an-404".into();
        }
        assert!(cb.apply_to(&mut event).is_err());
    }

    #[test]
    fn signing_key_callback_sets_key() {
        let mut event = event_with_analysis();
        event.signing_key_operation = Some(SigningKeyOperation {
            id: "op-1".into(),
            status: OperationStatus::Pending,
            error: None,
        });
        let cb = HookEventCallback {
            hook_event_uuid: event.uuid(),
            vcs_server_name: "github".into(),
            repository_name: "org/repo".into(),
            payload: CallbackPayload::SigningKey(SigningKeyCallback {
                operation_id: "op-1".into(),
                status: OperationStatus::Done,
                sign_key: Some("ABCDEF0123".into()),
                error: None,
            }),
        };
        cb.apply_to(&mut event).unwrap();
        assert_eq!(event.sign_key(), Some("ABCDEF0123"));
        assert_eq!(event.signing_key_status(), Some(OperationStatus::Done));
    }
}
