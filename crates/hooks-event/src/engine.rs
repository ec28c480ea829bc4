// engine.rs — LifecycleEngine: advances repository events one stage at a time.
//
// `advance` runs the handler of the record's current stage, turns what it
// concluded into a StageOutcome and applies it through the transition table.
// Handlers never block: a collaborator that has not finished yet yields
// `Pending` and the caller advances the record again later.
//
// Collaborator failures are recorded on the record:
//   - transient: counter +1, stage unchanged, until `max_retries` is reached
//   - fatal: the record goes to Error
// During GitInfo and Workflow, a failure belongs to the dispatch it hit. An
// exhausted retry budget there abandons the outstanding dispatches instead
// of failing the event.

use tracing::{debug, info, info_span, warn};

use crate::callback::HookEventCallback;
use crate::collaborators::{
    AnalysisPoll, AnalysisRequest, Collaborators, InitiatorRequest, OperationPoll,
    SigningKeyRequest,
};
use crate::config::EngineConfig;
use crate::dispatch::{DispatchStatus, WorkflowDispatch};
use crate::error::{CollaboratorError, HookError};
use crate::event::RepositoryEvent;
use crate::fanout::{git_info_step, run_workers, start_step, DispatchReport, FanoutContext};
use crate::model::{AnalysisOutcome, AnalysisStatus, OperationStatus, SigningKeyOperation};
use crate::notify::{LifecycleNotice, LogSink, NoticeDispatcher, NotificationSink};
use crate::transitions::{EventStage, StageOutcome};

/// Why a stage handler could not conclude.
enum StageFailure {
    /// A collaborator failed; handled by the retry policy.
    Collaborator(CollaboratorError),
    /// Dispatches could not be built from the selected hooks.
    Fanout(HookError),
    /// Engine misuse; returned to the caller.
    Engine(HookError),
}

impl From<CollaboratorError> for StageFailure {
    fn from(e: CollaboratorError) -> Self {
        StageFailure::Collaborator(e)
    }
}

impl From<HookError> for StageFailure {
    fn from(e: HookError) -> Self {
        StageFailure::Engine(e)
    }
}

type StageResult = Result<StageOutcome, StageFailure>;

/// Drives repository events through their lifecycle.
///
/// The engine holds no per-event state: different events can be advanced
/// from different threads through a shared reference.
pub struct LifecycleEngine {
    collaborators: Collaborators,
    config: EngineConfig,
    notices: NoticeDispatcher,
}

impl LifecycleEngine {
    pub fn new(collaborators: Collaborators, config: EngineConfig) -> Self {
        let mut notices = NoticeDispatcher::new();
        if let Some(path) = &config.notices_log {
            notices.add_sink(Box::new(LogSink::new(path)));
        }
        Self {
            collaborators,
            config,
            notices,
        }
    }

    pub fn with_sink(mut self, sink: Box<dyn NotificationSink>) -> Self {
        self.notices.add_sink(sink);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Advance the record by one step and return its stage afterwards.
    pub fn advance(&self, event: &mut RepositoryEvent) -> Result<EventStage, HookError> {
        if event.is_terminated() {
            return Err(HookError::Terminated {
                uuid: event.uuid(),
                stage: event.stage().to_string(),
            });
        }

        let from = event.stage();
        let span = info_span!("advance", event = %event.full_name(), stage = %from);
        let _enter = span.enter();

        let outcome = match self.run_stage(event) {
            Ok(outcome) => {
                if outcome != StageOutcome::Pending {
                    event.clear_error();
                }
                outcome
            }
            Err(StageFailure::Collaborator(e)) => self.on_collaborator_error(event, e)?,
            Err(StageFailure::Fanout(e)) => {
                warn!(error = %e, "unable to build workflow dispatches");
                event.record_error(format!("unable to build workflow dispatches: {}", e));
                StageOutcome::Failed
            }
            Err(StageFailure::Engine(e)) => return Err(e),
        };

        let to = event.apply(outcome)?;
        if to != from {
            info!(%outcome, to = %to, "stage changed");
            self.notices
                .dispatch(&LifecycleNotice::stage_changed(event.uuid(), from, to));
        } else {
            debug!(%outcome, "stage unchanged");
        }
        Ok(to)
    }

    /// Stop a record at its current stage. Started runs are not retracted.
    pub fn cancel(&self, event: &mut RepositoryEvent, reason: &str) -> Result<(), HookError> {
        let from = event.stage();
        event.cancel(reason)?;
        info!(event = %event.full_name(), %from, %reason, "event cancelled");
        self.notices.dispatch(&LifecycleNotice::stage_changed(
            event.uuid(),
            from,
            event.stage(),
        ));
        Ok(())
    }

    /// Apply a result pushed by a collaborator.
    pub fn receive_callback(
        &self,
        event: &mut RepositoryEvent,
        callback: &HookEventCallback,
    ) -> Result<(), HookError> {
        callback.apply_to(event)?;
        let kind = callback.payload.kind();
        info!(event = %event.full_name(), kind, "callback applied");
        self.notices
            .dispatch(&LifecycleNotice::callback_applied(event.uuid(), kind));
        Ok(())
    }

    fn run_stage(&self, event: &mut RepositoryEvent) -> StageResult {
        match event.stage() {
            EventStage::Scheduled => self.extract(event),
            EventStage::Analyzing => self.request_analyses(event),
            EventStage::CheckAnalyzing => self.check_analyses(event),
            EventStage::WorkflowHooks => self.select_hooks(event),
            EventStage::SignKey => self.resolve_signing_key(event),
            EventStage::GitInfo => self.resolve_git_info(event),
            EventStage::Workflow => self.start_workflows(event),
            EventStage::Done | EventStage::Error | EventStage::Skipped => {
                Err(StageFailure::Engine(HookError::Terminated {
                    uuid: event.uuid(),
                    stage: event.stage().to_string(),
                }))
            }
        }
    }

    fn on_collaborator_error(
        &self,
        event: &mut RepositoryEvent,
        error: CollaboratorError,
    ) -> Result<StageOutcome, HookError> {
        event.record_error(error.message());
        if !error.is_transient() {
            warn!(error = %error, "collaborator rejected the event");
            return Ok(StageOutcome::Failed);
        }
        if event.nb_errors() < self.config.max_retries {
            debug!(error = %error, nb_errors = event.nb_errors(), "transient failure, will retry");
            return Ok(StageOutcome::Pending);
        }

        warn!(
            error = %error,
            nb_errors = event.nb_errors(),
            "retry budget exhausted"
        );
        match event.stage() {
            EventStage::GitInfo | EventStage::Workflow => {
                let reason = format!(
                    "abandoned after {} errors: {}",
                    event.nb_errors(),
                    error.message()
                );
                self.abandon_dispatches(event, &reason)?;
                Ok(if event.stage() == EventStage::GitInfo {
                    StageOutcome::GitInfoResolved
                } else {
                    StageOutcome::DispatchesSettled
                })
            }
            _ => Ok(StageOutcome::Failed),
        }
    }

    // Scheduled: make sure the typed payload exists.
    fn extract(&self, event: &mut RepositoryEvent) -> StageResult {
        if event.extracted_data().is_none() {
            let data = self.collaborators.extractor.extract(
                event.classification(),
                event.vcs_server_name(),
                event.repository_name(),
                event.body(),
            )?;
            // A payload of the wrong kind cannot be processed any further.
            event
                .set_extracted_data(data)
                .map_err(|e| CollaboratorError::fatal(e.to_string()))?;
        }
        Ok(StageOutcome::Accepted)
    }

    // Analyzing: ask every project using the repository to analyze it.
    fn request_analyses(&self, event: &mut RepositoryEvent) -> StageResult {
        if !event.event_name().requires_analysis() {
            return Ok(StageOutcome::NoAnalysisRequired);
        }

        let restrict = event.hook_project_key().map(str::to_string);
        let projects: Vec<String> = self
            .collaborators
            .analysis
            .projects_for_repository(event.vcs_server_name(), event.repository_name())?
            .into_iter()
            .filter(|p| restrict.as_deref().map_or(true, |k| k == p))
            .collect();
        if projects.is_empty() {
            return Ok(StageOutcome::NoAnalysisRequired);
        }

        let (git_ref, commit) = event_coordinates(event);
        for project_key in projects {
            // Already requested before a transient failure.
            if event.analyses.iter().any(|a| a.project_key == project_key) {
                continue;
            }
            let request = AnalysisRequest {
                project_key: project_key.clone(),
                vcs_name: event.vcs_server_name().to_string(),
                repo_name: event.repository_name().to_string(),
                git_ref: git_ref.clone(),
                commit: commit.clone(),
                hook_event_uuid: event.uuid(),
                initiator: event.initiator().cloned(),
            };
            let analysis_id = self.collaborators.analysis.request_analysis(&request)?;
            debug!(project = %project_key, %analysis_id, "analysis requested");
            event
                .analyses
                .push(AnalysisOutcome::requested(project_key, analysis_id));
            event.touch();
        }
        Ok(StageOutcome::AnalysesRequested)
    }

    // CheckAnalyzing: poll every unresolved analysis once.
    fn check_analyses(&self, event: &mut RepositoryEvent) -> StageResult {
        let max_checks = self.config.max_analysis_checks;
        for i in 0..event.analyses.len() {
            if event.analyses[i].status.is_resolved() {
                continue;
            }
            let (project_key, analysis_id) = {
                let a = &event.analyses[i];
                (a.project_key.clone(), a.analyze_id.clone())
            };
            let poll = self
                .collaborators
                .analysis
                .analysis_status(&project_key, &analysis_id)?;
            match poll {
                AnalysisPoll::Resolved(result) if result.status.is_resolved() => {
                    let a = &mut event.analyses[i];
                    a.status = result.status;
                    a.error = result.error;
                    event.model_updated.extend(result.models);
                    event.workflow_updated.extend(result.workflows);
                }
                _ => {
                    let a = &mut event.analyses[i];
                    a.find_retry_count += 1;
                    if a.find_retry_count >= max_checks {
                        warn!(project = %project_key, %analysis_id, "analysis check budget exhausted");
                        a.status = AnalysisStatus::Error;
                        a.error = format!(
                            "analysis {} not resolved after {} checks",
                            analysis_id, a.find_retry_count
                        );
                    }
                }
            }
        }

        if event.analyses.iter().all(|a| a.status.is_resolved()) {
            Ok(StageOutcome::AnalysesResolved)
        } else {
            Ok(StageOutcome::Pending)
        }
    }

    // WorkflowHooks: build one dispatch per selected workflow.
    fn select_hooks(&self, event: &mut RepositoryEvent) -> StageResult {
        let selection = self.collaborators.hooks.select(event)?;
        event.skipped_workflows.extend(selection.skipped_workflows);
        event.skipped_hooks.extend(selection.skipped_hooks);

        let restrict = event.hook_project_key().map(str::to_string);
        let targets: Vec<_> = selection
            .targets
            .into_iter()
            .filter(|t| restrict.as_deref().map_or(true, |k| k == t.project_key))
            .collect();
        if targets.is_empty() {
            return Ok(StageOutcome::NothingToTrigger {
                analyzed: event.analyzed(),
            });
        }

        let dispatches = targets
            .into_iter()
            .map(WorkflowDispatch::new)
            .collect::<Result<Vec<_>, _>>()
            .map_err(StageFailure::Fanout)?;
        for d in dispatches.iter().filter(|d| d.is_terminated()) {
            info!(workflow = %d.workflow_name(), reason = %d.error(), "workflow skipped");
            self.notices.dispatch(&LifecycleNotice::dispatch_settled(
                event.uuid(),
                d.workflow_name(),
                d.status(),
                d.error(),
            ));
        }
        let signing_key_required = dispatches
            .iter()
            .any(|d| !d.is_terminated() && d.target().require_signing_key);
        info!(count = dispatches.len(), signing_key_required, "workflows selected");
        event.workflow_dispatches = dispatches;
        Ok(StageOutcome::HooksSelected {
            signing_key_required,
        })
    }

    // SignKey: request the signing key, then poll it and resolve the initiator.
    fn resolve_signing_key(&self, event: &mut RepositoryEvent) -> StageResult {
        let project_key = match event
            .workflow_dispatches
            .iter()
            .find(|d| !d.is_terminated() && d.target().require_signing_key)
        {
            Some(d) => d.target().project_key.clone(),
            None => return Ok(StageOutcome::SigningKeyResolved),
        };

        let operation = match event.signing_key_operation.clone() {
            Some(op) => op,
            None => {
                let (git_ref, commit) = event_coordinates(event);
                let request = SigningKeyRequest {
                    project_key,
                    vcs_name: event.vcs_server_name().to_string(),
                    repo_name: event.repository_name().to_string(),
                    commit,
                    git_ref,
                    hook_event_uuid: event.uuid(),
                };
                let id = self
                    .collaborators
                    .signing_keys
                    .request_signing_key(&request)?;
                debug!(operation = %id, "signing key requested");
                event.signing_key_operation = Some(SigningKeyOperation {
                    id,
                    status: OperationStatus::Pending,
                    error: None,
                });
                return Ok(StageOutcome::Pending);
            }
        };

        match operation.status {
            OperationStatus::Pending => {
                match self
                    .collaborators
                    .signing_keys
                    .signing_key_status(&operation.id)?
                {
                    OperationPoll::Pending => return Ok(StageOutcome::Pending),
                    OperationPoll::Done(key) => {
                        event.sign_key = Some(key);
                        set_signing_status(event, OperationStatus::Done, None);
                    }
                    OperationPoll::Failed(message) => {
                        set_signing_status(event, OperationStatus::Error, Some(message.clone()));
                        return Err(CollaboratorError::fatal(format!(
                            "unable to get signing key: {}",
                            message
                        ))
                        .into());
                    }
                }
            }
            OperationStatus::Done => {}
            OperationStatus::Error => {
                return Err(CollaboratorError::fatal(format!(
                    "unable to get signing key: {}",
                    operation.error.unwrap_or_default()
                ))
                .into());
            }
        }

        let sign_key = match event.sign_key.clone() {
            Some(key) => key,
            None => {
                return Err(CollaboratorError::fatal("signing key operation returned no key").into())
            }
        };
        if event.initiator.is_none() {
            let (_, commit) = event_coordinates(event);
            let request = InitiatorRequest {
                project_key,
                vcs_name: event.vcs_server_name().to_string(),
                repo_name: event.repository_name().to_string(),
                commit,
                sign_key,
                hook_event_uuid: event.uuid(),
            };
            let initiator = self.collaborators.initiators.resolve_initiator(&request)?;
            event.initiator = Some(initiator);
        }
        Ok(StageOutcome::SigningKeyResolved)
    }

    // GitInfo: each live dispatch requests or polls its git info.
    fn resolve_git_info(&self, event: &mut RepositoryEvent) -> StageResult {
        let ctx = fanout_context(event, &self.config);
        let resolver = self.collaborators.git_info.as_ref();
        let reports = run_workers(
            &event.workflow_dispatches,
            |d| matches!(d.status(), DispatchStatus::Scheduled | DispatchStatus::AwaitingGitInfo),
            |index, dispatch| git_info_step(&ctx, resolver, index, dispatch),
        );
        if let Some(message) = self.merge_reports(event, reports) {
            return Err(CollaboratorError::transient(message).into());
        }

        let resolved = event
            .workflow_dispatches
            .iter()
            .all(|d| d.is_terminated() || d.status() == DispatchStatus::Ready);
        Ok(if resolved {
            StageOutcome::GitInfoResolved
        } else {
            StageOutcome::Pending
        })
    }

    // Workflow: start every Ready dispatch.
    fn start_workflows(&self, event: &mut RepositoryEvent) -> StageResult {
        let ctx = fanout_context(event, &self.config);
        let starter = self.collaborators.workflows.as_ref();
        let reports = run_workers(
            &event.workflow_dispatches,
            |d| d.status() == DispatchStatus::Ready,
            |index, dispatch| start_step(&ctx, starter, index, dispatch),
        );
        if let Some(message) = self.merge_reports(event, reports) {
            return Err(CollaboratorError::transient(message).into());
        }

        if event.workflow_dispatches.iter().all(|d| d.is_terminated()) {
            Ok(StageOutcome::DispatchesSettled)
        } else {
            Ok(StageOutcome::Pending)
        }
    }

    /// Write worker reports back into the record. Returns the first
    /// transient error, if any.
    fn merge_reports(
        &self,
        event: &mut RepositoryEvent,
        reports: Vec<DispatchReport>,
    ) -> Option<String> {
        let uuid = event.uuid();
        let mut transient = None;
        for report in reports {
            let Some(slot) = event.workflow_dispatches.get_mut(report.index) else {
                continue;
            };
            let was_terminal = slot.is_terminated();
            *slot = report.dispatch;
            if !was_terminal && slot.is_terminated() {
                info!(
                    workflow = %slot.workflow_name(),
                    status = %slot.status(),
                    error = %slot.error(),
                    "dispatch settled"
                );
                let notice = LifecycleNotice::dispatch_settled(
                    uuid,
                    slot.workflow_name(),
                    slot.status(),
                    slot.error(),
                );
                self.notices.dispatch(&notice);
            }
            if transient.is_none() {
                transient = report.transient_error;
            }
        }
        event.touch();
        transient
    }

    fn abandon_dispatches(
        &self,
        event: &mut RepositoryEvent,
        reason: &str,
    ) -> Result<(), HookError> {
        let uuid = event.uuid();
        for d in event
            .workflow_dispatches
            .iter_mut()
            .filter(|d| !d.is_terminated())
        {
            d.fail(reason)?;
            self.notices.dispatch(&LifecycleNotice::dispatch_settled(
                uuid,
                d.workflow_name(),
                d.status(),
                d.error(),
            ));
        }
        Ok(())
    }
}

fn set_signing_status(event: &mut RepositoryEvent, status: OperationStatus, error: Option<String>) {
    if let Some(op) = event.signing_key_operation.as_mut() {
        op.status = status;
        op.error = error;
    }
}

/// Ref and commit the event is about, taken from its payload.
fn event_coordinates(event: &RepositoryEvent) -> (String, String) {
    let data = event.extracted_data();
    (
        data.and_then(|d| d.git_ref()).unwrap_or_default(),
        data.and_then(|d| d.commit()).unwrap_or_default(),
    )
}

fn fanout_context(event: &RepositoryEvent, config: &EngineConfig) -> FanoutContext {
    FanoutContext {
        hook_event_uuid: event.uuid(),
        event_name: event.event_name(),
        commit_from: event.extracted_data().and_then(|d| d.commit_from()),
        sign_key: event.sign_key().map(str::to_string),
        initiator: event.initiator().cloned(),
        now: chrono::Utc::now(),
        check_interval: config.git_info_check_interval(),
    }
}
