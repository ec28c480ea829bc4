// fanout.rs — Concurrent advancement of the dispatches of one event.
//
// The coordinator owns the RepositoryEvent. Each live dispatch is cloned and
// handed to a scoped worker thread; workers call collaborators and return a
// DispatchReport. Only the coordinator writes the reports back, so the parent
// record has a single writer.

use std::thread;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::collaborators::{
    GitInfoRequest, GitInfoResolver, OperationPoll, WorkflowStartRequest, WorkflowStarter,
};
use crate::classification::EventName;
use crate::dispatch::{DispatchStatus, WorkflowDispatch};
use crate::error::HookError;
use crate::model::Initiator;

/// What a worker did with one dispatch.
#[derive(Debug, Clone)]
pub struct DispatchReport {
    /// Position of the dispatch in the parent record.
    pub index: usize,
    pub dispatch: WorkflowDispatch,
    /// A transient collaborator failure; the dispatch is left as it was.
    pub transient_error: Option<String>,
}

/// Event-level data the workers need, copied out of the parent record.
#[derive(Debug, Clone)]
pub(crate) struct FanoutContext {
    pub hook_event_uuid: Uuid,
    pub event_name: EventName,
    pub commit_from: Option<String>,
    pub sign_key: Option<String>,
    pub initiator: Option<Initiator>,
    pub now: DateTime<Utc>,
    pub check_interval: chrono::Duration,
}

/// Run `work` on every dispatch selected by `wanted`, one scoped thread
/// each, and collect the reports in record order.
///
/// A worker that errors or panics fails its own dispatch only; the reports
/// of the other workers are always returned.
pub(crate) fn run_workers<F>(
    dispatches: &[WorkflowDispatch],
    wanted: impl Fn(&WorkflowDispatch) -> bool,
    work: F,
) -> Vec<DispatchReport>
where
    F: Fn(usize, WorkflowDispatch) -> Result<DispatchReport, HookError> + Sync,
{
    let work = &work;
    thread::scope(|scope| {
        let handles: Vec<_> = dispatches
            .iter()
            .enumerate()
            .filter(|(_, d)| wanted(d))
            .map(|(index, d)| {
                let dispatch = d.clone();
                (index, d, scope.spawn(move || work(index, dispatch)))
            })
            .collect();

        handles
            .into_iter()
            .map(|(index, original, handle)| {
                let reason = match handle.join() {
                    Ok(Ok(report)) => return report,
                    Ok(Err(e)) => e.to_string(),
                    Err(_) => WORKER_PANICKED.to_string(),
                };
                warn!(workflow = %original.workflow_name(), %reason, "dispatch worker failed");
                failed_report(index, original, reason)
            })
            .collect()
    })
}

pub(crate) const WORKER_PANICKED: &str = "dispatch worker panicked";

fn failed_report(index: usize, original: &WorkflowDispatch, reason: String) -> DispatchReport {
    let mut dispatch = original.clone();
    if let Err(e) = dispatch.fail(reason) {
        warn!(error = %e, "unable to fail dispatch");
    }
    DispatchReport {
        index,
        dispatch,
        transient_error: None,
    }
}

/// GitInfo stage: request the operation, or poll it when due.
pub(crate) fn git_info_step(
    ctx: &FanoutContext,
    resolver: &dyn GitInfoResolver,
    index: usize,
    mut dispatch: WorkflowDispatch,
) -> Result<DispatchReport, HookError> {
    let mut transient_error = None;
    match dispatch.status() {
        DispatchStatus::Scheduled => {
            let target = dispatch.target();
            let request = GitInfoRequest {
                project_key: target.project_key.clone(),
                vcs_name: target.vcs_identifier.clone(),
                repo_name: target.repository_identifier.clone(),
                git_ref: target.git_ref.clone(),
                commit: target.target_commit.clone().unwrap_or_else(|| target.commit.clone()),
                changesets_since: ctx.commit_from.clone(),
                get_changesets: !target.path_filters.is_empty(),
                get_semver: true,
                hook_event_uuid: ctx.hook_event_uuid,
            };
            match resolver.request_git_info(&request) {
                Ok(operation) => {
                    debug!(workflow = %dispatch.workflow_name(), %operation, "git info requested");
                    dispatch.begin_git_info(operation, ctx.now)?;
                }
                Err(e) if e.is_transient() => transient_error = Some(e.to_string()),
                Err(e) => dispatch.fail(format!("unable to get git info: {}", e))?,
            }
        }
        DispatchStatus::AwaitingGitInfo if dispatch.git_info_check_due(ctx.now, ctx.check_interval) => {
            let operation = match dispatch.operation() {
                Some(op) => op.uuid.clone(),
                None => {
                    dispatch.fail("git info operation is missing")?;
                    return Ok(DispatchReport {
                        index,
                        dispatch,
                        transient_error,
                    });
                }
            };
            match resolver.git_info_status(&operation) {
                Ok(OperationPoll::Pending) => dispatch.note_git_info_check(ctx.now),
                Ok(OperationPoll::Done(info)) => dispatch.resolve_git_info(info)?,
                Ok(OperationPoll::Failed(message)) => dispatch.fail_git_info(message)?,
                Err(e) if e.is_transient() => {
                    dispatch.note_git_info_check(ctx.now);
                    transient_error = Some(e.to_string());
                }
                Err(e) => dispatch.fail_git_info(e.to_string())?,
            }
        }
        _ => {}
    }
    Ok(DispatchReport {
        index,
        dispatch,
        transient_error,
    })
}

/// Workflow stage: start a Ready dispatch.
pub(crate) fn start_step(
    ctx: &FanoutContext,
    starter: &dyn WorkflowStarter,
    index: usize,
    mut dispatch: WorkflowDispatch,
) -> Result<DispatchReport, HookError> {
    let mut transient_error = None;
    if dispatch.status() == DispatchStatus::Ready {
        let request = WorkflowStartRequest {
            hook_event_uuid: ctx.hook_event_uuid,
            event_name: ctx.event_name,
            target: dispatch.target().clone(),
            git_info: dispatch.git_info().cloned().unwrap_or_default(),
            sign_key: ctx.sign_key.clone(),
            initiator: dispatch
                .target()
                .initiator
                .clone()
                .or_else(|| ctx.initiator.clone()),
        };
        match starter.start(&request) {
            Ok(run) => dispatch.mark_started(run)?,
            Err(e) if e.is_transient() => transient_error = Some(e.to_string()),
            Err(e) => {
                warn!(workflow = %dispatch.workflow_name(), error = %e, "workflow start failed");
                dispatch.fail(e.to_string())?;
            }
        }
    }
    Ok(DispatchReport {
        index,
        dispatch,
        transient_error,
    })
}
