//! # hooks-event
//!
//! Lifecycle of repository webhook events.
//!
//! A [`RepositoryEvent`] records one inbound occurrence (push, pull-request
//! change, manual trigger, scheduled tick, webhook call, workflow-run signal)
//! from receipt to a terminal stage. The [`LifecycleEngine`] advances it
//! through analysis, hook selection, signing-key resolution and git-info
//! retrieval, then fans out into one [`WorkflowDispatch`] per selected
//! workflow. [`summarize`] turns the record into a bounded status report.
//!
//! ## Key components
//!
//! - [`Classification`] — validated `(EventName, EventType)` pair
//! - [`ExtractedData`] — typed payload, one variant per event kind
//! - [`next_stage`] — the stage transition table (Scheduled → Analyzing →
//!   CheckAnalyzing → WorkflowHooks → SignKey → GitInfo → Workflow → Done)
//! - [`WorkflowDispatch`] — per-workflow substate, forward-only
//! - [`LifecycleEngine`] — drives records through the collaborator ports
//! - [`LifecycleNotice`] / [`NotificationSink`] — lifecycle observation
//! - [`decode_record`] — reads records written by older versions
//! - [`WorkflowRunOutgoingEvent`] — workflow-run signals and their triggers

pub mod callback;
pub mod classification;
pub mod collaborators;
pub mod config;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod event;
pub mod extracted;
pub mod fanout;
pub mod legacy;
pub mod model;
pub mod notify;
pub mod outgoing;
pub mod report;
pub mod transitions;

pub use callback::{AnalysisCallback, CallbackPayload, HookEventCallback, SigningKeyCallback};
pub use classification::{Classification, EventName, EventType};
pub use collaborators::{
    AnalysisPoll, AnalysisRequest, AnalysisRequester, AnalysisResult, Collaborators,
    GitInfoRequest, GitInfoResolver, HookSelection, HookSelector, InitiatorRequest,
    InitiatorResolver, OperationPoll, PayloadExtractor, SigningKeyRequest, SigningKeyResolver,
    WorkflowStartRequest, WorkflowStarter,
};
pub use config::EngineConfig;
pub use dispatch::{
    DispatchStatus, DispatchTarget, GitInfo, GitInfoOperation, RunCorrelation, WorkflowDispatch,
};
pub use engine::LifecycleEngine;
pub use error::{CollaboratorError, HookError};
pub use event::RepositoryEvent;
pub use extracted::{
    ExtractedData, GitChange, ManualTarget, PullRequestChange, SchedulerTarget, WebhookTarget,
    WorkflowRunSource,
};
pub use fanout::DispatchReport;
pub use legacy::{decode_record, initiator_from_deprecated};
pub use model::{
    AnalysisOutcome, AnalysisStatus, EntityFullName, Initiator, OperationStatus,
    SigningKeyOperation, SkippedHook,
};
pub use notify::{LifecycleNotice, LogSink, NoticeDispatcher, NotificationSink};
pub use outgoing::{
    OutgoingHook, OutgoingHookTrigger, OutgoingStatus, TriggerStatus, WorkflowRunOutgoingEvent,
    WorkflowRunSignal,
};
pub use report::{path_escape, summarize, InsightItem, InsightKind, InsightReport};
pub use transitions::{next_stage, EventStage, StageOutcome};
