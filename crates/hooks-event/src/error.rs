// error.rs — Error types for the repository event lifecycle.
//
// `HookError` covers misuse of the lifecycle (bad classification, illegal
// transitions, writes to immutable parts of a record) and I/O around it.
// `CollaboratorError` is what an external collaborator returns; the engine
// records it on the event instead of propagating it.

use thiserror::Error;
use uuid::Uuid;

/// Errors that can occur during repository event lifecycle operations.
#[derive(Debug, Error)]
pub enum HookError {
    /// The event name is not one of the known names.
    #[error("unknown event name {0:?}")]
    UnknownEventName(String),

    /// The (name, type) pair is not a valid classification. Rejected before
    /// any record is created.
    #[error("event type {event_type:?} is not valid for event {event_name:?}")]
    Classification {
        event_name: String,
        event_type: String,
    },

    /// Invalid stage transition.
    #[error("invalid transition from {from} on {outcome} for event {uuid}")]
    InvalidTransition {
        uuid: Uuid,
        from: String,
        outcome: String,
    },

    /// `advance` was called on a record already in Done, Error or Skipped.
    #[error("event {uuid} is terminated ({stage})")]
    Terminated { uuid: Uuid, stage: String },

    /// A workflow dispatch cannot leave a terminal substate or skip a step.
    #[error("dispatch of workflow {workflow} cannot go from {from} to {to}")]
    InvalidDispatchTransition {
        workflow: String,
        from: String,
        to: String,
    },

    /// Extracted data is written once, for the record's own event kind.
    #[error("extracted data for event {uuid}: {reason}")]
    ExtractedData { uuid: Uuid, reason: String },

    /// A callback addressed a different event or an unknown sub-operation.
    #[error("callback rejected for event {uuid}: {reason}")]
    CallbackMismatch { uuid: Uuid, reason: String },

    /// An outgoing event has no such hook, or the trigger already settled.
    #[error("outgoing event {uuid}, hook {hook_id}: {reason}")]
    OutgoingTrigger {
        uuid: Uuid,
        hook_id: String,
        reason: String,
    },

    /// A dispatch target is missing an identity field.
    #[error("invalid dispatch target: {0}")]
    InvalidTarget(String),

    /// A path filter is not a valid glob pattern.
    #[error("invalid path filter {filter:?}: {source}")]
    PathFilter {
        filter: String,
        source: glob::PatternError,
    },

    /// Failed to serialize/deserialize a record.
    #[error("serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Engine configuration could not be loaded.
    #[error("configuration error in {path}: {reason}")]
    Config { path: String, reason: String },

    /// A file I/O operation failed.
    #[error("I/O error at {path}: {source}")]
    IoError {
        path: String,
        source: std::io::Error,
    },
}

/// Failure reported by an external collaborator (analysis requester,
/// signing-key resolver, git-info resolver, workflow starter, ...).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CollaboratorError {
    /// Temporary failure: the stage stays put and is polled again later.
    #[error("{0}")]
    Transient(String),

    /// Permanent rejection: the record goes to Error.
    #[error("{0}")]
    Fatal(String),
}

impl CollaboratorError {
    pub fn transient(message: impl Into<String>) -> Self {
        CollaboratorError::Transient(message.into())
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        CollaboratorError::Fatal(message.into())
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, CollaboratorError::Transient(_))
    }

    pub fn message(&self) -> &str {
        match self {
            CollaboratorError::Transient(m) | CollaboratorError::Fatal(m) => m,
        }
    }
}
