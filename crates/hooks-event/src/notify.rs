// notify.rs — Lifecycle notices and the sinks that receive them.
//
// The engine emits a notice whenever a record changes stage, a dispatch
// settles, or a callback is applied. Sinks observe; they cannot influence
// the lifecycle, and a failing sink never stops the engine.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::dispatch::DispatchStatus;
use crate::error::HookError;
use crate::transitions::EventStage;

/// Notices emitted by the lifecycle engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "notice", rename_all = "snake_case")]
pub enum LifecycleNotice {
    /// A repository event changed stage.
    StageChanged {
        uuid: Uuid,
        from: EventStage,
        to: EventStage,
        timestamp: DateTime<Utc>,
    },

    /// A workflow dispatch reached Done, Error or Skipped.
    DispatchSettled {
        uuid: Uuid,
        workflow: String,
        status: DispatchStatus,
        error: String,
        timestamp: DateTime<Utc>,
    },

    /// A collaborator callback was applied to a record.
    CallbackApplied {
        uuid: Uuid,
        kind: String,
        timestamp: DateTime<Utc>,
    },
}

impl LifecycleNotice {
    pub fn notice_type(&self) -> &str {
        match self {
            LifecycleNotice::StageChanged { .. } => "stage_changed",
            LifecycleNotice::DispatchSettled { .. } => "dispatch_settled",
            LifecycleNotice::CallbackApplied { .. } => "callback_applied",
        }
    }

    pub fn stage_changed(uuid: Uuid, from: EventStage, to: EventStage) -> Self {
        LifecycleNotice::StageChanged {
            uuid,
            from,
            to,
            timestamp: Utc::now(),
        }
    }

    pub fn dispatch_settled(
        uuid: Uuid,
        workflow: &str,
        status: DispatchStatus,
        error: &str,
    ) -> Self {
        LifecycleNotice::DispatchSettled {
            uuid,
            workflow: workflow.to_string(),
            status,
            error: error.to_string(),
            timestamp: Utc::now(),
        }
    }

    pub fn callback_applied(uuid: Uuid, kind: &str) -> Self {
        LifecycleNotice::CallbackApplied {
            uuid,
            kind: kind.to_string(),
            timestamp: Utc::now(),
        }
    }
}

/// Receives lifecycle notices.
pub trait NotificationSink: Send + Sync {
    /// Errors are logged by the dispatcher, never propagated.
    fn send(&self, notice: &LifecycleNotice) -> Result<(), HookError>;
}

/// Appends notices as JSONL to a file.
pub struct LogSink {
    path: PathBuf,
}

impl LogSink {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl NotificationSink for LogSink {
    fn send(&self, notice: &LifecycleNotice) -> Result<(), HookError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|source| HookError::IoError {
                path: parent.display().to_string(),
                source,
            })?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|source| HookError::IoError {
                path: self.path.display().to_string(),
                source,
            })?;

        let json = serde_json::to_string(notice)?;
        writeln!(file, "{}", json).map_err(|source| HookError::IoError {
            path: self.path.display().to_string(),
            source,
        })?;

        Ok(())
    }
}

/// Fans notices out to every registered sink.
pub struct NoticeDispatcher {
    sinks: Vec<Box<dyn NotificationSink>>,
}

impl NoticeDispatcher {
    pub fn new() -> Self {
        Self { sinks: Vec::new() }
    }

    pub fn add_sink(&mut self, sink: Box<dyn NotificationSink>) {
        self.sinks.push(sink);
    }

    pub fn dispatch(&self, notice: &LifecycleNotice) {
        for sink in &self.sinks {
            if let Err(e) = sink.send(notice) {
                tracing::warn!("notification sink error: {}", e);
            }
        }
    }
}

impl Default for NoticeDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use tempfile::tempdir;

    #[test]
    fn notices_carry_a_snake_case_tag() {
        let notice =
            LifecycleNotice::stage_changed(Uuid::new_v4(), EventStage::Scheduled, EventStage::Analyzing);
        let json = serde_json::to_string(&notice).unwrap();
        assert!(json.contains("\"notice\":\"stage_changed\""));
        assert!(json.contains("\"to\":\"Analyzing\""));
        assert_eq!(notice.notice_type(), "stage_changed");
    }

    #[test]
    fn log_sink_appends_to_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("notices").join("lifecycle.jsonl");
        let sink = LogSink::new(&path);

        let uuid = Uuid::new_v4();
        sink.send(&LifecycleNotice::callback_applied(uuid, "analysis"))
            .unwrap();
        sink.send(&LifecycleNotice::dispatch_settled(
            uuid,
            "build",
            DispatchStatus::Done,
            "",
        ))
        .unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[1].contains("dispatch_settled"));
    }

    struct FailingSink;

    impl NotificationSink for FailingSink {
        fn send(&self, _notice: &LifecycleNotice) -> Result<(), HookError> {
            Err(HookError::IoError {
                path: "/dev/full".into(),
                source: std::io::Error::other("disk full"),
            })
        }
    }

    struct CollectingSink(Arc<Mutex<Vec<String>>>);

    impl NotificationSink for CollectingSink {
        fn send(&self, notice: &LifecycleNotice) -> Result<(), HookError> {
            self.0.lock().unwrap().push(notice.notice_type().to_string());
            Ok(())
        }
    }

    #[test]
    fn failing_sink_does_not_block_the_others() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut dispatcher = NoticeDispatcher::new();
        dispatcher.add_sink(Box::new(FailingSink));
        dispatcher.add_sink(Box::new(CollectingSink(seen.clone())));

        dispatcher.dispatch(&LifecycleNotice::callback_applied(Uuid::new_v4(), "signing_key"));
        assert_eq!(seen.lock().unwrap().as_slice(), ["callback_applied"]);
    }
}
