// legacy.rs — Decoding of records written by older versions.
//
// Older records differ from the current layout in a few ways:
//   - the actor is stored as top-level `user_id` / `username` strings
//   - `extracted_data` is one flat object without a `kind` tag, with the
//     kind-specific parts nested under `manual`, `scheduler`, `workflow_run`
//     and `workflow_hook`, and `hook_project_key` inside it
//   - the stage is stored under `status`
//   - timestamps are integer nanoseconds since the epoch
//   - empty lists and an absent body are written as `null`
//   - the signing-key operation is a plain id string (empty when none) with
//     its status in `signing_key_operation_status`, and `sign_key` is `""`
//     until a key is known
//   - skipped hooks are full hook definitions keyed by `id`
//
// Everything here rewrites the JSON into the current layout before the
// regular deserializer runs. Nothing in this module is used to write records.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use tracing::debug;

use crate::classification::EventName;
use crate::error::HookError;
use crate::event::RepositoryEvent;
use crate::model::Initiator;

/// Decode a stored record, old or new.
pub fn decode_record(bytes: &[u8]) -> Result<RepositoryEvent, HookError> {
    let mut value: Value = serde_json::from_slice(bytes)?;
    if let Value::Object(record) = &mut value {
        upgrade_record(record);
    }
    Ok(serde_json::from_value(value)?)
}

/// Build an Initiator from deprecated user fields. Empty strings count as
/// absent; `None` when both are absent.
pub fn initiator_from_deprecated(user_id: Option<&str>, username: Option<&str>) -> Option<Initiator> {
    let user_id = user_id.filter(|s| !s.is_empty());
    let username = username.filter(|s| !s.is_empty());
    if user_id.is_none() && username.is_none() {
        return None;
    }
    Some(Initiator {
        user_id: user_id.map(str::to_string),
        username: username.map(str::to_string),
        ..Default::default()
    })
}

/// Pick the initiator from a payload carrying both the structured field and
/// the deprecated ones. The structured field wins.
pub(crate) fn resolve_initiator(
    initiator: Option<Initiator>,
    user_id: Option<&str>,
    username: Option<&str>,
) -> Option<Initiator> {
    initiator.or_else(|| initiator_from_deprecated(user_id, username))
}

// Keys whose `null` means "empty" in older records.
const NULLABLE_KEYS: [&str; 7] = [
    "analyses",
    "model_updated",
    "workflow_updated",
    "skipped_workflows",
    "skipped_hooks",
    "body",
    "initiator",
];

fn upgrade_record(record: &mut Map<String, Value>) {
    for key in NULLABLE_KEYS {
        if record.get(key).is_some_and(Value::is_null) {
            record.remove(key);
        }
    }
    upgrade_signing_key(record);
    upgrade_skipped_hooks(record);

    let user_id = take_string(record, "user_id");
    let username = take_string(record, "username");
    let has_initiator = record.get("initiator").is_some_and(|v| !v.is_null());
    if !has_initiator {
        if let Some(initiator) = initiator_from_deprecated(user_id.as_deref(), username.as_deref()) {
            debug!("upgrading deprecated user fields to an initiator");
            if let Ok(v) = serde_json::to_value(initiator) {
                record.insert("initiator".to_string(), v);
            }
        }
    }

    if !record.contains_key("stage") {
        if let Some(status) = record.remove("status") {
            record.insert("stage".to_string(), status);
        }
    }

    if let Some(nanos) = record.remove("processing_timestamp") {
        record.entry("processing_started").or_insert(nanos);
    }
    for key in ["created", "processing_started", "last_update"] {
        if let Some(v) = record.get_mut(key) {
            if let Some(nanos) = v.as_i64() {
                *v = if nanos == 0 && key == "processing_started" {
                    Value::Null
                } else {
                    Value::String(DateTime::<Utc>::from_timestamp_nanos(nanos).to_rfc3339())
                };
            }
        }
    }

    let name = record
        .get("event_name")
        .and_then(|v| serde_json::from_value::<EventName>(v.clone()).ok());
    let flat = match record.get_mut("extracted_data") {
        Some(Value::Object(data)) if !data.contains_key("kind") => Some(std::mem::take(data)),
        _ => None,
    };
    if let (Some(mut flat), Some(name)) = (flat, name) {
        if let Some(Value::String(key)) = flat.remove("hook_project_key") {
            if !key.is_empty() && !record.contains_key("hook_project_key") {
                record.insert("hook_project_key".to_string(), Value::String(key));
            }
        }
        record.insert("extracted_data".to_string(), tag_flat_extracted(name, flat));
    }
}

fn upgrade_signing_key(record: &mut Map<String, Value>) {
    let no_key = match record.get("sign_key") {
        Some(Value::String(key)) => key.is_empty(),
        Some(Value::Null) => true,
        _ => false,
    };
    if no_key {
        record.remove("sign_key");
    }

    let status = record.remove("signing_key_operation_status");
    match record.remove("signing_key_operation") {
        Some(Value::String(id)) if !id.is_empty() => {
            let mut operation = Map::new();
            operation.insert("id".to_string(), Value::String(id));
            operation.insert(
                "status".to_string(),
                Value::String(legacy_operation_status(status.as_ref()).to_string()),
            );
            record.insert("signing_key_operation".to_string(), Value::Object(operation));
        }
        Some(Value::Object(operation)) => {
            record.insert("signing_key_operation".to_string(), Value::Object(operation));
        }
        _ => {}
    }
}

// Older writers stored the status as a number (pending, processing, done,
// error) or as its name.
fn legacy_operation_status(status: Option<&Value>) -> &'static str {
    match status {
        Some(Value::Number(n)) => match n.as_u64() {
            Some(2) => "Done",
            Some(3) => "Error",
            _ => "Pending",
        },
        Some(Value::String(s)) if s.eq_ignore_ascii_case("done") => "Done",
        Some(Value::String(s)) if s.eq_ignore_ascii_case("error") => "Error",
        _ => "Pending",
    }
}

fn upgrade_skipped_hooks(record: &mut Map<String, Value>) {
    let Some(Value::Array(hooks)) = record.get_mut("skipped_hooks") else {
        return;
    };
    for hook in hooks.iter_mut() {
        let Value::Object(old) = hook else {
            continue;
        };
        if old.contains_key("hook_id") {
            continue;
        }
        let mut skipped = Map::new();
        copy(
            old,
            &mut skipped,
            &[
                ("id", "hook_id"),
                ("project_key", "project_key"),
                ("workflow_name", "workflow_name"),
                ("reason", "reason"),
            ],
        );
        *hook = Value::Object(skipped);
    }
}

fn tag_flat_extracted(name: EventName, mut flat: Map<String, Value>) -> Value {
    let mut out = Map::new();
    let kind = match name {
        EventName::Push | EventName::WorkflowUpdate | EventName::ModelUpdate => {
            copy_git_fields(&mut flat, &mut out);
            "git"
        }
        EventName::PullRequest | EventName::PullRequestComment => {
            copy_git_fields(&mut flat, &mut out);
            out.insert(
                "pull_request_id".to_string(),
                flat.remove("pullrequest_id").unwrap_or(Value::from(0)),
            );
            out.insert(
                "pull_request_ref_to".to_string(),
                flat.remove("pullrequest_ref_to")
                    .unwrap_or(Value::String(String::new())),
            );
            "pull_request"
        }
        EventName::Manual => {
            let manual = nested(&mut flat, "manual");
            copy(&manual, &mut out, &[("project", "project"), ("workflow", "workflow")]);
            for key in ["target_commit", "target_branch", "target_tag"] {
                if let Some(Value::String(s)) = manual.get(key) {
                    if !s.is_empty() {
                        out.insert(key.to_string(), Value::String(s.clone()));
                    }
                }
            }
            "manual"
        }
        EventName::Scheduler => {
            let scheduler = nested(&mut flat, "scheduler");
            copy(
                &scheduler,
                &mut out,
                &[
                    ("target_project", "project"),
                    ("target_workflow", "workflow"),
                    ("target_vcs", "vcs"),
                    ("target_repo", "repository"),
                    ("cron", "cron"),
                    ("timezone", "timezone"),
                ],
            );
            "scheduler"
        }
        EventName::WorkflowRun => {
            let run = nested(&mut flat, "workflow_run");
            copy(
                &run,
                &mut out,
                &[
                    ("project", "project"),
                    ("workflow", "workflow"),
                    ("workflow_run_id", "workflow_run_id"),
                    ("target_vcs", "target_vcs"),
                    ("target_repository", "target_repository"),
                    ("outgoing_hook_event_uuid", "outgoing_hook_event_uuid"),
                ],
            );
            "workflow_run"
        }
        EventName::Webhook => {
            let hook = nested(&mut flat, "workflow_hook");
            copy(
                &hook,
                &mut out,
                &[
                    ("project", "project"),
                    ("vcs", "vcs"),
                    ("repository", "repository"),
                    ("workflow", "workflow"),
                    ("id", "hook_id"),
                ],
            );
            "webhook"
        }
    };
    out.insert("kind".to_string(), Value::String(kind.to_string()));
    Value::Object(out)
}

fn copy_git_fields(flat: &mut Map<String, Value>, out: &mut Map<String, Value>) {
    for key in ["commit", "commit_from", "commit_message", "paths", "ref"] {
        if let Some(v) = flat.remove(key) {
            if !v.is_null() {
                out.insert(key.to_string(), v);
            }
        }
    }
    out.entry("commit").or_insert(Value::String(String::new()));
    out.entry("ref").or_insert(Value::String(String::new()));
    for key in ["commit_author", "commit_author_email"] {
        if let Some(Value::String(s)) = flat.remove(key) {
            if !s.is_empty() {
                out.insert(key.to_string(), Value::String(s));
            }
        }
    }
}

fn nested(flat: &mut Map<String, Value>, key: &str) -> Map<String, Value> {
    match flat.remove(key) {
        Some(Value::Object(m)) => m,
        _ => Map::new(),
    }
}

fn copy(from: &Map<String, Value>, to: &mut Map<String, Value>, keys: &[(&str, &str)]) {
    for (src, dst) in keys {
        let v = from
            .get(*src)
            .cloned()
            .unwrap_or(Value::String(String::new()));
        to.insert(dst.to_string(), v);
    }
}

fn take_string(record: &mut Map<String, Value>, key: &str) -> Option<String> {
    match record.remove(key) {
        Some(Value::String(s)) => Some(s),
        _ => None,
    }
}
