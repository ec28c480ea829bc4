// classification.rs — What kind of occurrence an inbound event is.
//
// An event is classified by an (EventName, EventType) pair. Only
// pull-request and pull-request-comment carry a subtype; every other name
// takes the empty type. The pair is validated once, before a record exists,
// and never changes afterwards.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::HookError;

/// The kind of occurrence that produced a repository event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventName {
    WorkflowUpdate,
    ModelUpdate,
    Push,
    Manual,
    Webhook,
    WorkflowRun,
    Scheduler,
    PullRequest,
    PullRequestComment,
}

impl EventName {
    pub const ALL: [EventName; 9] = [
        EventName::WorkflowUpdate,
        EventName::ModelUpdate,
        EventName::Push,
        EventName::Manual,
        EventName::Webhook,
        EventName::WorkflowRun,
        EventName::Scheduler,
        EventName::PullRequest,
        EventName::PullRequestComment,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventName::WorkflowUpdate => "workflow-update",
            EventName::ModelUpdate => "model-update",
            EventName::Push => "push",
            EventName::Manual => "manual",
            EventName::Webhook => "webhook",
            EventName::WorkflowRun => "workflow-run",
            EventName::Scheduler => "scheduler",
            EventName::PullRequest => "pull-request",
            EventName::PullRequestComment => "pull-request-comment",
        }
    }

    /// Only a push changes the repository's own workflow definitions, so it
    /// is the only event that asks projects to re-analyze the repository.
    pub fn requires_analysis(&self) -> bool {
        matches!(self, EventName::Push)
    }
}

impl fmt::Display for EventName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventName {
    type Err = HookError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventName::ALL
            .into_iter()
            .find(|n| n.as_str() == s)
            .ok_or_else(|| HookError::UnknownEventName(s.to_string()))
    }
}

/// Subtype of an event. `Empty` is the only type allowed for names without
/// subtypes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventType {
    #[default]
    #[serde(rename = "")]
    Empty,
    Opened,
    Reopened,
    Closed,
    Edited,
    Created,
    Deleted,
}

impl EventType {
    pub const ALL: [EventType; 7] = [
        EventType::Empty,
        EventType::Opened,
        EventType::Reopened,
        EventType::Closed,
        EventType::Edited,
        EventType::Created,
        EventType::Deleted,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Empty => "",
            EventType::Opened => "opened",
            EventType::Reopened => "reopened",
            EventType::Closed => "closed",
            EventType::Edited => "edited",
            EventType::Created => "created",
            EventType::Deleted => "deleted",
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == EventType::Empty
    }

    /// True when the type is empty, or the pair is one of the enumerated
    /// pull-request / pull-request-comment combinations.
    pub fn is_valid_for_event_name(&self, name: EventName) -> bool {
        match (name, self) {
            (_, EventType::Empty) => true,
            (
                EventName::PullRequest,
                EventType::Opened | EventType::Reopened | EventType::Closed | EventType::Edited,
            ) => true,
            (
                EventName::PullRequestComment,
                EventType::Created | EventType::Deleted | EventType::Edited,
            ) => true,
            _ => false,
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A validated (name, type) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawClassification")]
pub struct Classification {
    #[serde(rename = "event_name")]
    name: EventName,
    #[serde(rename = "event_type", default)]
    event_type: EventType,
}

impl Classification {
    pub fn new(name: EventName, event_type: EventType) -> Result<Self, HookError> {
        if !event_type.is_valid_for_event_name(name) {
            return Err(HookError::Classification {
                event_name: name.to_string(),
                event_type: event_type.to_string(),
            });
        }
        Ok(Self { name, event_type })
    }

    /// Classify from the raw strings a transport hands over.
    pub fn parse(name: &str, event_type: &str) -> Result<Self, HookError> {
        let parsed_name = EventName::from_str(name)?;
        let parsed_type = EventType::ALL
            .into_iter()
            .find(|t| t.as_str() == event_type)
            .ok_or_else(|| HookError::Classification {
                event_name: name.to_string(),
                event_type: event_type.to_string(),
            })?;
        Self::new(parsed_name, parsed_type)
    }

    pub fn name(&self) -> EventName {
        self.name
    }

    pub fn event_type(&self) -> EventType {
        self.event_type
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.event_type.is_empty() {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{}/{}", self.name, self.event_type)
        }
    }
}

// Stored records go through the same validation as fresh ones.
#[derive(Deserialize)]
struct RawClassification {
    event_name: EventName,
    #[serde(default)]
    event_type: EventType,
}

impl TryFrom<RawClassification> for Classification {
    type Error = HookError;

    fn try_from(raw: RawClassification) -> Result<Self, Self::Error> {
        Classification::new(raw.event_name, raw.event_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pull_request_opened_is_valid() {
        assert!(EventType::Opened.is_valid_for_event_name(EventName::PullRequest));
    }

    #[test]
    fn push_opened_is_invalid() {
        assert!(!EventType::Opened.is_valid_for_event_name(EventName::Push));
    }

    #[test]
    fn empty_type_is_valid_for_every_name() {
        for name in EventName::ALL {
            assert!(EventType::Empty.is_valid_for_event_name(name), "{}", name);
        }
    }

    #[test]
    fn validity_matches_the_enumerated_combinations() {
        let valid = [
            (EventName::PullRequest, EventType::Opened),
            (EventName::PullRequest, EventType::Reopened),
            (EventName::PullRequest, EventType::Closed),
            (EventName::PullRequest, EventType::Edited),
            (EventName::PullRequestComment, EventType::Created),
            (EventName::PullRequestComment, EventType::Deleted),
            (EventName::PullRequestComment, EventType::Edited),
        ];
        for name in EventName::ALL {
            for ty in EventType::ALL {
                let expected = ty.is_empty() || valid.contains(&(name, ty));
                assert_eq!(
                    ty.is_valid_for_event_name(name),
                    expected,
                    "({}, {:?})",
                    name,
                    ty
                );
            }
        }
    }

    #[test]
    fn parse_rejects_unknown_subtype() {
        let result = Classification::parse("pull-request", "merged");
        assert!(matches!(result, Err(HookError::Classification { .. })));
    }

    #[test]
    fn parse_rejects_unknown_name() {
        let result = Classification::parse("tag", "");
        assert!(matches!(result, Err(HookError::UnknownEventName(_))));
    }

    #[test]
    fn parse_accepts_comment_edited() {
        let c = Classification::parse("pull-request-comment", "edited").unwrap();
        assert_eq!(c.name(), EventName::PullRequestComment);
        assert_eq!(c.event_type(), EventType::Edited);
        assert_eq!(c.to_string(), "pull-request-comment/edited");
    }

    #[test]
    fn names_serialize_as_kebab_case() {
        let json = serde_json::to_string(&EventName::PullRequestComment).unwrap();
        assert_eq!(json, "\"pull-request-comment\"");
        let json = serde_json::to_string(&EventType::Empty).unwrap();
        assert_eq!(json, "\"\"");
    }

    #[test]
    fn deserializing_an_invalid_pair_fails() {
        let json = r#"{"event_name":"push","event_type":"opened"}"#;
        assert!(serde_json::from_str::<Classification>(json).is_err());
    }
}
