// report.rs — Bounded status report for external display surfaces.
//
// A commit-status card has its own size limits, so the item list is capped:
//   analyses:  0 → one TEXT count item, 1..=5 → one LINK each, 6+ → one LINK
//   workflows: one LINK each while dispatches + items so far < 7, otherwise
//              one aggregate LINK to the filtered run list
// The output is a pure function of the record and the base URL.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::dispatch::DispatchStatus;
use crate::event::RepositoryEvent;
use crate::transitions::EventStage;

pub const REPORT_TITLE: &str = "CDS";
pub const MAX_LISTED_ANALYSES: usize = 5;
pub const MAX_ITEMS_BEFORE_AGGREGATE: usize = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InsightKind {
    #[serde(rename = "LINK")]
    Link,
    #[serde(rename = "TEXT")]
    Text,
}

impl fmt::Display for InsightKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InsightKind::Link => write!(f, "LINK"),
            InsightKind::Text => write!(f, "TEXT"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InsightItem {
    pub title: String,
    pub kind: InsightKind,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub href: Option<String>,
}

impl InsightItem {
    fn link(title: String, text: String, href: String) -> Self {
        Self {
            title,
            kind: InsightKind::Link,
            text,
            href: Some(href),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InsightReport {
    pub title: String,
    pub detail: String,
    pub items: Vec<InsightItem>,
}

/// Summarize an event for display.
pub fn summarize(event: &RepositoryEvent, ui_url: &str) -> InsightReport {
    let mut detail = format!(
        "Event {:?} ({}): {}",
        event.event_name().as_str(),
        event.uuid(),
        event.stage()
    );
    if event.stage() != EventStage::Done {
        detail.push_str("\n\n");
        detail.push_str(event.last_error());
    } else {
        for analysis in event.analyses().iter().filter(|a| !a.error.is_empty()) {
            detail.push_str(&format!(
                "\n\nOn project {}: {}",
                analysis.project_key, analysis.error
            ));
        }
    }

    let repo_settings = |project_key: &str| {
        format!(
            "{}/project/{}/explore/vcs/{}/repository/{}/settings",
            ui_url,
            project_key,
            event.vcs_server_name(),
            path_escape(event.repository_name())
        )
    };

    let mut items = Vec::new();
    let analyses = event.analyses();
    let listed = match analyses.len() {
        0 => &analyses[..0],
        n if n <= MAX_LISTED_ANALYSES => analyses,
        _ => &analyses[..1],
    };
    if analyses.is_empty() {
        items.push(InsightItem {
            title: "Nb of Analysis triggered".to_string(),
            kind: InsightKind::Text,
            text: "0".to_string(),
            href: None,
        });
    }
    for analysis in listed {
        items.push(InsightItem::link(
            format!("Analysis on {}", analysis.project_key),
            analysis.status.to_string(),
            repo_settings(&analysis.project_key),
        ));
    }

    let dispatches = event.workflow_dispatches();
    if dispatches.len() + items.len() < MAX_ITEMS_BEFORE_AGGREGATE {
        for dispatch in dispatches {
            let target = dispatch.target();
            let href = match (dispatch.status(), dispatch.run()) {
                (DispatchStatus::Done, Some(run)) => {
                    format!("{}/project/{}/run/{}", ui_url, target.project_key, run.run_id)
                }
                _ => repo_settings(&target.project_key),
            };
            items.push(InsightItem::link(
                format!("{} #{}", target.workflow_name, dispatch.run_number()),
                dispatch.status().to_string(),
                href,
            ));
        }
    } else if let Some(first) = dispatches.first() {
        let target = first.target();
        let repo_filter = format!("{}/{}", event.vcs_server_name(), event.repository_name());
        items.push(InsightItem::link(
            "Nb of workflows triggered".to_string(),
            dispatches.len().to_string(),
            format!(
                "{}/project/{}/run?workflow_ref={}&repository={}",
                ui_url,
                target.project_key,
                path_escape(&target.git_ref),
                path_escape(&repo_filter)
            ),
        ));
    }

    InsightReport {
        title: REPORT_TITLE.to_string(),
        detail,
        items,
    }
}

// Characters a URL path segment may carry unescaped besides the unreserved
// set; `/` is escaped so a repository name stays one segment.
const SEGMENT_SAFE: &[char] = &['$', '&', '+', ':', '=', '@'];

/// Escape a string for use as one URL path segment.
pub fn path_escape(segment: &str) -> String {
    let mut out = String::with_capacity(segment.len());
    let mut rest = segment;
    while let Some(pos) = rest.find(SEGMENT_SAFE) {
        out.push_str(&urlencoding::encode(&rest[..pos]));
        let safe_len = rest[pos..].chars().next().map_or(1, char::len_utf8);
        out.push_str(&rest[pos..pos + safe_len]);
        rest = &rest[pos + safe_len..];
    }
    out.push_str(&urlencoding::encode(rest));
    out
}
