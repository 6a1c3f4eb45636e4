//! Request priority tagging.

use axum::http::{HeaderMap, Uri};
use serde::Serialize;

/// Declared priority of a dispatched request.
///
/// Currently observational: the tag is carried through telemetry but never
/// consulted by selection. Changing that is a deliberate semantic change,
/// not a bug fix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Medium,
    High,
    Critical,
    Normal,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
            Priority::Critical => "critical",
            Priority::Normal => "normal",
        }
    }

    fn normalize(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "low" => Priority::Low,
            "medium" => Priority::Medium,
            "high" => Priority::High,
            "critical" => Priority::Critical,
            _ => Priority::Normal,
        }
    }
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Normal
    }
}

/// Derive the priority tag from request metadata: the `X-Task-Priority`
/// header first, then the `priority` query parameter, defaulting to normal.
pub fn extract_priority(headers: &HeaderMap, uri: &Uri) -> Priority {
    if let Some(header) = headers.get("x-task-priority") {
        if let Ok(value) = header.to_str() {
            if !value.is_empty() {
                return Priority::normalize(value);
            }
        }
    }

    if let Some(query) = uri.query() {
        for pair in query.split('&') {
            if let Some((name, value)) = pair.split_once('=') {
                if name == "priority" && !value.is_empty() {
                    return Priority::normalize(value);
                }
            }
        }
    }

    Priority::Normal
}
