//! Core data model: persistent records, append-only check history, and the
//! transient enriched view produced by the batch pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Liveness/check status, matching the `stream_checks.status` check
/// constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Live,
    Offline,
    Error,
    Unknown,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Live => "live",
            Status::Offline => "offline",
            Status::Error => "error",
            Status::Unknown => "unknown",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "live" => Status::Live,
            "offline" => Status::Offline,
            "error" => Status::Error,
            _ => Status::Unknown,
        }
    }
}

/// A curated stream URL the user is tracking. `url` is the immutable
/// primary key; `is_active` is the soft-delete flag. `status`/`viewer_count`
/// are not stored on this row — the store joins them in from the newest
/// `stream_checks` entry on every load, defaulting to `Unknown`/`None` for a
/// stream that has never been checked.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamRecord {
    pub url: String,
    pub alias: String,
    pub platform: String,
    pub handle: String,
    pub category: Option<String>,
    pub added_at: DateTime<Utc>,
    pub last_modified: DateTime<Utc>,
    pub is_active: bool,
    pub notes: Option<String>,
    pub status: Status,
    pub viewer_count: Option<i64>,
}

impl StreamRecord {
    pub fn new(url: impl Into<String>, alias: impl Into<String>, platform: impl Into<String>, handle: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            url: url.into(),
            alias: alias.into(),
            platform: platform.into(),
            handle: handle.into(),
            category: None,
            added_at: now,
            last_modified: now,
            is_active: true,
            notes: None,
            status: Status::Unknown,
            viewer_count: None,
        }
    }
}

/// A single observed status check, appended to history and never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckEvent {
    pub url: String,
    pub status: Status,
    pub viewer_count: Option<i64>,
    pub title: Option<String>,
    pub category: Option<String>,
    pub checked_at: DateTime<Utc>,
    pub response_time_ms: Option<i64>,
    pub error_message: Option<String>,
}

/// Transient record produced by the batch pipeline: a `StreamRecord` joined
/// with the freshest observed fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedStream {
    pub record: StreamRecord,
    pub status: Status,
    pub viewer_count: Option<i64>,
    pub title: Option<String>,
    pub category_override: Option<String>,
    pub observed_at: DateTime<Utc>,
}
