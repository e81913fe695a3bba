//! Two-phase bounded-parallelism batch pipeline: fan out liveness checks,
//! then fan out metadata fetches over whatever came back live.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::checker::{self, StreamChecker};
use crate::domain::{EnrichedStream, Status, StreamRecord};

const TASK_TIMEOUT_SLACK: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub max_workers_liveness: usize,
    pub max_workers_metadata: usize,
    pub liveness_timeout: Duration,
    pub metadata_timeout: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_workers_liveness: 4,
            max_workers_metadata: 2,
            liveness_timeout: Duration::from_secs(10),
            metadata_timeout: Duration::from_secs(15),
        }
    }
}

/// Runs the two-phase pipeline over `records`, returning an enriched record
/// for every URL found live in phase 1, in whatever order phase 2 finishes.
pub async fn check_all(
    checker: Arc<StreamChecker>,
    config: &PipelineConfig,
    records: Vec<StreamRecord>,
) -> Vec<EnrichedStream> {
    let live_records = phase_liveness(checker.clone(), config, records).await;
    if live_records.is_empty() {
        return Vec::new();
    }
    phase_metadata(checker, config, live_records).await
}

async fn phase_liveness(
    checker: Arc<StreamChecker>,
    config: &PipelineConfig,
    records: Vec<StreamRecord>,
) -> Vec<StreamRecord> {
    let width = config.max_workers_liveness.max(1).min(records.len().max(1));
    let semaphore = Arc::new(Semaphore::new(width));
    let task_bound = config.liveness_timeout + TASK_TIMEOUT_SLACK;

    let mut join_set: JoinSet<Option<StreamRecord>> = JoinSet::new();

    for record in records {
        let semaphore = semaphore.clone();
        let checker = checker.clone();
        join_set.spawn(async move {
            let _permit = semaphore.acquire_owned().await.ok()?;
            let url = record.url.clone();

            match tokio::time::timeout(task_bound, checker.check_liveness(&url)).await {
                Ok(result) => {
                    if result.is_live {
                        Some(record)
                    } else {
                        if let Some(err) = result.error {
                            debug!(url = %url, error = %err, "liveness check did not find a live stream");
                        }
                        None
                    }
                }
                Err(_) => {
                    warn!(url = %url, "liveness check task exceeded its wall-clock bound");
                    None
                }
            }
        });
    }

    let mut live = Vec::new();
    while let Some(joined) = join_set.join_next().await {
        match joined {
            Ok(Some(record)) => live.push(record),
            Ok(None) => {}
            Err(e) => warn!(error = %e, "liveness worker task panicked"),
        }
    }
    live
}

async fn phase_metadata(
    checker: Arc<StreamChecker>,
    config: &PipelineConfig,
    records: Vec<StreamRecord>,
) -> Vec<EnrichedStream> {
    let width = config.max_workers_metadata.max(1).min(records.len().max(1));
    let semaphore = Arc::new(Semaphore::new(width));
    let task_bound = config.metadata_timeout + TASK_TIMEOUT_SLACK;

    let mut join_set: JoinSet<EnrichedStream> = JoinSet::new();

    for record in records {
        let semaphore = semaphore.clone();
        let checker = checker.clone();
        join_set.spawn(async move {
            let permit = semaphore.acquire_owned().await.ok();
            let url = record.url.clone();
            let platform = record.platform.clone();
            let observed_at = Utc::now();

            let fetched = if permit.is_some() {
                tokio::time::timeout(task_bound, checker.fetch_metadata(&url))
                    .await
                    .ok()
            } else {
                None
            };

            match fetched {
                Some(result) if result.error.is_none() && result.json.is_some() => {
                    let json = result.json.unwrap();
                    let meta = json.get("metadata");

                    let title = meta
                        .and_then(|m| m.get("title"))
                        .and_then(serde_json::Value::as_str)
                        .map(str::to_string);
                    let viewer_count = meta.and_then(|m| {
                        ["viewers", "viewer_count", "online"]
                            .iter()
                            .find_map(|key| m.get(*key).and_then(serde_json::Value::as_i64))
                    });
                    let category = match meta {
                        Some(m) => checker::extract_category(m, &platform, title.as_deref().unwrap_or("")),
                        None => "N/A".to_string(),
                    };

                    EnrichedStream {
                        record,
                        status: Status::Live,
                        viewer_count,
                        title,
                        category_override: Some(category),
                        observed_at,
                    }
                }
                _ => {
                    // Metadata failed or the task timed out: degrade
                    // gracefully, the record is still live per phase 1.
                    EnrichedStream {
                        record,
                        status: Status::Live,
                        viewer_count: None,
                        title: None,
                        category_override: Some("N/A".to_string()),
                        observed_at,
                    }
                }
            }
        });
    }

    let mut enriched = Vec::new();
    while let Some(joined) = join_set.join_next().await {
        match joined {
            Ok(item) => enriched.push(item),
            Err(e) => warn!(error = %e, "metadata worker task panicked"),
        }
    }
    enriched
}
