//! Thin orchestrator over the store: add/remove/list/import/export, with
//! the record invariants (alias defaulting, blank-line/comment skipping)
//! enforced at this layer rather than in the store itself.

use std::path::Path;

use crate::domain::StreamRecord;
use crate::store::Store;

/// A single caller-supplied add request; `alias` defaults to the classified
/// handle when blank.
#[derive(Debug, Clone)]
pub struct AddRequest {
    pub url: String,
    pub alias: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AddReport {
    pub added: usize,
    pub failed: usize,
}

#[derive(Clone)]
pub struct StreamManager {
    store: Store,
}

impl StreamManager {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Classifies and upserts each request. A blank or whitespace-only alias
    /// falls back to the classified handle.
    pub async fn add_many(&self, requests: Vec<AddRequest>) -> crate::Result<AddReport> {
        let mut report = AddReport::default();
        for request in requests {
            let classification = url_classify::classify(&request.url);
            let alias = request
                .alias
                .filter(|a| !a.trim().is_empty())
                .unwrap_or_else(|| classification.handle.clone());

            let record = StreamRecord::new(&request.url, alias, &classification.platform, &classification.handle);
            match self.store.upsert(&record).await {
                Ok(()) => report.added += 1,
                Err(e) => {
                    tracing::warn!(url = %request.url, error = %e, "failed to add stream");
                    report.failed += 1;
                }
            }
        }
        Ok(report)
    }

    /// Removes the records at `indices` within the caller's current `List()`
    /// ordering. Out-of-range indices are silently skipped.
    pub async fn remove_by_indices(&self, indices: &[usize]) -> crate::Result<usize> {
        let all = self.store.load(false).await?;
        let mut removed = 0;
        for &index in indices {
            let Some(record) = all.get(index) else { continue };
            if self.store.soft_delete(&record.url).await? {
                removed += 1;
            }
        }
        Ok(removed)
    }

    pub async fn list(&self) -> crate::Result<Vec<StreamRecord>> {
        self.store.load(false).await
    }

    /// Imports one URL per non-blank, non-`#`-comment line.
    pub async fn import_from_text(&self, path: &Path) -> crate::Result<AddReport> {
        let contents = std::fs::read_to_string(path)?;
        let requests = contents
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(|url| AddRequest {
                url: url.to_string(),
                alias: None,
            })
            .collect();
        self.add_many(requests).await
    }

    /// Writes every active record to `path` as a JSON array.
    pub async fn export_to_json(&self, path: &Path) -> crate::Result<usize> {
        let records = self.store.load(false).await?;
        let count = records.len();
        let json = serde_json::to_vec_pretty(&records)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, json)?;
        Ok(count)
    }
}
