//! Stream record CRUD: upsert, load (joined with the newest check), soft
//! delete, live-now listing, and search.

use chrono::Utc;
use sqlx::Row;

use crate::domain::{Status, StreamRecord};

use super::Store;

/// Joins in the newest `stream_checks` row per stream, left so a stream
/// with no check history still comes back with `latest_status`/`viewer_count`
/// both `NULL`.
const LATEST_CHECK_JOIN: &str = r#"
    LEFT JOIN (
        SELECT stream_url, status, viewer_count,
               ROW_NUMBER() OVER (PARTITION BY stream_url ORDER BY checked_at DESC) AS rn
        FROM stream_checks
    ) latest ON latest.stream_url = s.url AND latest.rn = 1
"#;

const RECORD_COLUMNS: &str = r#"
    s.url, s.alias, p.name AS platform, s.handle, s.category,
    s.added_at, s.last_modified, s.is_active, s.user_notes,
    latest.status AS latest_status, latest.viewer_count
"#;

impl Store {
    /// Creates the platform row if needed and inserts or updates the stream
    /// row, all in one transaction.
    pub async fn upsert(&self, record: &StreamRecord) -> crate::Result<()> {
        let mut tx = self.pool().begin().await?;

        sqlx::query("INSERT OR IGNORE INTO platforms (name) VALUES (?)")
            .bind(&record.platform)
            .execute(&mut *tx)
            .await?;

        let platform_id: i64 = sqlx::query_scalar("SELECT id FROM platforms WHERE name = ?")
            .bind(&record.platform)
            .fetch_one(&mut *tx)
            .await?;

        sqlx::query(
            r#"
            INSERT INTO streams (url, alias, platform_id, handle, category, added_at, last_modified, user_notes, is_active)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, 1)
            ON CONFLICT(url) DO UPDATE SET
                alias = excluded.alias,
                platform_id = excluded.platform_id,
                handle = excluded.handle,
                category = excluded.category,
                last_modified = excluded.last_modified,
                user_notes = excluded.user_notes,
                is_active = 1
            "#,
        )
        .bind(&record.url)
        .bind(&record.alias)
        .bind(platform_id)
        .bind(&record.handle)
        .bind(&record.category)
        .bind(record.added_at)
        .bind(record.last_modified)
        .bind(&record.notes)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Loads every stream, joined with its newest check for status/viewer
    /// fields. Pass `include_inactive = false` to exclude soft-deleted rows.
    pub async fn load(&self, include_inactive: bool) -> crate::Result<Vec<StreamRecord>> {
        let where_clause = if include_inactive { "" } else { "WHERE s.is_active = 1" };
        let sql = format!(
            r#"
            SELECT {RECORD_COLUMNS}
            FROM streams s
            LEFT JOIN platforms p ON p.id = s.platform_id
            {LATEST_CHECK_JOIN}
            {where_clause}
            ORDER BY s.alias
            "#
        );
        let rows = sqlx::query(&sql).fetch_all(self.pool()).await?;
        rows.iter().map(row_to_record).collect()
    }

    pub async fn get(&self, url: &str) -> crate::Result<Option<StreamRecord>> {
        let sql = format!(
            r#"
            SELECT {RECORD_COLUMNS}
            FROM streams s
            LEFT JOIN platforms p ON p.id = s.platform_id
            {LATEST_CHECK_JOIN}
            WHERE s.url = ?
            "#
        );
        let row = sqlx::query(&sql).bind(url).fetch_optional(self.pool()).await?;

        row.as_ref().map(row_to_record).transpose()
    }

    /// `UPDATE is_active=false WHERE is_active=true`; returns whether a row
    /// actually changed (idempotent — a repeat call on an inactive row is a
    /// no-op that returns `false`).
    pub async fn soft_delete(&self, url: &str) -> crate::Result<bool> {
        let result = sqlx::query(
            "UPDATE streams SET is_active = 0, last_modified = ? WHERE url = ? AND is_active = 1",
        )
        .bind(Utc::now())
        .bind(url)
        .execute(self.pool())
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Streams whose newest check has `status = live`, ordered by viewer
    /// count descending then alias.
    pub async fn live_now(&self) -> crate::Result<Vec<StreamRecord>> {
        let sql = format!(
            r#"
            SELECT {RECORD_COLUMNS}
            FROM streams s
            LEFT JOIN platforms p ON p.id = s.platform_id
            {LATEST_CHECK_JOIN}
            WHERE s.is_active = 1 AND latest.status = 'live'
            ORDER BY latest.viewer_count DESC, s.alias
            "#
        );
        let rows = sqlx::query(&sql).fetch_all(self.pool()).await?;
        rows.iter().map(row_to_record).collect()
    }

    /// `LIKE`-based search over alias/platform/handle/category, ordering
    /// live records first.
    pub async fn search(&self, query: &str, limit: i64) -> crate::Result<Vec<StreamRecord>> {
        let pattern = format!("%{query}%");
        let sql = format!(
            r#"
            SELECT {RECORD_COLUMNS}
            FROM streams s
            LEFT JOIN platforms p ON p.id = s.platform_id
            {LATEST_CHECK_JOIN}
            WHERE s.is_active = 1
              AND (s.alias LIKE ? OR p.name LIKE ? OR s.handle LIKE ? OR s.category LIKE ?)
            ORDER BY CASE WHEN latest.status = 'live' THEN 0 ELSE 1 END, s.alias
            LIMIT ?
            "#
        );
        let rows = sqlx::query(&sql)
            .bind(&pattern)
            .bind(&pattern)
            .bind(&pattern)
            .bind(&pattern)
            .bind(limit)
            .fetch_all(self.pool())
            .await?;

        rows.iter().map(row_to_record).collect()
    }
}

fn row_to_record(row: &sqlx::sqlite::SqliteRow) -> crate::Result<StreamRecord> {
    let status = row
        .try_get::<Option<String>, _>("latest_status")?
        .map(|s| Status::parse(&s))
        .unwrap_or(Status::Unknown);

    Ok(StreamRecord {
        url: row.try_get("url")?,
        alias: row.try_get("alias")?,
        platform: row
            .try_get::<Option<String>, _>("platform")?
            .unwrap_or_else(|| "Unknown".to_string()),
        handle: row.try_get::<Option<String>, _>("handle")?.unwrap_or_default(),
        category: row.try_get("category")?,
        added_at: row.try_get("added_at")?,
        last_modified: row.try_get("last_modified")?,
        is_active: row.try_get("is_active")?,
        notes: row.try_get("user_notes")?,
        status,
        viewer_count: row.try_get("viewer_count")?,
    })
}
