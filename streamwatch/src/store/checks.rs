//! Append-only check history and the analytics rollups derived from it.

use chrono::{DateTime, Utc};
use sqlx::Row;

use crate::domain::{CheckEvent, Status};

use super::Store;

/// Aggregate analytics for a single URL over a trailing window.
#[derive(Debug, Clone, PartialEq)]
pub struct Analytics {
    pub url: String,
    pub check_count: i64,
    pub uptime_percent: f64,
    pub avg_viewers: Option<f64>,
    pub peak_viewers: Option<i64>,
    pub avg_response_time_ms: Option<f64>,
    /// Hour-of-day (0-23) -> number of checks observed live at that hour.
    pub hourly_histogram: Vec<(u32, i64)>,
}

/// Per-platform totals.
#[derive(Debug, Clone, PartialEq)]
pub struct PlatformStats {
    pub platform: String,
    pub stream_count: i64,
    pub live_count: i64,
}

impl Store {
    pub async fn record_check(&self, event: &CheckEvent) -> crate::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO stream_checks
                (stream_url, status, viewer_count, title, category, checked_at, response_time_ms, error_message)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&event.url)
        .bind(event.status.as_str())
        .bind(event.viewer_count)
        .bind(&event.title)
        .bind(&event.category)
        .bind(event.checked_at)
        .bind(event.response_time_ms)
        .bind(&event.error_message)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    /// History for a URL over the trailing `days`, newest first.
    pub async fn history(&self, url: &str, days: i64) -> crate::Result<Vec<CheckEvent>> {
        let since = Utc::now() - chrono::Duration::days(days);
        let rows = sqlx::query(
            r#"
            SELECT stream_url, status, viewer_count, title, category, checked_at, response_time_ms, error_message
            FROM stream_checks
            WHERE stream_url = ? AND checked_at >= ?
            ORDER BY checked_at DESC
            "#,
        )
        .bind(url)
        .bind(since)
        .fetch_all(self.pool())
        .await?;

        rows.iter().map(row_to_event).collect()
    }

    pub async fn analytics(&self, url: &str, days: i64) -> crate::Result<Analytics> {
        let since = Utc::now() - chrono::Duration::days(days);

        let totals = sqlx::query(
            r#"
            SELECT
                COUNT(*) AS total,
                SUM(CASE WHEN status = 'live' THEN 1 ELSE 0 END) AS live_count,
                AVG(CASE WHEN status = 'live' THEN viewer_count END) AS avg_viewers,
                MAX(CASE WHEN status = 'live' THEN viewer_count END) AS peak_viewers,
                AVG(response_time_ms) AS avg_response_time_ms
            FROM stream_checks
            WHERE stream_url = ? AND checked_at >= ?
            "#,
        )
        .bind(url)
        .bind(since)
        .fetch_one(self.pool())
        .await?;

        let total: i64 = totals.try_get("total")?;
        let live_count: i64 = totals.try_get::<Option<i64>, _>("live_count")?.unwrap_or(0);
        let uptime_percent = if total > 0 {
            live_count as f64 / total as f64 * 100.0
        } else {
            0.0
        };

        let hourly_rows = sqlx::query(
            r#"
            SELECT CAST(strftime('%H', checked_at) AS INTEGER) AS hour, COUNT(*) AS count
            FROM stream_checks
            WHERE stream_url = ? AND checked_at >= ? AND status = 'live'
            GROUP BY hour
            ORDER BY hour
            "#,
        )
        .bind(url)
        .bind(since)
        .fetch_all(self.pool())
        .await?;

        let hourly_histogram = hourly_rows
            .iter()
            .map(|row| Ok((row.try_get::<i64, _>("hour")? as u32, row.try_get::<i64, _>("count")?)))
            .collect::<crate::Result<Vec<_>>>()?;

        Ok(Analytics {
            url: url.to_string(),
            check_count: total,
            uptime_percent,
            avg_viewers: totals.try_get("avg_viewers")?,
            peak_viewers: totals.try_get("peak_viewers")?,
            avg_response_time_ms: totals.try_get("avg_response_time_ms")?,
            hourly_histogram,
        })
    }

    pub async fn platform_stats(&self) -> crate::Result<Vec<PlatformStats>> {
        let rows = sqlx::query(
            r#"
            SELECT p.name AS platform,
                   COUNT(s.url) AS stream_count,
                   SUM(CASE WHEN latest.status = 'live' THEN 1 ELSE 0 END) AS live_count
            FROM platforms p
            LEFT JOIN streams s ON s.platform_id = p.id AND s.is_active = 1
            LEFT JOIN (
                SELECT stream_url, status,
                       ROW_NUMBER() OVER (PARTITION BY stream_url ORDER BY checked_at DESC) AS rn
                FROM stream_checks
            ) latest ON latest.stream_url = s.url AND latest.rn = 1
            GROUP BY p.name
            ORDER BY p.name
            "#,
        )
        .fetch_all(self.pool())
        .await?;

        rows.iter()
            .map(|row| {
                Ok(PlatformStats {
                    platform: row.try_get("platform")?,
                    stream_count: row.try_get("stream_count")?,
                    live_count: row.try_get::<Option<i64>, _>("live_count")?.unwrap_or(0),
                })
            })
            .collect()
    }
}

fn row_to_event(row: &sqlx::sqlite::SqliteRow) -> crate::Result<CheckEvent> {
    Ok(CheckEvent {
        url: row.try_get("stream_url")?,
        status: Status::parse(&row.try_get::<String, _>("status")?),
        viewer_count: row.try_get("viewer_count")?,
        title: row.try_get("title")?,
        category: row.try_get("category")?,
        checked_at: row.try_get::<DateTime<Utc>, _>("checked_at")?,
        response_time_ms: row.try_get("response_time_ms")?,
        error_message: row.try_get("error_message")?,
    })
}
