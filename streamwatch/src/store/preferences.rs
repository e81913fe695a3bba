//! Per-stream viewing preferences, supplemented from the original store's
//! `stream_preferences` table (not named by the distilled data model, but
//! still written to by playback sessions via `record_watch`).

use chrono::{DateTime, Utc};
use sqlx::Row;

use super::Store;

#[derive(Debug, Clone, PartialEq)]
pub struct StreamPreferences {
    pub stream_url: String,
    pub preferred_quality: String,
    pub auto_open: bool,
    pub notification_enabled: bool,
    pub custom_player_args: Option<String>,
    pub last_watched: Option<DateTime<Utc>>,
    pub watch_count: i64,
}

impl Store {
    pub async fn get_preferences(&self, url: &str) -> crate::Result<Option<StreamPreferences>> {
        let row = sqlx::query(
            r#"
            SELECT stream_url, preferred_quality, auto_open, notification_enabled,
                   custom_player_args, last_watched, watch_count
            FROM stream_preferences WHERE stream_url = ?
            "#,
        )
        .bind(url)
        .fetch_optional(self.pool())
        .await?;

        row.as_ref()
            .map(|row| {
                Ok(StreamPreferences {
                    stream_url: row.try_get("stream_url")?,
                    preferred_quality: row.try_get("preferred_quality")?,
                    auto_open: row.try_get("auto_open")?,
                    notification_enabled: row.try_get("notification_enabled")?,
                    custom_player_args: row.try_get("custom_player_args")?,
                    last_watched: row.try_get("last_watched")?,
                    watch_count: row.try_get("watch_count")?,
                })
            })
            .transpose()
    }

    /// Bumps `watch_count` and `last_watched` for a stream, creating the
    /// preferences row with defaults if it doesn't exist yet.
    pub async fn record_watch(&self, url: &str) -> crate::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO stream_preferences (stream_url, last_watched, watch_count)
            VALUES (?, ?, 1)
            ON CONFLICT(stream_url) DO UPDATE SET
                last_watched = excluded.last_watched,
                watch_count = watch_count + 1
            "#,
        )
        .bind(url)
        .bind(Utc::now())
        .execute(self.pool())
        .await?;
        Ok(())
    }

    pub async fn set_preferred_quality(&self, url: &str, quality: &str) -> crate::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO stream_preferences (stream_url, preferred_quality)
            VALUES (?, ?)
            ON CONFLICT(stream_url) DO UPDATE SET preferred_quality = excluded.preferred_quality
            "#,
        )
        .bind(url)
        .bind(quality)
        .execute(self.pool())
        .await?;
        Ok(())
    }
}
