//! One-time migration of legacy `streams.json` / `config.ini` files into
//! the store, with a timestamped backup taken before anything is written.

use std::path::Path;

use chrono::Utc;
use serde::Deserialize;
use serde_json::Value;

use crate::domain::StreamRecord;

use super::{ConfigValue, Store};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MigrationReport {
    pub streams_migrated: usize,
    pub streams_failed: usize,
    pub config_migrated: usize,
    pub config_failed: usize,
    pub backup_dir: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LegacyStream {
    url: String,
    #[serde(default)]
    alias: Option<String>,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    notes: Option<String>,
}

/// Runs the legacy migration if needed: no-op if the store already has at
/// least one stream, or if neither legacy file exists. Otherwise backs up
/// both files to a timestamped directory under `config_dir`, then migrates
/// whichever of them is present.
pub async fn migrate_legacy(
    store: &Store,
    streams_json_path: &Path,
    config_ini_path: &Path,
    config_dir: &Path,
) -> crate::Result<MigrationReport> {
    let streams_exist = streams_json_path.is_file();
    let config_exists = config_ini_path.is_file();

    if !streams_exist && !config_exists {
        return Ok(MigrationReport::default());
    }

    let existing: Vec<StreamRecord> = store.load(true).await?;
    if !existing.is_empty() {
        return Ok(MigrationReport::default());
    }

    let backup_dir = create_backup(streams_json_path, config_ini_path, config_dir)?;
    let mut report = MigrationReport {
        backup_dir: Some(backup_dir.display().to_string()),
        ..Default::default()
    };

    if streams_exist {
        let (migrated, failed) = migrate_streams(store, streams_json_path).await?;
        report.streams_migrated = migrated;
        report.streams_failed = failed;
    }

    if config_exists {
        let (migrated, failed) = migrate_config(store, config_ini_path).await?;
        report.config_migrated = migrated;
        report.config_failed = failed;
    }

    Ok(report)
}

/// Copies both legacy files (whichever exist) into
/// `<config_dir>/migration_backup/backup_<YYYYMMDD_HHMMSS>/` and writes a
/// `backup_info.json` manifest alongside them.
fn create_backup(
    streams_json_path: &Path,
    config_ini_path: &Path,
    config_dir: &Path,
) -> crate::Result<std::path::PathBuf> {
    let stamp = Utc::now().format("%Y%m%d_%H%M%S");
    let backup_dir = config_dir.join("migration_backup").join(format!("backup_{stamp}"));
    std::fs::create_dir_all(&backup_dir)?;

    let mut source_files = Vec::new();
    for path in [streams_json_path, config_ini_path] {
        if path.is_file() {
            if let Some(name) = path.file_name() {
                std::fs::copy(path, backup_dir.join(name))?;
                source_files.push(name.to_string_lossy().into_owned());
            }
        }
    }

    let manifest = serde_json::json!({
        "created_at": Utc::now().to_rfc3339(),
        "source_files": source_files,
        "migration_version": 1,
    });
    std::fs::write(
        backup_dir.join("backup_info.json"),
        serde_json::to_vec_pretty(&manifest)?,
    )?;

    Ok(backup_dir)
}

async fn migrate_streams(store: &Store, streams_json_path: &Path) -> crate::Result<(usize, usize)> {
    let raw = std::fs::read_to_string(streams_json_path)?;
    let entries: Vec<LegacyStream> = match serde_json::from_str::<Value>(&raw)? {
        Value::Array(items) => items
            .into_iter()
            .filter_map(|v| serde_json::from_value(v).ok())
            .collect(),
        _ => Vec::new(),
    };

    let mut migrated = 0;
    let mut failed = 0;
    for entry in entries {
        let classification = url_classify::classify(&entry.url);
        let alias = entry
            .alias
            .filter(|a| !a.trim().is_empty())
            .unwrap_or_else(|| classification.handle.clone());

        let mut record = StreamRecord::new(&entry.url, alias, &classification.platform, &classification.handle);
        record.category = entry.category;
        record.notes = entry.notes;

        match store.upsert(&record).await {
            Ok(()) => migrated += 1,
            Err(_) => failed += 1,
        }
    }

    Ok((migrated, failed))
}

async fn migrate_config(store: &Store, config_ini_path: &Path) -> crate::Result<(usize, usize)> {
    let raw = std::fs::read_to_string(config_ini_path)?;

    let mut migrated = 0;
    let mut failed = 0;
    let mut section = String::new();

    for line in raw.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with(['#', ';']) {
            continue;
        }
        if line.starts_with('[') && line.ends_with(']') {
            section = line[1..line.len() - 1].trim().to_ascii_lowercase();
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();
        let value = value.trim();
        if key.is_empty() || section.is_empty() {
            continue;
        }

        let db_key = format!("{section}.{key}");
        match store.set_config(&db_key, ConfigValue::infer_from_str(value)).await {
            Ok(()) => migrated += 1,
            Err(_) => failed += 1,
        }
    }

    Ok((migrated, failed))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn noop_when_no_legacy_files_present() {
        let pool = super::super::init_pool("sqlite::memory:").await.unwrap();
        super::super::run_migrations(&pool).await.unwrap();
        let store = Store::new(pool);

        let dir = tempfile::tempdir().unwrap();
        let report = migrate_legacy(
            &store,
            &dir.path().join("streams.json"),
            &dir.path().join("config.ini"),
            dir.path(),
        )
        .await
        .unwrap();

        assert_eq!(report, MigrationReport::default());
    }

    #[tokio::test]
    async fn migrates_streams_and_config_and_backs_up() {
        let pool = super::super::init_pool("sqlite::memory:").await.unwrap();
        super::super::run_migrations(&pool).await.unwrap();
        let store = Store::new(pool);

        let dir = tempfile::tempdir().unwrap();
        let streams_path = dir.path().join("streams.json");
        let config_path = dir.path().join("config.ini");

        std::fs::write(
            &streams_path,
            r#"[{"url": "https://twitch.tv/someone", "alias": "Someone"}]"#,
        )
        .unwrap();
        std::fs::write(&config_path, "[general]\npoll_interval=30\nauto_launch=true\n").unwrap();

        let report = migrate_legacy(&store, &streams_path, &config_path, dir.path())
            .await
            .unwrap();

        assert_eq!(report.streams_migrated, 1);
        assert_eq!(report.streams_failed, 0);
        assert_eq!(report.config_migrated, 2);
        assert!(report.backup_dir.is_some());

        let backup_dir = std::path::PathBuf::from(report.backup_dir.unwrap());
        assert!(backup_dir.join("streams.json").is_file());
        assert!(backup_dir.join("config.ini").is_file());
        assert!(backup_dir.join("backup_info.json").is_file());

        let stored = store.get("https://twitch.tv/someone").await.unwrap();
        assert!(stored.is_some());

        let interval = store.get_config("general.poll_interval").await.unwrap().unwrap();
        assert_eq!(interval.value, ConfigValue::Integer(30));
    }

    #[tokio::test]
    async fn skips_when_streams_already_present() {
        let pool = super::super::init_pool("sqlite::memory:").await.unwrap();
        super::super::run_migrations(&pool).await.unwrap();
        let store = Store::new(pool);
        store
            .upsert(&StreamRecord::new("https://twitch.tv/x", "X", "Twitch", "x"))
            .await
            .unwrap();

        let dir = tempfile::tempdir().unwrap();
        let streams_path = dir.path().join("streams.json");
        std::fs::write(&streams_path, r#"[{"url": "https://twitch.tv/y"}]"#).unwrap();

        let report = migrate_legacy(&store, &streams_path, &dir.path().join("config.ini"), dir.path())
            .await
            .unwrap();

        assert_eq!(report, MigrationReport::default());
        assert!(store.get("https://twitch.tv/y").await.unwrap().is_none());
    }
}
