//! Bootstrap configuration: the handful of settings the process needs
//! before the store even exists. Everything else (quality, timeouts,
//! worker counts, retry/circuit/cache/ratelimit knobs) lives in the
//! DB-backed [`crate::store::ConfigValue`] table, seeded with the defaults
//! below on first run.

use std::path::PathBuf;

const APP_NAME: &str = "streamwatch";
const DATABASE_URL_VAR: &str = "DATABASE_URL";
const DATA_DIR_VAR: &str = "STREAMWATCH_DATA_DIR";
const LOG_DIR_VAR: &str = "STREAMWATCH_LOG_DIR";

#[derive(Debug, Clone)]
pub struct BootstrapConfig {
    pub database_url: String,
    pub data_dir: PathBuf,
    pub log_dir: Option<PathBuf>,
}

impl BootstrapConfig {
    /// Loads `.env` (if present) then resolves settings from the
    /// environment, falling back to the platform config directory.
    pub fn load() -> crate::Result<Self> {
        dotenvy::dotenv().ok();

        let data_dir = match std::env::var(DATA_DIR_VAR) {
            Ok(value) => PathBuf::from(value),
            Err(_) => default_data_dir()?,
        };

        let database_url = std::env::var(DATABASE_URL_VAR).unwrap_or_else(|_| {
            format!("sqlite://{}?mode=rwc", data_dir.join("streamwatch.db").display())
        });

        let log_dir = std::env::var(LOG_DIR_VAR).ok().map(PathBuf::from);

        Ok(Self {
            database_url,
            data_dir,
            log_dir,
        })
    }

    pub fn streams_json_path(&self) -> PathBuf {
        self.data_dir.join("streams.json")
    }

    pub fn config_ini_path(&self) -> PathBuf {
        self.data_dir.join("config.ini")
    }
}

fn default_data_dir() -> crate::Result<PathBuf> {
    dirs::config_dir()
        .map(|dir| dir.join(APP_NAME))
        .ok_or_else(|| crate::Error::config("could not resolve a platform config directory"))
}

/// Default runtime config values seeded into `app_config` on first run,
/// mirroring the key/default/effect table the external interfaces rely on.
pub const DEFAULT_RUNTIME_CONFIG: &[(&str, &str)] = &[
    ("streamlink.quality", "best"),
    ("streamlink.timeout_liveness", "10"),
    ("streamlink.timeout_metadata", "15"),
    ("streamlink.max_workers_liveness", "4"),
    ("streamlink.max_workers_metadata", "2"),
    ("streamlink.twitch_disable_ads", "true"),
    ("resilience.retry_max_attempts", "3"),
    ("resilience.retry_base_delay", "1.0"),
    ("resilience.retry_max_delay", "60.0"),
    ("resilience.retry_exponential_base", "2.0"),
    ("resilience.retry_jitter", "true"),
    ("cache.enabled", "true"),
    ("cache.ttl_seconds", "300"),
    ("ratelimit.enabled", "true"),
    ("misc.donation_link", "https://buymeacoffee.com/snowballons"),
];

/// Seeds any of [`DEFAULT_RUNTIME_CONFIG`] that isn't already present.
pub async fn seed_runtime_defaults(store: &crate::store::Store) -> crate::Result<()> {
    for (key, value) in DEFAULT_RUNTIME_CONFIG {
        if store.get_config(key).await?.is_none() {
            let inferred = crate::store::ConfigValue::infer_from_str(value);
            store.set_config(key, inferred).await?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn seeding_is_idempotent() {
        let pool = crate::store::init_pool("sqlite::memory:").await.unwrap();
        crate::store::run_migrations(&pool).await.unwrap();
        let store = crate::store::Store::new(pool);

        seed_runtime_defaults(&store).await.unwrap();
        let count_after_first = store.all_config().await.unwrap().len();

        seed_runtime_defaults(&store).await.unwrap();
        let count_after_second = store.all_config().await.unwrap().len();

        assert_eq!(count_after_first, count_after_second);
        assert_eq!(count_after_first, DEFAULT_RUNTIME_CONFIG.len());
    }
}
