//! Composes the probe, cache, rate limiter, and resilience layers into the
//! two operations the rest of the core calls: `check_liveness` and
//! `fetch_metadata`.

mod sanitize;

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::cache::{CachedStatus, StatusCache};
use crate::probe::{self, LivenessOutcome, ProbeError, ProbeOptions};
use crate::ratelimit::RateLimiter;
use crate::resilience::{CircuitBreakerManager, ResilienceError, RetryConfig, call_with_resilience};

pub use sanitize::{sanitize_category, truncate_excerpt};

const EXCERPT_LIMIT: usize = 500;

/// The closed error taxonomy from §7, with excerpts bounded to
/// [`EXCERPT_LIMIT`] characters before they're stored or logged.
#[derive(Debug, Clone, Error)]
pub enum CheckError {
    #[error("stream not found: {0}")]
    StreamNotFound(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("auth error: {0}")]
    Auth(String),
    #[error("timed out: {0}")]
    Timeout(String),
    #[error("rate limited")]
    RateLimited,
    #[error("circuit open for {0}")]
    CircuitOpen(String),
    #[error("{0}")]
    Generic(String),
}

impl From<ResilienceError<ProbeError>> for CheckError {
    fn from(err: ResilienceError<ProbeError>) -> Self {
        match err {
            ResilienceError::CircuitOpen(key) => CheckError::CircuitOpen(key),
            ResilienceError::Inner(probe_err) => probe_err.into(),
        }
    }
}

impl From<ProbeError> for CheckError {
    fn from(err: ProbeError) -> Self {
        let excerpt = |s: String| truncate_excerpt(&s, EXCERPT_LIMIT);
        match err {
            ProbeError::StreamNotFound(m) => CheckError::StreamNotFound(excerpt(m)),
            ProbeError::Network(m) => CheckError::Network(excerpt(m)),
            ProbeError::Auth(m) => CheckError::Auth(excerpt(m)),
            ProbeError::Timeout(d) => CheckError::Timeout(format!("{d:?}")),
            ProbeError::Generic(m) => CheckError::Generic(excerpt(m)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LivenessResult {
    pub is_live: bool,
    pub error: Option<CheckError>,
}

#[derive(Debug, Clone)]
pub struct MetadataResult {
    pub json: Option<Value>,
    pub error: Option<CheckError>,
}

/// Tunables surfaced via the `streamlink.*` and `resilience.*` config keys.
#[derive(Debug, Clone)]
pub struct CheckerConfig {
    pub cache_enabled: bool,
    pub cache_ttl: Duration,
    pub liveness_timeout: Duration,
    pub metadata_timeout: Duration,
    pub probe_binary: String,
    pub quality: String,
    pub twitch_disable_ads: bool,
    pub retry: RetryConfig,
    pub circuit_failure_threshold: u32,
    pub circuit_recovery_timeout: Duration,
}

impl Default for CheckerConfig {
    fn default() -> Self {
        Self {
            cache_enabled: true,
            cache_ttl: Duration::from_secs(300),
            liveness_timeout: Duration::from_secs(10),
            metadata_timeout: Duration::from_secs(15),
            probe_binary: "probe".to_string(),
            quality: "best".to_string(),
            twitch_disable_ads: true,
            retry: RetryConfig::default(),
            circuit_failure_threshold: 5,
            circuit_recovery_timeout: Duration::from_secs(60),
        }
    }
}

pub struct StreamChecker {
    cache: Arc<StatusCache>,
    rate_limiter: Arc<RateLimiter>,
    breakers: Arc<CircuitBreakerManager>,
    config: CheckerConfig,
}

impl StreamChecker {
    pub fn new(cache: Arc<StatusCache>, rate_limiter: Arc<RateLimiter>, config: CheckerConfig) -> Self {
        let breakers = Arc::new(CircuitBreakerManager::new(
            config.circuit_failure_threshold,
            config.circuit_recovery_timeout,
        ));
        Self {
            cache,
            rate_limiter,
            breakers,
            config,
        }
    }

    fn platform_for(url: &str) -> String {
        url_classify::classify(url).platform
    }

    fn probe_options(&self, url: &str, platform: &str, timeout: Duration) -> ProbeOptions {
        ProbeOptions {
            binary_path: self.config.probe_binary.clone(),
            url: url.to_string(),
            quality: self.config.quality.clone(),
            timeout,
            twitch_disable_ads: self.config.twitch_disable_ads,
            platform: platform.to_string(),
        }
    }

    /// 1. cache hit short-circuits; 2. acquire rate limit; 3. probe via
    /// resilience; 4. derive+write cache status; 5. return is_live.
    pub async fn check_liveness(&self, url: &str) -> LivenessResult {
        if self.config.cache_enabled {
            if let Some(status) = self.cache.get(url) {
                debug!(url, "liveness cache hit");
                return LivenessResult {
                    is_live: status == CachedStatus::Live,
                    error: None,
                };
            }
        }

        let platform = Self::platform_for(url);

        if !self
            .rate_limiter
            .acquire(&platform, self.config.liveness_timeout)
            .await
        {
            warn!(url, "liveness check denied by rate limiter");
            return LivenessResult {
                is_live: false,
                error: Some(CheckError::RateLimited),
            };
        }

        let opts = self.probe_options(url, &platform, self.config.liveness_timeout);
        let key = format!("liveness:{url}");

        let outcome = call_with_resilience(&self.breakers, &key, &self.config.retry, || {
            probe::probe_liveness(&opts)
        })
        .await;

        let (cache_status, result) = match outcome {
            Ok(LivenessOutcome::LivePresent) => (
                CachedStatus::Live,
                LivenessResult {
                    is_live: true,
                    error: None,
                },
            ),
            Err(err) => {
                let check_err: CheckError = err.into();
                let status = match &check_err {
                    CheckError::StreamNotFound(_) => CachedStatus::Offline,
                    _ => CachedStatus::Error,
                };
                (
                    status,
                    LivenessResult {
                        is_live: false,
                        error: Some(check_err),
                    },
                )
            }
        };

        self.cache.put_with_ttl(url, cache_status, self.config.cache_ttl);
        result
    }

    /// Acquires rate limit, probes in metadata mode via resilience, and
    /// validates the JSON payload. Never touches the cache.
    pub async fn fetch_metadata(&self, url: &str) -> MetadataResult {
        let platform = Self::platform_for(url);

        if !self
            .rate_limiter
            .acquire(&platform, self.config.metadata_timeout)
            .await
        {
            return MetadataResult {
                json: None,
                error: Some(CheckError::RateLimited),
            };
        }

        let opts = self.probe_options(url, &platform, self.config.metadata_timeout);
        let key = format!("metadata:{url}");

        match call_with_resilience(&self.breakers, &key, &self.config.retry, || {
            probe::probe_metadata(&opts)
        })
        .await
        {
            Ok(json) => MetadataResult {
                json: Some(json),
                error: None,
            },
            Err(err) => MetadataResult {
                json: None,
                error: Some(err.into()),
            },
        }
    }
}

/// Extracts a category string from a metadata JSON payload: platform-specific
/// field first (`game` for Twitch), then generic program/category fields,
/// finally a cleaned prefix of the title. Always sanitized and length-capped.
pub fn extract_category(metadata: &Value, platform: &str, title: &str) -> String {
    let field = if platform.eq_ignore_ascii_case("twitch") {
        metadata.get("game").and_then(Value::as_str)
    } else {
        None
    }
    .or_else(|| metadata.get("game_name").and_then(Value::as_str))
    .or_else(|| metadata.get("category").and_then(Value::as_str))
    .or_else(|| metadata.get("program_title").and_then(Value::as_str));

    let raw = match field {
        Some(s) if !s.trim().is_empty() => s.to_string(),
        _ => {
            let cleaned = title.trim();
            cleaned.chars().take(100).collect()
        }
    };

    sanitize_category(&raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn extracts_twitch_game_field() {
        let metadata = json!({"game": "Just Chatting", "category": "ignored"});
        assert_eq!(extract_category(&metadata, "Twitch", "title"), "Just Chatting");
    }

    #[test]
    fn falls_back_to_category_field_for_non_twitch() {
        let metadata = json!({"category": "Music"});
        assert_eq!(extract_category(&metadata, "YouTube", "title"), "Music");
    }

    #[test]
    fn falls_back_to_title_when_no_fields_present() {
        let metadata = json!({});
        assert_eq!(extract_category(&metadata, "Kick", "Some Stream Title"), "Some Stream Title");
    }

    #[test]
    fn check_error_from_probe_error_truncates_excerpt() {
        let long = "x".repeat(600);
        let err: CheckError = ProbeError::Generic(long).into();
        match err {
            CheckError::Generic(s) => assert_eq!(s.chars().count(), EXCERPT_LIMIT + 1),
            _ => panic!("expected Generic"),
        }
    }
}
