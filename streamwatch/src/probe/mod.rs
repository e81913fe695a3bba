//! Invokes the external probe binary and classifies its textual output into
//! typed outcome kinds. This is the only place in the core that executes an
//! external process during a check.

use std::process::Stdio;
use std::time::Duration;

use process_utils::tokio_command;
use serde_json::Value;
use thiserror::Error;
use tokio::time::timeout;

const DEFAULT_PROBE_BINARY: &str = "probe";

/// What the probe should be asked to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Liveness,
    Metadata,
}

/// Classified failure kind. Order of the substring table in [`classify_output`]
/// matters: specific kinds are checked before generic ones.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProbeError {
    #[error("stream not found: {0}")]
    StreamNotFound(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("auth error: {0}")]
    Auth(String),
    #[error("probe timed out after {0:?}")]
    Timeout(Duration),
    #[error("probe failed: {0}")]
    Generic(String),
}

/// Successful liveness probe result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LivenessOutcome {
    LivePresent,
}

/// Options controlling a single probe invocation.
#[derive(Debug, Clone)]
pub struct ProbeOptions {
    pub binary_path: String,
    pub url: String,
    pub quality: String,
    pub timeout: Duration,
    pub twitch_disable_ads: bool,
    pub platform: String,
}

impl ProbeOptions {
    pub fn new(url: impl Into<String>, platform: impl Into<String>, timeout: Duration) -> Self {
        Self {
            binary_path: DEFAULT_PROBE_BINARY.to_string(),
            url: url.into(),
            quality: "best".to_string(),
            timeout,
            twitch_disable_ads: true,
            platform: platform.into(),
        }
    }
}

/// Runs the probe in liveness mode: "live" iff exit 0 and `Available streams:`
/// appears in stdout.
pub async fn probe_liveness(opts: &ProbeOptions) -> Result<LivenessOutcome, ProbeError> {
    let output = run_probe(opts, Mode::Liveness).await?;

    if output.status.success() && output.stdout.contains("Available streams:") {
        return Ok(LivenessOutcome::LivePresent);
    }

    let combined = format!("{}\n{}", output.stdout, output.stderr);
    Err(classify_output(&combined))
}

/// Runs the probe in metadata mode and returns the parsed JSON payload.
pub async fn probe_metadata(opts: &ProbeOptions) -> Result<Value, ProbeError> {
    let output = run_probe(opts, Mode::Metadata).await?;

    if output.status.success() && !output.stdout.trim().is_empty() {
        return serde_json::from_str::<Value>(output.stdout.trim())
            .map_err(|e| ProbeError::Generic(format!("malformed metadata JSON: {e}")));
    }

    let combined = format!("{}\n{}", output.stdout, output.stderr);
    Err(classify_output(&combined))
}

/// Out-of-band quality listing for the `change_quality` action: runs the same
/// metadata probe and reads the keys of the top-level `streams` object,
/// dropping the `*-unfiltered` aliases that duplicate `worst`/`best`.
pub async fn probe_qualities(opts: &ProbeOptions) -> Result<Vec<String>, ProbeError> {
    let json = probe_metadata(opts).await?;

    let streams = json
        .get("streams")
        .and_then(Value::as_object)
        .ok_or_else(|| ProbeError::Generic("no streams object in metadata JSON".to_string()))?;

    let qualities: Vec<String> = streams
        .keys()
        .filter(|k| k.as_str() != "worst-unfiltered" && k.as_str() != "best-unfiltered")
        .cloned()
        .collect();

    if qualities.is_empty() {
        return Err(ProbeError::Generic("no qualities found in metadata JSON".to_string()));
    }

    Ok(qualities)
}

struct RawOutput {
    status: std::process::ExitStatus,
    stdout: String,
    stderr: String,
}

async fn run_probe(opts: &ProbeOptions, mode: Mode) -> Result<RawOutput, ProbeError> {
    let mut cmd = tokio_command(&opts.binary_path);

    if mode == Mode::Metadata {
        cmd.arg("--json");
    }
    if opts.twitch_disable_ads && opts.platform.eq_ignore_ascii_case("twitch") {
        cmd.arg("--twitch-disable-ads");
    }
    cmd.arg(&opts.url);
    cmd.stdout(Stdio::piped()).stderr(Stdio::piped());

    let child_output = timeout(opts.timeout, cmd.output())
        .await
        .map_err(|_| ProbeError::Timeout(opts.timeout))?
        .map_err(|e| ProbeError::Generic(format!("failed to spawn probe: {e}")))?;

    Ok(RawOutput {
        status: child_output.status,
        stdout: String::from_utf8_lossy(&child_output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&child_output.stderr).into_owned(),
    })
}

/// Classify combined stdout+stderr by scanning for case-insensitive
/// substrings. Order matters: specific triggers are checked before generic
/// ones, and this function is never reached for a successful `LivePresent`.
fn classify_output(combined: &str) -> ProbeError {
    let lower = combined.to_lowercase();

    const NOT_FOUND: &[&str] = &[
        "no playable streams",
        "no streams found on",
        "stream is offline",
        "channel not found",
        "404 not found",
    ];
    if NOT_FOUND.iter().any(|needle| lower.contains(needle)) {
        return ProbeError::StreamNotFound(combined.trim().to_string());
    }

    const NETWORK: &[&str] = &[
        "connection refused",
        "connection timed out",
        "network unreachable",
        "dns",
        "name resolution",
        "ssl handshake",
        "certificate",
        "unable to connect",
    ];
    if NETWORK.iter().any(|needle| lower.contains(needle)) {
        return ProbeError::Network(combined.trim().to_string());
    }

    const AUTH: &[&str] = &[
        "authentication failed",
        "login failed",
        "unauthorized",
        "forbidden",
        "subscription required",
        "geo-blocked",
        "region blocked",
    ];
    if AUTH.iter().any(|needle| lower.contains(needle)) {
        return ProbeError::Auth(combined.trim().to_string());
    }

    ProbeError::Generic(combined.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_stream_not_found_before_generic() {
        let e = classify_output("streamlink: error: No playable streams found on this URL");
        assert!(matches!(e, ProbeError::StreamNotFound(_)));
    }

    #[test]
    fn classifies_network() {
        let e = classify_output("error: Unable to connect to API: Connection timed out");
        assert!(matches!(e, ProbeError::Network(_)));
    }

    #[test]
    fn classifies_auth() {
        let e = classify_output("error: 403 Forbidden: subscription required");
        assert!(matches!(e, ProbeError::Auth(_)));
    }

    #[test]
    fn falls_back_to_generic() {
        let e = classify_output("some unrelated gibberish");
        assert!(matches!(e, ProbeError::Generic(_)));
    }

    #[test]
    fn qualities_filter_out_unfiltered_aliases() {
        let json = serde_json::json!({
            "streams": {"worst": {}, "480p": {}, "best": {}, "worst-unfiltered": {}, "best-unfiltered": {}}
        });
        let streams = json.get("streams").and_then(Value::as_object).unwrap();
        let qualities: Vec<&str> = streams
            .keys()
            .filter(|k| k.as_str() != "worst-unfiltered" && k.as_str() != "best-unfiltered")
            .map(String::as_str)
            .collect();
        assert_eq!(qualities.len(), 3);
        assert!(!qualities.contains(&"worst-unfiltered"));
    }

    #[test]
    fn not_found_takes_priority_over_network_substring() {
        // "channel not found" should win even if the message also contains
        // an unrelated network-sounding word.
        let e = classify_output("channel not found (dns lookup was fine)");
        assert!(matches!(e, ProbeError::StreamNotFound(_)));
    }
}
