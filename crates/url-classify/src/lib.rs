//! Pure URL classification for stream URLs.
//!
//! Given a URL, [`classify`] returns the platform it belongs to, the
//! handle/channel/video identifier embedded in it, and what kind of
//! reference it is (a channel, a specific video, a raw channel id, or an
//! unrecognized "generic" URL). The classifier never performs I/O and never
//! fails outright: an unparsable string yields a [`Classification`] with
//! [`Kind::ParseError`] rather than an `Err`.

mod platforms;

use url::Url;

/// What a classified URL refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Kind {
    /// A channel / user page (the common case).
    Channel,
    /// A specific video or VOD.
    Video,
    /// A platform-internal channel id (e.g. YouTube's `UC...`).
    ChannelId,
    /// Host matched no known platform table; derived heuristically.
    GenericFallback,
    /// The string isn't a parseable `http(s)` URL, or matched nothing.
    ParseError,
}

/// The result of classifying a URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Classification {
    /// Platform name, title-cased (e.g. `"Twitch"`, `"YouTube"`).
    pub platform: String,
    /// Username, channel id, or video id extracted from the URL.
    pub handle: String,
    /// What kind of reference this is.
    pub kind: Kind,
}

impl Classification {
    fn new(platform: impl Into<String>, handle: impl Into<String>, kind: Kind) -> Self {
        Self {
            platform: platform.into(),
            handle: handle.into(),
            kind,
        }
    }

    fn parse_error() -> Self {
        Self::new("Unknown", "unknown_stream", Kind::ParseError)
    }

    /// `true` if this URL was recognized as live-checkable content (not a
    /// parse error).
    pub fn is_recognized(&self) -> bool {
        !matches!(self.kind, Kind::ParseError)
    }
}

/// Classify a stream URL.
///
/// Rules, evaluated top-down:
/// 1. Scheme must be `http`/`https`, otherwise [`Kind::ParseError`].
/// 2. Host is matched against an ordered platform table (Twitch, YouTube,
///    Kick); the first match wins.
/// 3. Anything else falls back to a generic classification derived from the
///    host's second-to-last DNS label and the last non-empty path segment.
///
/// This function is pure and side-effect-free.
pub fn classify(raw_url: &str) -> Classification {
    if raw_url.trim().is_empty() {
        return Classification::parse_error();
    }

    let Ok(parsed) = Url::parse(raw_url) else {
        return Classification::parse_error();
    };

    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return Classification::parse_error();
    }

    let Some(host) = parsed.host_str() else {
        return Classification::parse_error();
    };
    let host = host.strip_prefix("www.").unwrap_or(host);

    for platform in platforms::TABLE {
        if (platform.host_matches)(host) {
            return (platform.classify)(raw_url, host, parsed.path());
        }
    }

    platforms::generic::classify(host, parsed.path())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_http_scheme() {
        let c = classify("ftp://twitch.tv/someone");
        assert_eq!(c.kind, Kind::ParseError);
    }

    #[test]
    fn rejects_garbage() {
        let c = classify("not a url");
        assert_eq!(c.kind, Kind::ParseError);
    }

    #[test]
    fn rejects_empty() {
        let c = classify("   ");
        assert_eq!(c.kind, Kind::ParseError);
    }

    #[test]
    fn strips_www_prefix() {
        let c = classify("https://www.twitch.tv/someone");
        assert_eq!(c.platform, "Twitch");
        assert_eq!(c.handle, "someone");
    }
}
