use std::sync::LazyLock;

use regex::Regex;

use crate::{Classification, Kind};

static CHANNEL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^/(?:@([a-zA-Z0-9_.-]+)|c/([a-zA-Z0-9_.-]+)|channel/([a-zA-Z0-9_-]+)|user/([a-zA-Z0-9_.-]+))/?").unwrap()
});

static VIDEO_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:/watch\?v=|youtu\.be/)([a-zA-Z0-9_-]{11})").unwrap());

pub(crate) fn host_matches(host: &str) -> bool {
    host.eq_ignore_ascii_case("youtube.com")
        || host.ends_with(".youtube.com")
        || host.eq_ignore_ascii_case("youtu.be")
}

pub(crate) fn classify(url: &str, _host: &str, path: &str) -> Classification {
    if let Some(caps) = CHANNEL_RE.captures(path) {
        let handle = caps
            .iter()
            .skip(1)
            .flatten()
            .next()
            .map(|m| m.as_str())
            .unwrap_or("unknown_channel");
        let kind = if caps.get(3).is_some() {
            // channel/UC... is a raw platform channel id.
            Kind::ChannelId
        } else {
            Kind::Channel
        };
        return Classification::new("YouTube", handle, kind);
    }

    if let Some(caps) = VIDEO_ID_RE.captures(url) {
        return Classification::new("YouTube", &caps[1], Kind::Video);
    }

    Classification::new("YouTube", "unknown_youtube_url", Kind::ParseError)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify;

    #[test]
    fn handle_url() {
        let c = classify("https://youtube.com/@SomeCreator");
        assert_eq!(c.platform, "YouTube");
        assert_eq!(c.handle, "SomeCreator");
        assert_eq!(c.kind, Kind::Channel);
    }

    #[test]
    fn channel_id_url() {
        let c = classify("https://www.youtube.com/channel/UCabcdefgh12345");
        assert_eq!(c.handle, "UCabcdefgh12345");
        assert_eq!(c.kind, Kind::ChannelId);
    }

    #[test]
    fn legacy_user_url() {
        let c = classify("https://youtube.com/user/someuser");
        assert_eq!(c.handle, "someuser");
        assert_eq!(c.kind, Kind::Channel);
    }

    #[test]
    fn watch_url() {
        let c = classify("https://www.youtube.com/watch?v=dQw4w9WgXcQ");
        assert_eq!(c.handle, "dQw4w9WgXcQ");
        assert_eq!(c.kind, Kind::Video);
    }

    #[test]
    fn short_url() {
        let c = classify("https://youtu.be/dQw4w9WgXcQ");
        assert_eq!(c.handle, "dQw4w9WgXcQ");
        assert_eq!(c.kind, Kind::Video);
    }

    #[test]
    fn unrecognized_path_is_parse_error() {
        let c = classify("https://youtube.com/feed/trending");
        assert_eq!(c.kind, Kind::ParseError);
    }
}
