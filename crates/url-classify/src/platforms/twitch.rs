use std::sync::LazyLock;

use regex::Regex;

use crate::{Classification, Kind};

static CHANNEL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^/([a-zA-Z0-9_]{4,25})/?$").unwrap());

pub(crate) fn host_matches(host: &str) -> bool {
    host.eq_ignore_ascii_case("twitch.tv") || host.ends_with(".twitch.tv")
}

pub(crate) fn classify(_url: &str, _host: &str, path: &str) -> Classification {
    if let Some(caps) = CHANNEL_RE.captures(path) {
        return Classification::new("Twitch", &caps[1], Kind::Channel);
    }
    Classification::new("Twitch", "unknown_user", Kind::ParseError)
}
