use std::sync::LazyLock;

use regex::Regex;

use crate::{Classification, Kind};

static CHANNEL_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^/([a-zA-Z0-9_]+)/?$").unwrap());

pub(crate) fn host_matches(host: &str) -> bool {
    host.eq_ignore_ascii_case("kick.com") || host.ends_with(".kick.com")
}

pub(crate) fn classify(_url: &str, _host: &str, path: &str) -> Classification {
    if let Some(caps) = CHANNEL_RE.captures(path) {
        return Classification::new("Kick", &caps[1], Kind::Channel);
    }
    Classification::new("Kick", "unknown_user", Kind::ParseError)
}
