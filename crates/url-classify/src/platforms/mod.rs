//! Per-platform URL matchers, dispatched through an ordered static table —
//! the same shape as a regex-keyed extractor factory, minus the extraction.

pub(crate) mod generic;
mod kick;
mod twitch;
mod youtube;

use crate::Classification;

pub(crate) struct PlatformEntry {
    pub(crate) host_matches: fn(&str) -> bool,
    pub(crate) classify: fn(url: &str, host: &str, path: &str) -> Classification,
}

/// Ordered platform table: first matching host wins. Order matters only in
/// that it must be checked before the generic fallback, which isn't part of
/// this table.
pub(crate) static TABLE: &[PlatformEntry] = &[
    PlatformEntry {
        host_matches: twitch::host_matches,
        classify: twitch::classify,
    },
    PlatformEntry {
        host_matches: youtube::host_matches,
        classify: youtube::classify,
    },
    PlatformEntry {
        host_matches: kick::host_matches,
        classify: kick::classify,
    },
];
