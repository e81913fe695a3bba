//! Fallback classification for any host that doesn't match a known
//! platform: derive a platform name from the second-to-last DNS label and
//! a handle from the last non-empty path segment.

use crate::{Classification, Kind};

pub(crate) fn classify(host: &str, path: &str) -> Classification {
    let labels: Vec<&str> = host.split('.').collect();
    let platform = if labels.len() > 1 {
        labels[labels.len() - 2]
    } else {
        labels[0]
    };

    let handle = path
        .split('/')
        .filter(|segment| !segment.is_empty())
        .next_back()
        .unwrap_or(host);

    Classification::new(title_case(platform), handle, Kind::GenericFallback)
}

fn title_case(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify;

    #[test]
    fn derives_platform_from_second_to_last_label() {
        let c = classify("https://streams.example.com/channel/abc");
        assert_eq!(c.platform, "Example");
        assert_eq!(c.handle, "abc");
        assert_eq!(c.kind, Kind::GenericFallback);
    }

    #[test]
    fn falls_back_to_host_when_path_is_empty() {
        let c = classify("https://example.com/");
        assert_eq!(c.handle, "example.com");
    }

    #[test]
    fn single_label_host() {
        let c = classify("https://localhost/foo");
        assert_eq!(c.platform, "Localhost");
        assert_eq!(c.handle, "foo");
    }
}
