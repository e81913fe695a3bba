//! Category-string sanitizer: the permitted character class and length cap
//! applied to anything surfaced as a stream's category.

const MAX_LEN: usize = 100;

/// Sanitize a free-form category/title fragment: map a few punctuation
/// characters to safer equivalents, strip anything outside the permitted
/// class, and truncate with an ellipsis at 100 characters. An empty result
/// becomes `"N/A"`.
pub fn sanitize_category(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            ':' => out.push_str(" -"),
            ';' => out.push(','),
            '<' | '>' | '{' | '}' => out.push_str("()"),
            c if is_permitted(c) => out.push(c),
            _ => {}
        }
    }

    let trimmed = out.trim();
    if trimmed.is_empty() {
        return "N/A".to_string();
    }

    if trimmed.chars().count() > MAX_LEN {
        let truncated: String = trimmed.chars().take(MAX_LEN - 1).collect();
        format!("{truncated}…")
    } else {
        trimmed.to_string()
    }
}

fn is_permitted(c: char) -> bool {
    c.is_alphanumeric()
        || c.is_whitespace()
        || matches!(c, '-' | '_' | '.' | '(' | ')' | '[' | ']' | '&' | '/')
}

/// Truncate an error/stderr excerpt to a bounded length before it's stored
/// or logged.
pub fn truncate_excerpt(input: &str, max_chars: usize) -> String {
    if input.chars().count() <= max_chars {
        input.to_string()
    } else {
        let truncated: String = input.chars().take(max_chars).collect();
        format!("{truncated}…")
    }
}
