//! Small text helpers shared by reply formatting and task titles.

/// Maximum length of a compacted snippet before it is cut with `...`.
pub const SNIPPET_MAX_CHARS: usize = 120;

/// Collapse all whitespace runs to single spaces and cut long text.
pub fn compact_snippet(input: &str) -> String {
    let text = collapse_whitespace(input);
    if text.chars().count() <= SNIPPET_MAX_CHARS {
        return text;
    }
    let mut cut = truncate_chars(&text, SNIPPET_MAX_CHARS).to_string();
    cut.push_str("...");
    cut
}

/// Trim and join whitespace-separated fields with a single space.
pub fn collapse_whitespace(input: &str) -> String {
    input.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Prefix of `input` holding at most `max` characters.
pub fn truncate_chars(input: &str, max: usize) -> &str {
    match input.char_indices().nth(max) {
        Some((idx, _)) => &input[..idx],
        None => input,
    }
}

/// Strip `prefix` from the trimmed `value`, ignoring ASCII case.
/// Returns the trimmed remainder, or the trimmed value if the prefix is absent.
pub fn trim_prefix_ignore_case<'a>(value: &'a str, prefix: &str) -> &'a str {
    let value = value.trim();
    let prefix = prefix.trim();
    if prefix.is_empty() {
        return value;
    }
    match value.get(..prefix.len()) {
        Some(head) if head.eq_ignore_ascii_case(prefix) => value[prefix.len()..].trim(),
        _ => value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compact_snippet_collapses_whitespace() {
        assert_eq!(compact_snippet("  a \n\n b\t c  "), "a b c");
        assert_eq!(compact_snippet("   "), "");
    }

    #[test]
    fn test_compact_snippet_truncates_long_text() {
        let long = "x".repeat(200);
        let out = compact_snippet(&long);
        assert_eq!(out.len(), 123);
        assert!(out.ends_with("..."));
    }

    #[test]
    fn test_truncate_chars_is_char_safe() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("abc", 10), "abc");
    }

    #[test]
    fn test_trim_prefix_ignore_case() {
        assert_eq!(
            trim_prefix_ignore_case("Command Succeeded: done", "command succeeded:"),
            "done"
        );
        assert_eq!(trim_prefix_ignore_case(" other ", "command failed:"), "other");
        assert_eq!(trim_prefix_ignore_case("ok", "longer prefix"), "ok");
    }
}
