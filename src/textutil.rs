//! Small text helpers shared by the Executor and Callback Reconciler so
//! truncation behavior can't drift between the two paths that both write
//! truncated result/error text.

/// Truncates by character count, not byte length, so multi-byte UTF-8
/// content is never cut mid-codepoint.
pub fn truncate_chars(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        s.chars().take(max_chars).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leaves_short_strings_untouched() {
        assert_eq!(truncate_chars("hello", 10), "hello");
    }

    #[test]
    fn truncates_by_chars_not_bytes() {
        let multibyte = "héllo wörld";
        let truncated = truncate_chars(multibyte, 5);
        assert_eq!(truncated.chars().count(), 5);
    }
}
