//! Text helpers

/// Truncate `reason` to at most `max_chars` characters, appending an ellipsis
/// when anything was cut. Never splits a UTF-8 character.
pub fn truncate_reason(reason: &str, max_chars: usize) -> String {
    if reason.chars().count() <= max_chars {
        return reason.to_string();
    }
    let mut truncated: String = reason.chars().take(max_chars.saturating_sub(3)).collect();
    truncated.push_str("...");
    truncated
}
