/// Truncate `text` to at most `limit` characters, marking the cut with `...`.
pub fn truncate_chars(text: &str, limit: usize) -> String {
    const SUFFIX: &str = "...";

    if text.chars().count() <= limit {
        return text.to_string();
    }
    if limit <= SUFFIX.len() {
        return text.chars().take(limit).collect();
    }
    let truncated: String = text.chars().take(limit - SUFFIX.len()).collect();
    format!("{truncated}{SUFFIX}")
}
