use regex::Regex;
use std::sync::LazyLock;

/// Timestamp layout shared by the history file, change log and job records.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

static DECIMAL_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+(?:\.\d+)?)").expect("decimal pattern compiles"));

static UNSAFE_FILE_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"[\\/*?:"<>|]"#).expect("file name pattern compiles"));

/// First run of digits with an optional fractional part, e.g. `"¥ 12.50起"` -> `"12.50"`.
pub fn first_decimal(text: &str) -> Option<&str> {
    DECIMAL_RUN
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

/// Shortens `text` to `keep` characters plus an ellipsis once it is longer than `limit`.
pub fn truncate_display(text: &str, keep: usize, limit: usize) -> String {
    if text.chars().count() > limit {
        let head: String = text.chars().take(keep).collect();
        format!("{}...", head)
    } else {
        text.to_string()
    }
}

/// Strips characters that are not allowed in file names and caps the length.
pub fn sanitize_file_stem(text: &str, max_chars: usize) -> String {
    UNSAFE_FILE_CHARS
        .replace_all(text, "")
        .chars()
        .take(max_chars)
        .collect()
}
