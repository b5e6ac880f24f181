use std::sync::LazyLock;

use regex::Regex;

#[allow(clippy::unwrap_used)] // literal pattern
static TIMESTAMP_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9]{2}:[0-9]{2}:[0-9]{2}").unwrap());

/// Whether `line` starts with an `HH:MM:SS` clock prefix, as every event line
/// of an Apex debug log does (`09:10:11.123 (4123)|USER_DEBUG|...`).
///
/// Only ASCII digits count and the shape is not range-checked, so `99:99:99`
/// is still a timestamp.
pub fn is_timestamped(line: &str) -> bool {
    TIMESTAMP_RE.is_match(line)
}
