use std::borrow::Cow;
use std::sync::LazyLock;

use regex::Regex;

#[allow(clippy::unwrap_used)] // literal pattern
static ANSI_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\x1b\[[0-9;?]*[a-zA-Z]|\x1b[()][A-B0-2]").unwrap());

/// Drop the `\r` of a CRLF line ending.
pub fn trim_line_ending(line: &str) -> &str {
    line.strip_suffix('\r').unwrap_or(line)
}

/// The text of `line` without ANSI escape sequences.
///
/// Used only to decide what a line is; the filter always emits the line as
/// captured.
pub fn strip_ansi(line: &str) -> Cow<'_, str> {
    if line.contains('\x1b') {
        ANSI_RE.replace_all(line, "")
    } else {
        Cow::Borrowed(line)
    }
}
