mod cleanup;
mod timestamp;

use aexec_common::Error;

use crate::keywords::LinePredicate;

pub use self::cleanup::{strip_ansi, trim_line_ending};
pub use self::timestamp::is_timestamped;

/// How a single line was classified by the filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Empty line; dropped without touching the carry flag.
    Blank,
    /// Satisfies the predicate; kept.
    Signal,
    /// Unstamped line directly following kept output; kept.
    Continuation,
    /// Everything else; dropped and clears the carry flag.
    Noise,
}

impl Verdict {
    pub const fn is_kept(self) -> bool {
        matches!(self, Self::Signal | Self::Continuation)
    }
}

/// Line counts for one filter run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FilterStats {
    /// Lines in the document, banner and preamble included.
    pub total: usize,
    /// Banner plus any lines before the first timestamped line.
    pub preamble: usize,
    pub blank: usize,
    pub signal: usize,
    pub continuation: usize,
    pub noise: usize,
}

impl FilterStats {
    pub const fn kept(&self) -> usize {
        self.signal + self.continuation
    }

    pub const fn dropped(&self) -> usize {
        self.total - self.kept()
    }

    fn record(&mut self, verdict: Verdict) {
        match verdict {
            Verdict::Blank => self.blank += 1,
            Verdict::Signal => self.signal += 1,
            Verdict::Continuation => self.continuation += 1,
            Verdict::Noise => self.noise += 1,
        }
    }
}

/// Filtered text plus the counts that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterOutput {
    pub text: String,
    pub stats: FilterStats,
}

/// Classify one line given whether the previous non-blank line was kept.
///
/// Only an empty line is blank. Keyword and timestamp checks see the line with
/// ANSI escapes removed.
///
/// Returns the verdict and the carry flag for the next line.
pub fn classify<P>(line: &str, predicate: &P, previous_matched: bool) -> (Verdict, bool)
where
    P: LinePredicate + ?Sized,
{
    if line.is_empty() {
        return (Verdict::Blank, previous_matched);
    }
    let view = strip_ansi(line);
    if predicate.matches(&view) {
        return (Verdict::Signal, true);
    }
    if previous_matched && !is_timestamped(&view) {
        return (Verdict::Continuation, true);
    }
    (Verdict::Noise, false)
}

/// Index of the first timestamped line, never considering line 0 (the banner).
fn find_start(lines: &[&str]) -> Option<usize> {
    lines
        .iter()
        .skip(1)
        .position(|l| is_timestamped(&strip_ansi(l)))
        .map(|i| i + 1)
}

/// Filter captured execute-anonymous output down to signal lines.
///
/// Processing order:
///
/// ```text
/// 1. split on '\n', strip a trailing '\r' per line
///    (ANSI codes are ignored when classifying but kept in the output)
/// 2. skip line 0 and every line before the first HH:MM:SS-prefixed line
/// 3. from there, per line:
///      blank                         → drop, carry unchanged
///      predicate matches             → keep, carry = true
///      unstamped and carry           → keep (continuation)
///      otherwise                     → drop, carry = false
/// 4. join kept lines with '\n' (no trailing newline)
/// ```
///
/// # Errors
///
/// Returns [`Error::LogFormat`] if no line after the banner is timestamped.
pub fn filter_log<P>(text: &str, predicate: &P) -> Result<String, Error>
where
    P: LinePredicate + ?Sized,
{
    filter_log_with_stats(text, predicate).map(|out| out.text)
}

/// Same as [`filter_log`], also reporting per-verdict line counts.
///
/// # Errors
///
/// Returns [`Error::LogFormat`] if no line after the banner is timestamped.
pub fn filter_log_with_stats<P>(text: &str, predicate: &P) -> Result<FilterOutput, Error>
where
    P: LinePredicate + ?Sized,
{
    let lines: Vec<&str> = text.split('\n').map(trim_line_ending).collect();
    let start = find_start(&lines).ok_or(Error::LogFormat)?;
    tracing::debug!(lines = lines.len(), start, "located first timestamped line");

    let mut stats = FilterStats {
        total: lines.len(),
        preamble: start,
        ..FilterStats::default()
    };
    let mut kept: Vec<&str> = Vec::new();
    let mut previous_matched = false;

    for &line in &lines[start..] {
        let (verdict, carry) = classify(line, predicate, previous_matched);
        stats.record(verdict);
        if verdict.is_kept() {
            kept.push(line);
        }
        previous_matched = carry;
    }

    Ok(FilterOutput {
        text: kept.join("\n"),
        stats,
    })
}
