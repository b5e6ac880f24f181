//! Keyword predicates: decide whether a single log line is signal.
//!
//! Keywords are literal, case-sensitive substrings. Regex metacharacters in a
//! keyword carry no special meaning (`"a.b"` only matches the text `a.b`).

use aexec_common::config::types::FilterConfig;

/// A stateless `line -> bool` test applied by the log filter.
pub trait LinePredicate {
    fn matches(&self, line: &str) -> bool;
}

impl<F> LinePredicate for F
where
    F: Fn(&str) -> bool,
{
    fn matches(&self, line: &str) -> bool {
        self(line)
    }
}

/// Matches a line when it contains at least one keyword.
///
/// Keywords are tried in configuration order and the first hit wins.
/// A matcher with no keywords matches nothing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeywordMatcher {
    keys: Vec<String>,
}

impl KeywordMatcher {
    /// Build a matcher from an ordered keyword list.
    ///
    /// An empty keyword is a substring of every line, so it makes the filter a
    /// passthrough; that is logged but honored.
    pub fn new<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let keys: Vec<String> = keys.into_iter().map(Into::into).collect();
        if keys.iter().any(String::is_empty) {
            tracing::warn!("filter keyword list contains \"\"; every line will match");
        }
        Self { keys }
    }

    pub fn from_config(config: &FilterConfig) -> Self {
        Self::new(config.filter_keys.iter().map(String::as_str))
    }

    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    pub const fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl LinePredicate for KeywordMatcher {
    fn matches(&self, line: &str) -> bool {
        self.keys.iter().any(|k| line.contains(k.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn default_matcher() -> KeywordMatcher {
        KeywordMatcher::new(["USER_DEBUG", "ERROR"])
    }

    #[test]
    fn matches_either_keyword_anywhere() {
        let m = default_matcher();
        assert!(m.matches("09:10:11.123 (4)|USER_DEBUG|[1]|DEBUG|hello"));
        assert!(m.matches("ERROR at start"));
        assert!(m.matches("trailing FATAL_ERROR"));
    }

    #[test]
    fn rejects_line_without_keywords() {
        let m = default_matcher();
        assert!(!m.matches("09:10:12.000 (5)|SOQL_EXECUTE_BEGIN|[2]"));
        assert!(!m.matches(""));
    }

    #[test]
    fn is_case_sensitive() {
        let m = default_matcher();
        assert!(!m.matches("user_debug lowercase"));
        assert!(!m.matches("Error: mixed case"));
    }

    #[test]
    fn empty_keyword_list_matches_nothing() {
        let m = KeywordMatcher::new(Vec::<String>::new());
        assert!(m.is_empty());
        assert!(!m.matches("anything"));
        assert!(!m.matches(""));
    }

    #[test]
    fn empty_keyword_matches_every_line() {
        let m = KeywordMatcher::new(["", "ERROR"]);
        assert_eq!(m.keys(), ["", "ERROR"]);
        assert!(!m.is_empty());
        assert!(m.matches("plain line"));
        assert!(m.matches(""));
    }

    #[test]
    fn only_empty_keyword_is_passthrough() {
        let m = KeywordMatcher::new([""]);
        assert!(!m.is_empty());
        assert!(m.matches("line"));
    }

    #[test]
    fn metacharacters_are_literal() {
        let m = KeywordMatcher::new(["a.b", "x|y", "(*)"]);
        assert!(m.matches("value a.b here"));
        assert!(!m.matches("value axb here"));
        assert!(m.matches("pipe x|y"));
        assert!(!m.matches("only x"));
        assert!(m.matches("group (*)"));
    }

    #[test]
    fn keeps_configuration_order() {
        let m = KeywordMatcher::new(["B", "A", "C"]);
        assert_eq!(m.keys(), ["B", "A", "C"]);
    }

    #[test]
    fn from_config_uses_filter_keys() {
        let m = KeywordMatcher::from_config(&FilterConfig::default());
        assert_eq!(m.keys(), ["USER_DEBUG", "ERROR"]);
    }

    #[test]
    fn closures_are_predicates() {
        let starts_with_hash = |line: &str| line.starts_with('#');
        assert!(starts_with_hash.matches("# heading"));
        assert!(!starts_with_hash.matches("body"));
    }
}
