use serde::{Deserialize, Serialize};

use crate::Error;

/// Keywords written to a freshly created `aexec-config.json`.
pub const DEFAULT_FILTER_KEYS: [&str; 2] = ["USER_DEBUG", "ERROR"];

/// Project filter configuration, deserialized from `anonymous/aexec-config.json`.
///
/// ```json
/// {
///     "filterKeys": ["USER_DEBUG", "ERROR"]
/// }
/// ```
///
/// Any other top-level field, or a non-string key, is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FilterConfig {
    /// Literal substrings; a log line is signal when it contains any of them.
    #[serde(rename = "filterKeys")]
    pub filter_keys: Vec<String>,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            filter_keys: DEFAULT_FILTER_KEYS.iter().map(ToString::to_string).collect(),
        }
    }
}

impl FilterConfig {
    /// Parse and validate a config document.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when the JSON is malformed or does not have
    /// the shape `{"filterKeys": [string, ...]}`.
    pub fn from_json(content: &str) -> Result<Self, Error> {
        serde_json::from_str(content).map_err(|e| Error::Config(format!("invalid filter config: {e}")))
    }
}

/// The subset of the sfdx project config (`.sfdx/sfdx-config.json`) aexec reads.
///
/// sfdx stores many unrelated keys in this file, so unknown fields are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct OrgConfig {
    #[serde(rename = "defaultusername")]
    pub default_username: Option<String>,
}

impl OrgConfig {
    /// # Errors
    ///
    /// Returns [`Error::Config`] when the document is not a JSON object or
    /// `defaultusername` is not a string.
    pub fn from_json(content: &str) -> Result<Self, Error> {
        serde_json::from_str(content).map_err(|e| Error::Config(format!("invalid sfdx config: {e}")))
    }

    /// The configured username, ignoring blank values.
    pub fn username(&self) -> Option<&str> {
        self.default_username
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
    }
}
