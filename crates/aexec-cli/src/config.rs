use std::path::{Path, PathBuf};

use aexec_common::Error;
use aexec_common::config::types::{FilterConfig, OrgConfig};

use crate::fs::FileSystem;
use crate::paths::{self, ProjectLayout};

/// Source of the two pieces of configuration a run needs.
pub trait ConfigLoader {
    /// The username (or alias) of the org to execute against.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when no identity is configured or the config
    /// holding it is malformed.
    fn load_identity(&self) -> Result<String, Error>;

    /// The keyword list from `anonymous/aexec-config.json`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when the file is missing or has the wrong shape.
    fn load_filter_config(&self) -> Result<FilterConfig, Error>;
}

/// Reads JSON config files from the project and the user's home directory.
///
/// Identity priority:
///   1. explicit target org (`--target-org` / `AEXEC_TARGET_ORG`)
///   2. `{project}/.sfdx/sfdx-config.json` `defaultusername`
///   3. `~/.sfdx/sfdx-config.json` `defaultusername`
#[derive(Debug, Clone)]
pub struct JsonConfigLoader<F> {
    fs: F,
    layout: ProjectLayout,
    target_org: Option<String>,
    global_org_config: Option<PathBuf>,
}

/// Read `path`, returning `Ok(None)` when it does not exist.
fn read_optional<F: FileSystem + ?Sized>(fs: &F, path: &Path) -> Result<Option<String>, Error> {
    match fs.read_to_string(path) {
        Ok(c) => Ok(Some(c)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(Error::fs(path, e)),
    }
}

/// Prefix a config error with the file it came from.
fn in_file(path: &Path, err: Error) -> Error {
    match err {
        Error::Config(msg) => Error::Config(format!("{}: {msg}", path.display())),
        other => other,
    }
}

impl<F: FileSystem> JsonConfigLoader<F> {
    pub fn new(fs: F, layout: ProjectLayout, target_org: Option<String>) -> Self {
        Self {
            fs,
            layout,
            target_org,
            global_org_config: paths::global_org_config(),
        }
    }

    /// Override (or disable) the user-level sfdx config location.
    #[must_use]
    pub fn with_global_org_config(mut self, path: Option<PathBuf>) -> Self {
        self.global_org_config = path;
        self
    }

    fn username_from(&self, path: &Path) -> Result<Option<String>, Error> {
        let Some(content) = read_optional(&self.fs, path)? else {
            return Ok(None);
        };
        let cfg = OrgConfig::from_json(&content).map_err(|e| in_file(path, e))?;
        Ok(cfg.username().map(ToString::to_string))
    }
}

impl<F: FileSystem> ConfigLoader for JsonConfigLoader<F> {
    fn load_identity(&self) -> Result<String, Error> {
        if let Some(org) = self.target_org.as_deref().map(str::trim)
            && !org.is_empty()
        {
            tracing::debug!(org, "using explicit target org");
            return Ok(org.to_string());
        }

        let project = self.layout.org_config_file();
        if let Some(username) = self.username_from(&project)? {
            tracing::debug!(source = %project.display(), "resolved default username");
            return Ok(username);
        }

        if let Some(ref global) = self.global_org_config
            && let Some(username) = self.username_from(global)?
        {
            tracing::debug!(source = %global.display(), "resolved default username");
            return Ok(username);
        }

        Err(Error::Config(format!(
            "no default username: set `defaultusername` in {} or pass --target-org",
            self.layout.display_relative(&project)
        )))
    }

    fn load_filter_config(&self) -> Result<FilterConfig, Error> {
        let path = self.layout.config_file();
        let content = read_optional(&self.fs, &path)?.ok_or_else(|| {
            Error::Config(format!(
                "filter config not found at {}; run `aexec setup` first",
                self.layout.display_relative(&path)
            ))
        })?;
        FilterConfig::from_json(&content).map_err(|e| in_file(&path, e))
    }
}
