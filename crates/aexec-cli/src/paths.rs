//! Project layout and directory resolution.
//!
//! Everything aexec reads or writes lives under `{project}/anonymous/`:
//!
//! ```text
//! anonymous/anon.apex          script body, passed to sfdx
//! anonymous/aexec-config.json  {"filterKeys": [...]}
//! anonymous/log.txt            filtered output, replaced every run
//! anonymous/raw.log            unfiltered output (only with --raw)
//! anonymous/.aexec.lock        present while a run is in progress
//! ```
//!
//! The org identity comes from `{project}/.sfdx/sfdx-config.json`, falling
//! back to the user-level `~/.sfdx/sfdx-config.json`.

use std::path::{Path, PathBuf};

pub const ANON_DIR: &str = "anonymous";
pub const ANON_FILE: &str = "anon.apex";
pub const CONFIG_FILE: &str = "aexec-config.json";
pub const LOG_FILE: &str = "log.txt";
pub const RAW_LOG_FILE: &str = "raw.log";
pub const LOCK_FILE: &str = ".aexec.lock";
pub const SFDX_DIR: &str = ".sfdx";
pub const SFDX_CONFIG_FILE: &str = "sfdx-config.json";
pub const SFDX_PROJECT_FILE: &str = "sfdx-project.json";

/// Absolute locations of every file aexec touches in one project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectLayout {
    root: PathBuf,
}

impl ProjectLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn anon_dir(&self) -> PathBuf {
        self.root.join(ANON_DIR)
    }

    pub fn anon_file(&self) -> PathBuf {
        self.anon_dir().join(ANON_FILE)
    }

    pub fn config_file(&self) -> PathBuf {
        self.anon_dir().join(CONFIG_FILE)
    }

    pub fn log_file(&self) -> PathBuf {
        self.anon_dir().join(LOG_FILE)
    }

    pub fn raw_log_file(&self) -> PathBuf {
        self.anon_dir().join(RAW_LOG_FILE)
    }

    pub fn lock_file(&self) -> PathBuf {
        self.anon_dir().join(LOCK_FILE)
    }

    pub fn org_config_file(&self) -> PathBuf {
        self.root.join(SFDX_DIR).join(SFDX_CONFIG_FILE)
    }

    /// `path` relative to the project root, with `/` separators, for messages.
    pub fn display_relative(&self, path: &Path) -> String {
        let Ok(rel) = path.strip_prefix(&self.root) else {
            return path.display().to_string();
        };
        rel.components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/")
    }
}

/// Walk up from `dir` to the nearest ancestor that looks like an sfdx project:
/// one containing `sfdx-project.json`, `.sfdx/`, or `anonymous/`.
/// Falls back to `dir` itself if none is found.
pub fn project_root_for(dir: &Path) -> PathBuf {
    let mut current = dir.to_path_buf();
    loop {
        if current.join(SFDX_PROJECT_FILE).is_file()
            || current.join(SFDX_DIR).is_dir()
            || current.join(ANON_DIR).is_dir()
        {
            return current;
        }
        if !current.pop() {
            break;
        }
    }
    dir.to_path_buf()
}

/// The user-level sfdx config, `~/.sfdx/sfdx-config.json`.
pub fn global_org_config() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(SFDX_DIR).join(SFDX_CONFIG_FILE))
}
