//! Setup State Resolver and the idempotent Setup Action.
//!
//! The resolver reduces the project's on-disk layout to one of five
//! [`SetupState`]s; [`apply_setup`] then creates exactly the files that state
//! is missing. Running setup any number of times converges on
//! [`SetupState::Valid`] and never overwrites a user's file.

use std::io;
use std::path::PathBuf;

use aexec_common::Error;

use crate::fs::{EntryKind, FileSystem, find_entry};
use crate::paths::{ANON_DIR, ANON_FILE, CONFIG_FILE, LOG_FILE, ProjectLayout};

/// Content of a freshly created `anon.apex`.
pub const ANON_TEMPLATE: &str = "// Write your anonymous apex in this file and run the Execute Anonymous Apex command to run the code from your org.";

/// Content of a freshly created `aexec-config.json`.
pub const DEFAULT_CONFIG_JSON: &str = "{\n\t\"filterKeys\": [\n\t\t\"USER_DEBUG\",\n\t\t\"ERROR\"\n\t]\n}";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SetupState {
    /// Folder, script, and config all present.
    Valid,
    /// Folder present but holds neither file.
    NoFile,
    /// No `anonymous/` folder.
    Empty,
    /// Script present, config missing.
    AnonOnly,
    /// Config present, script missing.
    ConfigOnly,
}

impl SetupState {
    /// The state for a given combination of what exists.
    ///
    /// When the folder is absent the other two flags are meaningless and the
    /// result is always [`SetupState::Empty`].
    pub const fn classify(folder: bool, anon: bool, config: bool) -> Self {
        match (folder, anon, config) {
            (false, _, _) => Self::Empty,
            (true, true, true) => Self::Valid,
            (true, true, false) => Self::AnonOnly,
            (true, false, true) => Self::ConfigOnly,
            (true, false, false) => Self::NoFile,
        }
    }

    pub const fn needs_folder(self) -> bool {
        matches!(self, Self::Empty)
    }

    pub const fn needs_anon(self) -> bool {
        matches!(self, Self::Empty | Self::NoFile | Self::ConfigOnly)
    }

    pub const fn needs_config(self) -> bool {
        matches!(self, Self::Empty | Self::NoFile | Self::AnonOnly)
    }

    pub const fn is_valid(self) -> bool {
        matches!(self, Self::Valid)
    }

    /// What [`apply_setup`] reports having done from this state.
    pub const fn message(self) -> &'static str {
        match self {
            Self::Empty => "A folder \"anonymous\" has been created with all files.",
            Self::NoFile => {
                "An .apex and config file have been created in the \"anonymous\" folder."
            }
            Self::AnonOnly => "A config file has been created in the \"anonymous\" folder.",
            Self::ConfigOnly => "An .apex file has been created in the \"anonymous\" folder.",
            Self::Valid => "File system is already set up properly, no changes made.",
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Valid => "valid",
            Self::NoFile => "no-file",
            Self::Empty => "empty",
            Self::AnonOnly => "anon-only",
            Self::ConfigOnly => "config-only",
        }
    }
}

impl std::fmt::Display for SetupState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the project listing shows under `anonymous/`.
///
/// An entry of any kind counts as present, the same rule the resolver uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProjectInventory {
    pub folder: bool,
    pub anon: bool,
    pub config: bool,
    pub log: bool,
}

impl ProjectInventory {
    pub const fn state(self) -> SetupState {
        SetupState::classify(self.folder, self.anon, self.config)
    }
}

/// List the project root and, if present, `anonymous/`.
///
/// # Errors
///
/// Returns [`Error::FileSystem`] if either listing cannot be read.
pub fn inspect_project<F>(fs: &F, layout: &ProjectLayout) -> Result<ProjectInventory, Error>
where
    F: FileSystem + ?Sized,
{
    let root = fs
        .list_dir(layout.root())
        .map_err(|e| Error::fs(layout.root(), e))?;
    if find_entry(&root, ANON_DIR, Some(EntryKind::Dir)).is_none() {
        return Ok(ProjectInventory::default());
    }

    let anon_dir = layout.anon_dir();
    let listing = fs.list_dir(&anon_dir).map_err(|e| Error::fs(&anon_dir, e))?;
    Ok(ProjectInventory {
        folder: true,
        anon: find_entry(&listing, ANON_FILE, None).is_some(),
        config: find_entry(&listing, CONFIG_FILE, None).is_some(),
        log: find_entry(&listing, LOG_FILE, None).is_some(),
    })
}

/// Classify the project by listing its root and, if present, `anonymous/`.
///
/// # Errors
///
/// Returns [`Error::FileSystem`] if either listing cannot be read.
pub fn resolve_setup_state<F>(fs: &F, layout: &ProjectLayout) -> Result<SetupState, Error>
where
    F: FileSystem + ?Sized,
{
    let inventory = inspect_project(fs, layout)?;
    let state = inventory.state();
    tracing::debug!(
        %state,
        has_anon = inventory.anon,
        has_config = inventory.config,
        "resolved setup state"
    );
    Ok(state)
}

/// What a setup run did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetupOutcome {
    /// The state setup started from.
    pub state: SetupState,
    /// Files actually written, in creation order.
    pub created: Vec<PathBuf>,
}

impl SetupOutcome {
    pub const fn message(&self) -> &'static str {
        self.state.message()
    }
}

/// Create `path` unless something is already there. Returns the path if written.
fn create_if_absent<F>(fs: &F, path: PathBuf, content: &str) -> Result<Option<PathBuf>, Error>
where
    F: FileSystem + ?Sized,
{
    match fs.create_new(&path, content) {
        Ok(()) => {
            tracing::info!(path = %path.display(), "created");
            Ok(Some(path))
        }
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
            tracing::debug!(path = %path.display(), "already present, leaving untouched");
            Ok(None)
        }
        Err(e) => Err(Error::fs(path, e)),
    }
}

/// Create whatever `state` says is missing.
///
/// Files are created with create-new semantics, so a file that appeared
/// after `state` was resolved is left alone. Nothing is rolled back on
/// failure: a later run resolves the new state and finishes the job.
///
/// # Errors
///
/// Returns [`Error::FileSystem`] if the folder or a file cannot be created.
pub fn apply_setup<F>(fs: &F, layout: &ProjectLayout, state: SetupState) -> Result<SetupOutcome, Error>
where
    F: FileSystem + ?Sized,
{
    let mut created = Vec::new();

    if state.needs_folder() {
        let dir = layout.anon_dir();
        fs.create_dir_all(&dir).map_err(|e| Error::fs(&dir, e))?;
    }
    if state.needs_anon() {
        created.extend(create_if_absent(fs, layout.anon_file(), ANON_TEMPLATE)?);
    }
    if state.needs_config() {
        created.extend(create_if_absent(fs, layout.config_file(), DEFAULT_CONFIG_JSON)?);
    }

    Ok(SetupOutcome { state, created })
}

/// Resolve the current state and repair it.
///
/// # Errors
///
/// Returns [`Error::FileSystem`] if resolving or writing fails.
pub fn do_setup<F>(fs: &F, layout: &ProjectLayout) -> Result<SetupOutcome, Error>
where
    F: FileSystem + ?Sized,
{
    let state = resolve_setup_state(fs, layout)?;
    apply_setup(fs, layout, state)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests;
