//! Execution Pipeline: identity → command → filter → `anonymous/log.txt`.
//!
//! [`Pipeline`] owns no I/O of its own. The filesystem, the subprocess runner
//! and the config source are injected, so every stage can be driven in tests
//! without sfdx or a real project on disk.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use aexec_common::Error;
use aexec_filter::filter::{FilterStats, filter_log_with_stats};
use aexec_filter::keywords::KeywordMatcher;

use crate::cancel::CancelToken;
use crate::config::ConfigLoader;
use crate::fs::FileSystem;
use crate::lock::RunLock;
use crate::paths::ProjectLayout;
use crate::runner::{self, CommandRunner, DEFAULT_COMMAND_TEMPLATE};
use crate::setup::{self, ProjectInventory, SetupOutcome, SetupState};

/// Per-invocation knobs for [`Pipeline::execute`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOptions {
    /// Shell command with `{file}` and `{username}` placeholders.
    pub command_template: String,
    /// Also save the unfiltered stdout to `anonymous/raw.log`.
    pub save_raw: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            command_template: DEFAULT_COMMAND_TEMPLATE.to_string(),
            save_raw: false,
        }
    }
}

/// What a successful run produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub output_path: PathBuf,
    pub raw_path: Option<PathBuf>,
    pub stats: FilterStats,
    pub elapsed: Duration,
}

pub struct Pipeline<F, R, C> {
    fs: F,
    runner: R,
    config: C,
    layout: ProjectLayout,
    options: RunOptions,
}

impl<F, R, C> Pipeline<F, R, C>
where
    F: FileSystem,
    R: CommandRunner,
    C: ConfigLoader,
{
    pub const fn new(fs: F, runner: R, config: C, layout: ProjectLayout, options: RunOptions) -> Self {
        Self {
            fs,
            runner,
            config,
            layout,
            options,
        }
    }

    pub const fn layout(&self) -> &ProjectLayout {
        &self.layout
    }

    /// Create whatever part of `anonymous/` is missing.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FileSystem`] if the project cannot be listed or written.
    pub fn setup(&self) -> Result<SetupOutcome, Error> {
        setup::do_setup(&self.fs, &self.layout)
    }

    /// What exists under `anonymous/`, without changing anything.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FileSystem`] if the project cannot be listed.
    pub fn inspect(&self) -> Result<ProjectInventory, Error> {
        setup::inspect_project(&self.fs, &self.layout)
    }

    /// Current setup state, without changing anything.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FileSystem`] if the project cannot be listed.
    pub fn status(&self) -> Result<SetupState, Error> {
        setup::resolve_setup_state(&self.fs, &self.layout)
    }

    /// Run `anon.apex` against the org and write the filtered log.
    ///
    /// `log.txt` is only replaced after every earlier stage succeeded, so on
    /// any error the previous log (if any) is left as it was.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if setup is incomplete, no identity is configured,
    ///   or the filter config is missing or malformed
    /// - [`Error::Busy`] if another run holds the project lock
    /// - [`Error::Execution`] if the command cannot be spawned or exits non-zero
    /// - [`Error::LogFormat`] if the output has no timestamped line
    /// - [`Error::Cancelled`] if `cancel` fires before the log is written
    /// - [`Error::FileSystem`] if the lock or an output file cannot be written
    pub fn execute(&self, cancel: &CancelToken) -> Result<RunReport, Error> {
        let started = Instant::now();

        let state = self.status()?;
        if !state.is_valid() {
            return Err(Error::Config(format!(
                "project is not set up ({state}); run `aexec setup` first"
            )));
        }

        let _lock = RunLock::acquire(&self.fs, self.layout.lock_file())?;

        let username = self.config.load_identity()?;
        let command = runner::render_command(
            &self.options.command_template,
            &self.layout.anon_file(),
            &username,
        );
        tracing::debug!(%username, "executing anonymous apex");

        let result = self.runner.run(&command, cancel)?;
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        if !result.success() {
            return Err(runner::failure_error(&command, &result));
        }

        let raw_path = if self.options.save_raw {
            let path = self.layout.raw_log_file();
            self.fs
                .write_atomic(&path, &result.stdout)
                .map_err(|e| Error::fs(&path, e))?;
            Some(path)
        } else {
            None
        };

        let config = self.config.load_filter_config()?;
        let matcher = KeywordMatcher::from_config(&config);
        if matcher.is_empty() {
            tracing::warn!("filterKeys is empty; the log will be empty");
        }

        let output = filter_log_with_stats(&result.stdout, &matcher)?;

        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let output_path = self.layout.log_file();
        self.fs
            .write_atomic(&output_path, &output.text)
            .map_err(|e| Error::fs(&output_path, e))?;

        let report = RunReport {
            output_path,
            raw_path,
            stats: output.stats,
            elapsed: started.elapsed(),
        };
        tracing::info!(
            kept = report.stats.kept(),
            dropped = report.stats.dropped(),
            elapsed_ms = report.elapsed.as_millis(),
            "wrote filtered log"
        );
        Ok(report)
    }
}
