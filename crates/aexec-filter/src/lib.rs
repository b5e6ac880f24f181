pub mod filter;
pub mod keywords;

/// The captured result of running the external command.
///
/// Holds only the data the pipeline needs downstream; spawning and waiting
/// live in the CLI crate's `runner` module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionResult {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl ExecutionResult {
    pub const fn success(&self) -> bool {
        self.exit_code == 0
    }
}
