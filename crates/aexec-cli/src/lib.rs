pub mod cancel;
pub mod config;
pub mod fs;
pub mod lock;
pub mod paths;
pub mod pipeline;
pub mod runner;
pub mod setup;

// Re-export the filter engine so the binary and tests can use `aexec::filter::*`.
pub use aexec_filter::filter;
pub use aexec_filter::keywords;

pub use aexec_common::{Error, Result};
