use std::path::PathBuf;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Every way an aexec invocation can fail.
#[derive(Debug)]
pub enum Error {
    /// A directory listing, read, or write failed.
    FileSystem {
        path: PathBuf,
        source: std::io::Error,
    },
    /// A JSON config file or the org identity is missing or malformed.
    Config(String),
    /// The external command could not be spawned or exited non-zero.
    Execution(String),
    /// The captured output never contained a timestamped line.
    LogFormat,
    /// Another invocation holds the lock at this path.
    Busy(PathBuf),
    /// The invocation was interrupted before anything was written.
    Cancelled,
}

impl Error {
    pub fn fs(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::FileSystem {
            path: path.into(),
            source,
        }
    }

    /// Process exit code the CLI reports for this error.
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::Cancelled => 130,
            _ => 1,
        }
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::FileSystem { path, source } => {
                write!(f, "file system error at {}: {source}", path.display())
            }
            Self::Config(msg) => write!(f, "config error: {msg}"),
            Self::Execution(msg) => write!(f, "execution failed: {msg}"),
            Self::LogFormat => write!(
                f,
                "log format error: no timestamped line found in the command output"
            ),
            Self::Busy(path) => write!(
                f,
                "another run is in progress (lock held at {}); remove the file if no run is active",
                path.display()
            ),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::FileSystem { source, .. } => Some(source),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use std::error::Error as _;

    use super::*;

    #[test]
    fn fs_error_names_path_and_keeps_source() {
        let err = Error::fs(
            "/tmp/project/anonymous",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        let msg = err.to_string();
        assert!(msg.contains("/tmp/project/anonymous"), "got: {msg}");
        assert!(msg.contains("denied"), "got: {msg}");
        assert!(err.source().is_some());
    }

    #[test]
    fn config_error_message() {
        let err = Error::Config("missing field `filterKeys`".to_string());
        assert_eq!(err.to_string(), "config error: missing field `filterKeys`");
        assert!(err.source().is_none());
    }

    #[test]
    fn cancelled_maps_to_sigint_exit_code() {
        assert_eq!(Error::Cancelled.exit_code(), 130);
        assert_eq!(Error::LogFormat.exit_code(), 1);
        assert_eq!(Error::Execution("boom".to_string()).exit_code(), 1);
    }

    #[test]
    fn busy_mentions_lock_path() {
        let err = Error::Busy(PathBuf::from("anonymous/.aexec.lock"));
        assert!(err.to_string().contains("anonymous/.aexec.lock"));
    }
}
