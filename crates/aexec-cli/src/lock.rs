use std::io;
use std::path::{Path, PathBuf};

use aexec_common::Error;

use crate::fs::FileSystem;

/// Exclusive per-project run lock, held for as long as the guard lives.
///
/// The lock is a file created with create-new semantics and holding the
/// owner's pid; dropping the guard removes it. A lock whose pid is no longer
/// running (the owner was SIGKILLed or exited on a second signal) is stale and
/// is taken over.
#[derive(Debug)]
pub struct RunLock<'a, F: FileSystem + ?Sized> {
    fs: &'a F,
    path: PathBuf,
}

/// Whether `pid` names a running process, if that can be determined.
#[cfg(unix)]
fn pid_is_alive(pid: u32) -> Option<bool> {
    use nix::errno::Errno;
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    let raw = i32::try_from(pid).ok().filter(|p| *p > 0)?;
    match kill(Pid::from_raw(raw), None) {
        Ok(()) | Err(Errno::EPERM) => Some(true),
        Err(Errno::ESRCH) => Some(false),
        Err(_) => None,
    }
}

#[cfg(not(unix))]
fn pid_is_alive(_pid: u32) -> Option<bool> {
    None
}

fn owner_pid(content: &str) -> Option<u32> {
    content.trim().parse().ok()
}

impl<'a, F: FileSystem + ?Sized> RunLock<'a, F> {
    /// # Errors
    ///
    /// Returns [`Error::Busy`] if a live process holds the lock (or its owner
    /// cannot be determined), or [`Error::FileSystem`] if it cannot be created.
    pub fn acquire(fs: &'a F, path: impl Into<PathBuf>) -> Result<Self, Error> {
        let path = path.into();
        match Self::try_create(fs, &path) {
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                if !Self::remove_if_stale(fs, &path)? {
                    return Err(Error::Busy(path));
                }
                match Self::try_create(fs, &path) {
                    Ok(()) => {}
                    Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                        return Err(Error::Busy(path));
                    }
                    Err(e) => return Err(Error::fs(path, e)),
                }
            }
            Err(e) => return Err(Error::fs(path, e)),
            Ok(()) => {}
        }
        tracing::debug!(path = %path.display(), "acquired run lock");
        Ok(Self { fs, path })
    }

    fn try_create(fs: &F, path: &Path) -> io::Result<()> {
        fs.create_new(path, &format!("{}\n", std::process::id()))
    }

    /// Remove the lock at `path` if its owner is known to be dead.
    fn remove_if_stale(fs: &F, path: &Path) -> Result<bool, Error> {
        let content = match fs.read_to_string(path) {
            Ok(c) => c,
            // released between our create and this read
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(true),
            Err(e) => return Err(Error::fs(path, e)),
        };
        let Some(pid) = owner_pid(&content) else {
            return Ok(false);
        };
        if pid == std::process::id() || pid_is_alive(pid) != Some(false) {
            return Ok(false);
        }
        // Another process may have replaced the stale lock meanwhile.
        if fs.read_to_string(path).ok().as_deref() != Some(content.as_str()) {
            return Ok(false);
        }
        tracing::warn!(path = %path.display(), pid, "removing stale run lock");
        match fs.remove_file(path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(true),
            Err(e) => Err(Error::fs(path, e)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl<F: FileSystem + ?Sized> Drop for RunLock<'_, F> {
    fn drop(&mut self) {
        if let Err(e) = self.fs.remove_file(&self.path) {
            tracing::warn!(path = %self.path.display(), error = %e, "failed to release run lock");
        }
    }
}
