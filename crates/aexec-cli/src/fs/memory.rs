//! In-memory [`FileSystem`] for unit tests.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::io;
use std::path::{Path, PathBuf};

use super::{DirEntry, DirectoryListing, EntryKind, FileSystem};

#[derive(Debug, Default)]
pub struct MemoryFs {
    dirs: RefCell<BTreeSet<PathBuf>>,
    files: RefCell<BTreeMap<PathBuf, String>>,
    failing: RefCell<HashSet<PathBuf>>,
}

fn not_found(path: &Path) -> io::Error {
    io::Error::new(io::ErrorKind::NotFound, format!("{} not found", path.display()))
}

impl MemoryFs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_dir(self, path: impl AsRef<Path>) -> Self {
        let _ = self.create_dir_all(path.as_ref());
        self
    }

    /// Add a file, creating its parent directories.
    pub fn with_file(self, path: impl AsRef<Path>, content: &str) -> Self {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            let _ = self.create_dir_all(parent);
        }
        self.files
            .borrow_mut()
            .insert(path.to_path_buf(), content.to_string());
        self
    }

    /// Make every subsequent write to `path` fail with `PermissionDenied`.
    pub fn fail_writes_to(&self, path: impl AsRef<Path>) {
        self.failing.borrow_mut().insert(path.as_ref().to_path_buf());
    }

    pub fn file(&self, path: impl AsRef<Path>) -> Option<String> {
        self.files.borrow().get(path.as_ref()).cloned()
    }

    pub fn exists(&self, path: impl AsRef<Path>) -> bool {
        let path = path.as_ref();
        self.files.borrow().contains_key(path) || self.dirs.borrow().contains(path)
    }

    /// Every file path and its content, for before/after comparisons.
    pub fn snapshot(&self) -> BTreeMap<PathBuf, String> {
        self.files.borrow().clone()
    }

    fn check_writable(&self, path: &Path) -> io::Result<()> {
        if self.failing.borrow().contains(path) {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                format!("{} is read-only", path.display()),
            ));
        }
        match path.parent() {
            Some(parent) if !self.dirs.borrow().contains(parent) => Err(not_found(parent)),
            _ => Ok(()),
        }
    }
}

impl FileSystem for MemoryFs {
    fn list_dir(&self, path: &Path) -> io::Result<DirectoryListing> {
        if !self.dirs.borrow().contains(path) {
            return Err(not_found(path));
        }
        let child_name = |p: &Path| {
            (p.parent() == Some(path))
                .then(|| p.file_name().map(|n| n.to_string_lossy().into_owned()))
                .flatten()
        };
        let mut listing: Vec<DirEntry> = self
            .dirs
            .borrow()
            .iter()
            .filter_map(|d| child_name(d).map(|n| DirEntry::new(n, EntryKind::Dir)))
            .collect();
        listing.extend(
            self.files
                .borrow()
                .keys()
                .filter_map(|f| child_name(f).map(|n| DirEntry::new(n, EntryKind::File))),
        );
        listing.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(listing)
    }

    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        self.file(path).ok_or_else(|| not_found(path))
    }

    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        if self.files.borrow().contains_key(path) {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("{} is a file", path.display()),
            ));
        }
        let mut dirs = self.dirs.borrow_mut();
        for ancestor in path.ancestors() {
            if !ancestor.as_os_str().is_empty() {
                dirs.insert(ancestor.to_path_buf());
            }
        }
        Ok(())
    }

    fn create_new(&self, path: &Path, content: &str) -> io::Result<()> {
        self.check_writable(path)?;
        if self.exists(path) {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("{} already exists", path.display()),
            ));
        }
        self.files
            .borrow_mut()
            .insert(path.to_path_buf(), content.to_string());
        Ok(())
    }

    fn write_atomic(&self, path: &Path, content: &str) -> io::Result<()> {
        self.check_writable(path)?;
        self.files
            .borrow_mut()
            .insert(path.to_path_buf(), content.to_string());
        Ok(())
    }

    fn remove_file(&self, path: &Path) -> io::Result<()> {
        self.files
            .borrow_mut()
            .remove(path)
            .map(|_| ())
            .ok_or_else(|| not_found(path))
    }
}
