//! Filesystem access for setup, config, and log persistence.
//!
//! Everything the core touches on disk goes through [`FileSystem`] so the
//! setup resolver and the pipeline can run against [`OsFs`] in production and
//! an in-memory tree in tests.

#[cfg(test)]
pub mod memory;

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// What a directory entry is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Dir,
    Other,
}

/// One entry of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub kind: EntryKind,
}

impl DirEntry {
    pub fn new(name: impl Into<String>, kind: EntryKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

/// The entries of one directory, in listing order.
pub type DirectoryListing = Vec<DirEntry>;

/// Find the first entry called `name`, optionally requiring a kind.
pub fn find_entry<'a>(
    listing: &'a [DirEntry],
    name: &str,
    kind: Option<EntryKind>,
) -> Option<&'a DirEntry> {
    listing
        .iter()
        .find(|e| e.name == name && kind.is_none_or(|k| e.kind == k))
}

pub trait FileSystem {
    /// List the direct children of `path`.
    fn list_dir(&self, path: &Path) -> io::Result<DirectoryListing>;

    fn read_to_string(&self, path: &Path) -> io::Result<String>;

    fn create_dir_all(&self, path: &Path) -> io::Result<()>;

    /// Create `path` with `content`. Fails with [`io::ErrorKind::AlreadyExists`]
    /// instead of touching a file that is already there.
    fn create_new(&self, path: &Path, content: &str) -> io::Result<()>;

    /// Replace `path` with `content` so readers never observe a partial file.
    fn write_atomic(&self, path: &Path, content: &str) -> io::Result<()>;

    fn remove_file(&self, path: &Path) -> io::Result<()>;
}

impl<T: FileSystem + ?Sized> FileSystem for &T {
    fn list_dir(&self, path: &Path) -> io::Result<DirectoryListing> {
        (**self).list_dir(path)
    }

    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        (**self).read_to_string(path)
    }

    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        (**self).create_dir_all(path)
    }

    fn create_new(&self, path: &Path, content: &str) -> io::Result<()> {
        (**self).create_new(path, content)
    }

    fn write_atomic(&self, path: &Path, content: &str) -> io::Result<()> {
        (**self).write_atomic(path, content)
    }

    fn remove_file(&self, path: &Path) -> io::Result<()> {
        (**self).remove_file(path)
    }
}

/// The real filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsFs;

/// Sibling path used while writing `path` atomically: `dir/.name.tmp`.
fn temp_path_for(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map_or_else(|| "out".into(), |n| n.to_string_lossy());
    path.with_file_name(format!(".{name}.tmp"))
}

impl FileSystem for OsFs {
    fn list_dir(&self, path: &Path) -> io::Result<DirectoryListing> {
        let mut listing = Vec::new();
        for entry in fs::read_dir(path)? {
            let entry = entry?;
            let file_type = entry.file_type()?;
            let kind = if file_type.is_dir() {
                EntryKind::Dir
            } else if file_type.is_file() {
                EntryKind::File
            } else {
                EntryKind::Other
            };
            listing.push(DirEntry::new(entry.file_name().to_string_lossy(), kind));
        }
        // read_dir order is platform-defined
        listing.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(listing)
    }

    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        fs::read_to_string(path)
    }

    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        fs::create_dir_all(path)
    }

    fn create_new(&self, path: &Path, content: &str) -> io::Result<()> {
        let mut file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)?;
        file.write_all(content.as_bytes())?;
        file.flush()
    }

    fn write_atomic(&self, path: &Path, content: &str) -> io::Result<()> {
        let tmp = temp_path_for(path);
        let written = fs::write(&tmp, content).and_then(|()| fs::rename(&tmp, path));
        if written.is_err() {
            let _ = fs::remove_file(&tmp);
        }
        written
    }

    fn remove_file(&self, path: &Path) -> io::Result<()> {
        fs::remove_file(path)
    }
}
