// src/fs/mock.rs

use super::FileSystem;
use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::errors::lock;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockEntry {
    File(Vec<u8>),
    Dir,
}

/// In-memory filesystem for tests.
///
/// Clones share the same underlying tree, so a test can keep one handle for
/// assertions while jobs operate on another.
#[derive(Debug, Clone, Default)]
pub struct MockFileSystem {
    entries: Arc<Mutex<BTreeMap<PathBuf, MockEntry>>>,
}

impl MockFileSystem {
    pub fn new() -> Self {
        let mut entries = BTreeMap::new();
        // Ensure root exists
        entries.insert(PathBuf::from("."), MockEntry::Dir);

        Self {
            entries: Arc::new(Mutex::new(entries)),
        }
    }

    pub fn add_file(&self, path: impl AsRef<Path>, content: impl Into<Vec<u8>>) {
        let path = path.as_ref();
        let mut entries = lock(&self.entries);
        ensure_parent(&mut entries, path);
        entries.insert(path.to_path_buf(), MockEntry::File(content.into()));
    }

    pub fn add_dir(&self, path: impl AsRef<Path>) {
        let mut entries = lock(&self.entries);
        ensure_dir(&mut entries, path.as_ref());
    }

    /// Contents of a file, or `None` for directories and missing paths.
    pub fn contents(&self, path: impl AsRef<Path>) -> Option<Vec<u8>> {
        match lock(&self.entries).get(path.as_ref()) {
            Some(MockEntry::File(content)) => Some(content.clone()),
            _ => None,
        }
    }

    /// All paths currently present, in sorted order.
    pub fn paths(&self) -> Vec<PathBuf> {
        lock(&self.entries).keys().cloned().collect()
    }
}

fn not_found(path: &Path) -> io::Error {
    io::Error::new(io::ErrorKind::NotFound, format!("no such file or directory: {path:?}"))
}

fn ensure_parent(entries: &mut BTreeMap<PathBuf, MockEntry>, path: &Path) {
    if let Some(parent) = path.parent() {
        let parent = if parent.as_os_str().is_empty() {
            Path::new(".")
        } else {
            parent
        };
        ensure_dir(entries, parent);
    }
}

fn ensure_dir(entries: &mut BTreeMap<PathBuf, MockEntry>, path: &Path) {
    if entries.contains_key(path) {
        return;
    }
    entries.insert(path.to_path_buf(), MockEntry::Dir);
    if path.parent().is_some_and(|p| p != path) {
        ensure_parent(entries, path);
    }
}

fn rebase(root: &Path, rel: &Path) -> PathBuf {
    if rel.as_os_str().is_empty() {
        root.to_path_buf()
    } else {
        root.join(rel)
    }
}

/// The entry at `root` plus everything below it, as (relative path, entry).
fn subtree(entries: &BTreeMap<PathBuf, MockEntry>, root: &Path) -> Vec<(PathBuf, MockEntry)> {
    entries
        .iter()
        .filter_map(|(path, entry)| {
            path.strip_prefix(root)
                .ok()
                .map(|rel| (rel.to_path_buf(), entry.clone()))
        })
        .collect()
}

impl FileSystem for MockFileSystem {
    fn exists(&self, path: &Path) -> bool {
        lock(&self.entries).contains_key(path)
    }

    fn is_dir(&self, path: &Path) -> bool {
        matches!(lock(&self.entries).get(path), Some(MockEntry::Dir))
    }

    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        let mut entries = lock(&self.entries);
        if let Some(MockEntry::File(_)) = entries.get(path) {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("file exists: {path:?}"),
            ));
        }
        ensure_dir(&mut entries, path);
        Ok(())
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        let mut entries = lock(&self.entries);
        if !entries.contains_key(from) {
            return Err(not_found(from));
        }
        if entries.contains_key(to) {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("destination exists: {to:?}"),
            ));
        }

        let moved = subtree(&entries, from);
        for (rel, _) in &moved {
            entries.remove(&rebase(from, rel));
        }
        ensure_parent(&mut entries, to);
        for (rel, entry) in moved {
            entries.insert(rebase(to, &rel), entry);
        }
        Ok(())
    }

    fn remove(&self, path: &Path, recursive: bool) -> io::Result<()> {
        let mut entries = lock(&self.entries);
        if !entries.contains_key(path) {
            return Err(not_found(path));
        }

        let doomed = subtree(&entries, path);
        if doomed.len() > 1 && !recursive {
            return Err(io::Error::other(format!(
                "directory not empty: {path:?}"
            )));
        }
        for (rel, _) in doomed {
            entries.remove(&rebase(path, &rel));
        }
        Ok(())
    }

    fn copy(&self, from: &Path, to: &Path) -> io::Result<()> {
        let mut entries = lock(&self.entries);
        if !entries.contains_key(from) {
            return Err(not_found(from));
        }

        let copied = subtree(&entries, from);
        ensure_parent(&mut entries, to);
        for (rel, entry) in copied {
            entries.insert(rebase(to, &rel), entry);
        }
        Ok(())
    }
}
