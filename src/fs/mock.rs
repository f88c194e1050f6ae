// src/fs/mock.rs

use super::FileSystem;
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone)]
pub enum MockEntry {
    File(Vec<u8>),
    Dir(Vec<String>), // List of child names
}

/// In-memory filesystem for tests.
///
/// Paths are used verbatim as keys; tests should stick to one style
/// (relative or absolute) per instance.
#[derive(Debug, Clone, Default)]
pub struct MockFileSystem {
    files: Arc<Mutex<HashMap<PathBuf, MockEntry>>>,
}

fn parent_of(path: &Path) -> Option<&Path> {
    match path.parent() {
        Some(p) if p.as_os_str().is_empty() => Some(Path::new(".")),
        other => other,
    }
}

fn child_name(path: &Path) -> Option<String> {
    path.file_name().and_then(|n| n.to_str()).map(str::to_string)
}

impl MockFileSystem {
    pub fn new() -> Self {
        let mut files = HashMap::new();
        // Ensure root exists
        files.insert(PathBuf::from("."), MockEntry::Dir(Vec::new()));

        Self {
            files: Arc::new(Mutex::new(files)),
        }
    }

    /// Add a file, creating parent directories implicitly.
    pub fn add_file(&self, path: impl AsRef<Path>, content: impl Into<Vec<u8>>) {
        let path = path.as_ref().to_path_buf();
        let mut files = self.files.lock().unwrap();
        if let Some(parent) = parent_of(&path) {
            let _ = Self::ensure_dir_entry(&mut files, parent);
        }
        Self::link_child(&mut files, &path);
        files.insert(path, MockEntry::File(content.into()));
    }

    /// Number of entries (files and directories) under `root`, itself included.
    pub fn count_under(&self, root: impl AsRef<Path>) -> usize {
        let root = root.as_ref();
        let files = self.files.lock().unwrap();
        files.keys().filter(|p| p.starts_with(root)).count()
    }

    fn link_child(files: &mut HashMap<PathBuf, MockEntry>, path: &Path) {
        let (Some(parent), Some(name)) = (parent_of(path), child_name(path)) else {
            return;
        };
        if let Some(MockEntry::Dir(children)) = files.get_mut(parent) {
            if !children.contains(&name) {
                children.push(name);
            }
        }
    }

    fn unlink_child(files: &mut HashMap<PathBuf, MockEntry>, path: &Path) {
        let (Some(parent), Some(name)) = (parent_of(path), child_name(path)) else {
            return;
        };
        if let Some(MockEntry::Dir(children)) = files.get_mut(parent) {
            children.retain(|c| *c != name);
        }
    }

    fn ensure_dir_entry(files: &mut HashMap<PathBuf, MockEntry>, path: &Path) -> io::Result<()> {
        match files.get(path) {
            Some(MockEntry::Dir(_)) => return Ok(()),
            Some(MockEntry::File(_)) => {
                return Err(io::Error::new(
                    io::ErrorKind::NotADirectory,
                    format!("not a directory: {path:?}"),
                ));
            }
            None => {}
        }

        if let Some(parent) = parent_of(path) {
            if parent != path {
                // Avoid infinite loop at root
                Self::ensure_dir_entry(files, parent)?;
            }
        }
        files.insert(path.to_path_buf(), MockEntry::Dir(Vec::new()));
        Self::link_child(files, path);
        Ok(())
    }
}

fn not_found(path: &Path) -> io::Error {
    io::Error::new(io::ErrorKind::NotFound, format!("not found: {path:?}"))
}

impl FileSystem for MockFileSystem {
    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        let files = self.files.lock().unwrap();
        match files.get(path) {
            Some(MockEntry::File(content)) => Ok(content.clone()),
            Some(MockEntry::Dir(_)) => Err(io::Error::new(
                io::ErrorKind::IsADirectory,
                format!("is a directory: {path:?}"),
            )),
            None => Err(not_found(path)),
        }
    }

    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        let files = self.files.lock().unwrap();
        match files.get(path) {
            Some(MockEntry::File(content)) => String::from_utf8(content.clone())
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e)),
            Some(MockEntry::Dir(_)) => Err(io::Error::new(
                io::ErrorKind::IsADirectory,
                format!("is a directory: {path:?}"),
            )),
            None => Err(not_found(path)),
        }
    }

    fn write(&self, path: &Path, contents: &[u8]) -> io::Result<()> {
        let mut files = self.files.lock().unwrap();
        if let Some(parent) = parent_of(path) {
            Self::ensure_dir_entry(&mut files, parent)?;
        }
        if matches!(files.get(path), Some(MockEntry::Dir(_))) {
            return Err(io::Error::new(
                io::ErrorKind::IsADirectory,
                format!("is a directory: {path:?}"),
            ));
        }
        Self::link_child(&mut files, path);
        files.insert(path.to_path_buf(), MockEntry::File(contents.to_vec()));
        Ok(())
    }

    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        let mut files = self.files.lock().unwrap();
        Self::ensure_dir_entry(&mut files, path)
    }

    fn exists(&self, path: &Path) -> bool {
        let files = self.files.lock().unwrap();
        files.contains_key(path)
    }

    fn is_file(&self, path: &Path) -> bool {
        let files = self.files.lock().unwrap();
        matches!(files.get(path), Some(MockEntry::File(_)))
    }

    fn is_dir(&self, path: &Path) -> bool {
        let files = self.files.lock().unwrap();
        matches!(files.get(path), Some(MockEntry::Dir(_)))
    }

    fn read_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>> {
        let files = self.files.lock().unwrap();
        match files.get(path) {
            Some(MockEntry::Dir(children)) => {
                Ok(children.iter().map(|name| path.join(name)).collect())
            }
            Some(MockEntry::File(_)) => Err(io::Error::new(
                io::ErrorKind::NotADirectory,
                format!("not a directory: {path:?}"),
            )),
            None => Err(not_found(path)),
        }
    }

    fn remove_dir_all(&self, path: &Path) -> io::Result<()> {
        let mut files = self.files.lock().unwrap();
        if !matches!(files.get(path), Some(MockEntry::Dir(_))) {
            return Err(not_found(path));
        }
        files.retain(|p, _| !p.starts_with(path));
        Self::unlink_child(&mut files, path);
        Ok(())
    }

    fn remove_dir(&self, path: &Path) -> io::Result<()> {
        let mut files = self.files.lock().unwrap();
        match files.get(path) {
            Some(MockEntry::Dir(children)) if children.is_empty() => {
                files.remove(path);
                Self::unlink_child(&mut files, path);
                Ok(())
            }
            Some(MockEntry::Dir(_)) => Err(io::Error::new(
                io::ErrorKind::DirectoryNotEmpty,
                format!("directory not empty: {path:?}"),
            )),
            Some(MockEntry::File(_)) => Err(io::Error::new(
                io::ErrorKind::NotADirectory,
                format!("not a directory: {path:?}"),
            )),
            None => Err(not_found(path)),
        }
    }
}
