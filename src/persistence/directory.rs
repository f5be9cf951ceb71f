//! Storage backends for snapshots.
//!
//! Snapshot writers and readers only see the [`Directory`] trait, so the same code persists
//! to disk ([`FsDirectory`]) or to memory ([`MemoryDirectory`], handy in tests and for
//! shipping snapshots over a wire).

use std::collections::HashMap;
use std::fs;
use std::io::{BufReader, BufWriter, Cursor, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::persistence::error::{PersistenceError, PersistenceResult};

/// Filesystem-like directory abstraction.
pub trait Directory: Send + Sync {
    /// Create (or truncate) a file for writing.
    fn create_file(&self, path: &str) -> PersistenceResult<Box<dyn Write>>;
    fn open_file(&self, path: &str) -> PersistenceResult<Box<dyn Read>>;
    fn exists(&self, path: &str) -> bool;
    fn delete(&self, path: &str) -> PersistenceResult<()>;
    fn create_dir_all(&self, path: &str) -> PersistenceResult<()>;
    /// Replace `path` with `data` so readers see either the old or the new content.
    fn atomic_write(&self, path: &str, data: &[u8]) -> PersistenceResult<()>;
    fn file_path(&self, path: &str) -> Option<PathBuf>;

    /// Read a whole file into memory.
    fn read_all(&self, path: &str) -> PersistenceResult<Vec<u8>> {
        let mut buf = Vec::new();
        self.open_file(path)?.read_to_end(&mut buf)?;
        Ok(buf)
    }
}

/// In-memory directory. Clones share the same files.
#[derive(Debug, Default, Clone)]
pub struct MemoryDirectory {
    files: Arc<RwLock<HashMap<String, Vec<u8>>>>,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Paths currently stored, sorted.
    pub fn paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.files.read().keys().cloned().collect();
        paths.sort();
        paths
    }

    /// Overwrite a file's bytes directly.
    pub fn put(&self, path: &str, data: Vec<u8>) {
        self.files.write().insert(path.to_string(), data);
    }
}

/// Writer appending straight into a [`MemoryDirectory`] entry.
struct MemoryFile {
    path: String,
    files: Arc<RwLock<HashMap<String, Vec<u8>>>>,
}

impl Write for MemoryFile {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.files
            .write()
            .entry(self.path.clone())
            .or_default()
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl Directory for MemoryDirectory {
    fn create_file(&self, path: &str) -> PersistenceResult<Box<dyn Write>> {
        self.files.write().insert(path.to_string(), Vec::new());
        Ok(Box::new(MemoryFile {
            path: path.to_string(),
            files: Arc::clone(&self.files),
        }))
    }

    fn open_file(&self, path: &str) -> PersistenceResult<Box<dyn Read>> {
        let data = self
            .files
            .read()
            .get(path)
            .cloned()
            .ok_or_else(|| PersistenceError::NotFound(path.to_string()))?;
        Ok(Box::new(Cursor::new(data)))
    }

    fn exists(&self, path: &str) -> bool {
        self.files.read().contains_key(path)
    }

    fn delete(&self, path: &str) -> PersistenceResult<()> {
        self.files.write().remove(path);
        Ok(())
    }

    fn create_dir_all(&self, _path: &str) -> PersistenceResult<()> {
        Ok(())
    }

    fn atomic_write(&self, path: &str, data: &[u8]) -> PersistenceResult<()> {
        self.put(path, data.to_vec());
        Ok(())
    }

    fn file_path(&self, _path: &str) -> Option<PathBuf> {
        None
    }
}

/// Directory rooted at a filesystem path.
#[derive(Debug, Clone)]
pub struct FsDirectory {
    root: PathBuf,
}

impl FsDirectory {
    /// Open `root`, creating it if needed.
    pub fn new(root: impl Into<PathBuf>) -> PersistenceResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> PathBuf {
        self.root.join(path)
    }
}

impl Directory for FsDirectory {
    fn create_file(&self, path: &str) -> PersistenceResult<Box<dyn Write>> {
        let full = self.resolve(path);
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent)?;
        }
        Ok(Box::new(BufWriter::new(fs::File::create(full)?)))
    }

    fn open_file(&self, path: &str) -> PersistenceResult<Box<dyn Read>> {
        let full = self.resolve(path);
        match fs::File::open(&full) {
            Ok(f) => Ok(Box::new(BufReader::new(f))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(PersistenceError::NotFound(full.display().to_string()))
            }
            Err(e) => Err(PersistenceError::Io(e)),
        }
    }

    fn exists(&self, path: &str) -> bool {
        self.resolve(path).exists()
    }

    fn delete(&self, path: &str) -> PersistenceResult<()> {
        match fs::remove_file(self.resolve(path)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()), // Already deleted
            Err(e) => Err(PersistenceError::Io(e)),
        }
    }

    fn create_dir_all(&self, path: &str) -> PersistenceResult<()> {
        fs::create_dir_all(self.resolve(path))?;
        Ok(())
    }

    fn atomic_write(&self, path: &str, data: &[u8]) -> PersistenceResult<()> {
        let full = self.resolve(path);
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent)?;
        }
        // Write to temp file, then rename
        let temp = full.with_extension("tmp");
        {
            let mut f = fs::File::create(&temp)?;
            f.write_all(data)?;
            f.sync_all()?;
        }
        fs::rename(&temp, &full)?;
        Ok(())
    }

    fn file_path(&self, path: &str) -> Option<PathBuf> {
        Some(self.resolve(path))
    }
}
