// src/fs/mock.rs

use super::FileSystem;
use anyhow::{anyhow, bail, Result};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Debug, Clone)]
pub enum MockEntry {
    File(Vec<u8>),
    Dir,
}

/// In-memory filesystem with failure injection for tests.
#[derive(Debug, Clone, Default)]
pub struct MockFileSystem {
    files: Arc<Mutex<HashMap<PathBuf, MockEntry>>>,
    failing_removals: Arc<Mutex<HashSet<PathBuf>>>,
    failing_mkdirs: Arc<Mutex<HashSet<PathBuf>>>,
    failing_stats: Arc<Mutex<HashSet<PathBuf>>>,
    temp_root: PathBuf,
}

impl MockFileSystem {
    pub fn new() -> Self {
        Self::with_temp_dir("/tmp")
    }

    pub fn with_temp_dir(root: impl Into<PathBuf>) -> Self {
        let fs = Self {
            temp_root: root.into(),
            ..Default::default()
        };
        let root = fs.temp_root.clone();
        fs.ensure_dirs(&mut fs.files.lock(), &root);
        fs
    }

    pub fn add_file(&self, path: impl AsRef<Path>, content: impl Into<Vec<u8>>) {
        let path = path.as_ref().to_path_buf();
        let mut files = self.files.lock();
        if let Some(parent) = path.parent() {
            self.ensure_dirs(&mut files, parent);
        }
        files.insert(path, MockEntry::File(content.into()));
    }

    /// Make every later `remove_dir_all(path)` fail.
    pub fn fail_removal_of(&self, path: impl AsRef<Path>) {
        self.failing_removals.lock().insert(path.as_ref().to_path_buf());
    }

    /// Make every later `create_dir_all(path)` fail.
    pub fn fail_mkdir_of(&self, path: impl AsRef<Path>) {
        self.failing_mkdirs.lock().insert(path.as_ref().to_path_buf());
    }

    /// Make every later `try_exists(path)` fail, as with EACCES.
    pub fn fail_stat_of(&self, path: impl AsRef<Path>) {
        self.failing_stats.lock().insert(path.as_ref().to_path_buf());
    }

    /// Stop injecting failures.
    pub fn heal(&self) {
        self.failing_removals.lock().clear();
        self.failing_mkdirs.lock().clear();
        self.failing_stats.lock().clear();
    }

    /// Direct children of `dir`, sorted.
    pub fn children(&self, dir: impl AsRef<Path>) -> Vec<PathBuf> {
        let dir = dir.as_ref();
        let files = self.files.lock();
        let mut out: Vec<PathBuf> = files
            .keys()
            .filter(|p| p.parent() == Some(dir))
            .cloned()
            .collect();
        out.sort();
        out
    }

    fn ensure_dirs(&self, files: &mut HashMap<PathBuf, MockEntry>, path: &Path) {
        for ancestor in path.ancestors() {
            if ancestor.as_os_str().is_empty() {
                continue;
            }
            files
                .entry(ancestor.to_path_buf())
                .or_insert(MockEntry::Dir);
        }
    }
}

impl FileSystem for MockFileSystem {
    fn read_to_string(&self, path: &Path) -> Result<String> {
        let files = self.files.lock();
        match files.get(path) {
            Some(MockEntry::File(content)) => {
                String::from_utf8(content.clone()).map_err(|e| anyhow!("Invalid UTF-8: {}", e))
            }
            Some(MockEntry::Dir) => Err(anyhow!("Is a directory: {:?}", path)),
            None => Err(anyhow!("File not found: {:?}", path)),
        }
    }

    fn write(&self, path: &Path, contents: &[u8]) -> Result<()> {
        self.add_file(path, contents);
        Ok(())
    }

    fn exists(&self, path: &Path) -> bool {
        self.files.lock().contains_key(path)
    }

    fn try_exists(&self, path: &Path) -> Result<bool> {
        if self.failing_stats.lock().contains(path) {
            bail!("permission denied: {:?}", path);
        }
        Ok(self.exists(path))
    }

    fn is_dir(&self, path: &Path) -> bool {
        matches!(self.files.lock().get(path), Some(MockEntry::Dir))
    }

    fn create_dir_all(&self, path: &Path) -> Result<()> {
        if self.failing_mkdirs.lock().contains(path) {
            bail!("permission denied: {:?}", path);
        }
        let mut files = self.files.lock();
        if let Some(MockEntry::File(_)) = files.get(path) {
            bail!("File exists: {:?}", path);
        }
        self.ensure_dirs(&mut files, path);
        Ok(())
    }

    fn remove_dir_all(&self, path: &Path) -> Result<()> {
        if self.failing_removals.lock().contains(path) {
            bail!("device or resource busy: {:?}", path);
        }
        self.files.lock().retain(|p, _| !p.starts_with(path));
        Ok(())
    }

    fn temp_dir(&self) -> PathBuf {
        self.temp_root.clone()
    }
}
