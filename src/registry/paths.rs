// serverbackup/src/registry/paths.rs
use std::fs;
use std::path::{Path, PathBuf};

use crate::errors::{BackupError, Result};
use crate::utils::{to_archive_path, trim_separators};

/// A file or directory scheduled for archival, and where it lands inside the
/// archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathEntry {
    source_path: PathBuf,
    archive_relative_path: String,
}

impl PathEntry {
    /// Validates that `source_path` exists as a file or directory and resolves
    /// it to an absolute path.
    ///
    /// Without an explicit `archive_relative_path`, a directory is stored under
    /// its own path and a file under its parent directory's path.
    pub fn new(source_path: &Path, archive_relative_path: Option<&str>) -> Result<Self> {
        if !(source_path.is_dir() || source_path.is_file()) {
            return Err(BackupError::InvalidPath {
                path: source_path.to_path_buf(),
            });
        }
        let source_path = fs::canonicalize(source_path).map_err(|_| BackupError::InvalidPath {
            path: source_path.to_path_buf(),
        })?;

        let archive_relative_path = match archive_relative_path {
            Some(relative) => trim_separators(relative),
            None if source_path.is_dir() => to_archive_path(&source_path),
            None => source_path
                .parent()
                .map(to_archive_path)
                .unwrap_or_default(),
        };

        Ok(Self {
            source_path,
            archive_relative_path,
        })
    }

    pub fn source_path(&self) -> &Path {
        &self.source_path
    }

    pub fn archive_relative_path(&self) -> &str {
        &self.archive_relative_path
    }
}

/// Ordered list of registered paths. Duplicates are kept.
#[derive(Debug, Default, Clone)]
pub struct PathRegistry {
    entries: Vec<PathEntry>,
}

impl PathRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        source_path: impl AsRef<Path>,
        archive_relative_path: Option<&str>,
    ) -> Result<&PathEntry> {
        let entry = PathEntry::new(source_path.as_ref(), archive_relative_path)?;
        self.entries.push(entry);
        Ok(&self.entries[self.entries.len() - 1])
    }

    pub fn entries(&self) -> &[PathEntry] {
        &self.entries
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
