//! Directory listing below the configured roots.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use exec_bridge_core::{BrowseSettings, Error, Result};

/// Whether an entry is a plain file or a directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    /// Anything that is not a directory
    File,
    /// Directory (symlinks to directories included)
    Folder,
}

/// One entry of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirEntry {
    /// File name
    pub name: String,
    /// File or folder
    pub kind: EntryKind,
    /// Full path, usable as the next `path` to browse or run
    pub path: String,
}

/// Lists directories, confined to a set of root directories.
#[derive(Debug, Clone)]
pub struct DirectoryLister {
    roots: Vec<PathBuf>,
    show_hidden: bool,
}

impl DirectoryLister {
    /// Create a lister. Roots that cannot be resolved are ignored.
    pub fn new<I>(roots: I, show_hidden: bool) -> Self
    where
        I: IntoIterator,
        I::Item: AsRef<Path>,
    {
        let roots = roots
            .into_iter()
            .filter_map(|root| match std::fs::canonicalize(root.as_ref()) {
                Ok(canonical) => Some(canonical),
                Err(e) => {
                    warn!("Ignoring browse root {}: {}", root.as_ref().display(), e);
                    None
                }
            })
            .collect();

        Self { roots, show_hidden }
    }

    /// Create a lister from the browse settings.
    pub fn from_settings(settings: &BrowseSettings) -> Self {
        Self::new(&settings.roots, settings.show_hidden)
    }

    /// Canonical roots.
    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    /// Directory shown when the client asks for no particular path.
    pub fn default_path(&self) -> Option<&Path> {
        self.roots.first().map(PathBuf::as_path)
    }

    /// Canonicalize `path` and check it lies inside a root.
    pub async fn resolve(&self, path: &str) -> Result<PathBuf> {
        let canonical = tokio::fs::canonicalize(path)
            .await
            .map_err(|e| Error::from_fs(path, e))?;

        if !self.roots.iter().any(|root| canonical.starts_with(root)) {
            debug!("Rejected path outside browse roots: {}", canonical.display());
            return Err(Error::PathNotAllowed(path.to_string()));
        }
        Ok(canonical)
    }

    /// List one directory level, sorted by name.
    ///
    /// Returns the canonical directory path along with its entries. Entries
    /// whose metadata cannot be read are left out.
    pub async fn list(&self, path: &str) -> Result<(PathBuf, Vec<DirEntry>)> {
        let dir = self.resolve(path).await?;

        let metadata = tokio::fs::metadata(&dir)
            .await
            .map_err(|e| Error::from_fs(path, e))?;
        if !metadata.is_dir() {
            return Err(Error::NotADirectory(path.to_string()));
        }

        let mut reader = tokio::fs::read_dir(&dir)
            .await
            .map_err(|e| Error::from_fs(path, e))?;

        let mut entries = Vec::new();
        loop {
            let entry = match reader.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    warn!("Stopped reading {}: {}", dir.display(), e);
                    break;
                }
            };

            let name = entry.file_name().to_string_lossy().into_owned();
            if !self.show_hidden && name.starts_with('.') {
                continue;
            }

            let entry_path = entry.path();
            // Follows symlinks, so a link to a directory browses like one
            let kind = match tokio::fs::metadata(&entry_path).await {
                Ok(meta) if meta.is_dir() => EntryKind::Folder,
                Ok(_) => EntryKind::File,
                Err(e) => {
                    debug!("Skipping {}: {}", entry_path.display(), e);
                    continue;
                }
            };

            entries.push(DirEntry {
                name,
                kind,
                path: entry_path.to_string_lossy().into_owned(),
            });
        }

        entries.sort_by(|a, b| a.name.cmp(&b.name));
        debug!("Listed {} entries in {}", entries.len(), dir.display());
        Ok((dir, entries))
    }
}
