// src/seen.rs
//! Persistent record of post ids that have already been processed.
//!
//! Insert-only, shared across all watch targets for the process lifetime.
//! Reads and writes go through a reader/writer lock, so the store stays
//! correct if targets are ever processed in parallel.

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SeenStoreError {
    #[error("seen store I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("seen store at {path} is corrupt: {reason}")]
    Corrupt { path: PathBuf, reason: String },
    #[error("failed to encode seen store: {0}")]
    Encode(#[from] serde_json::Error),
}

/// On-disk layouts accepted by `load`. We always write the object form.
#[derive(Deserialize)]
#[serde(untagged)]
enum OnDisk {
    Map(BTreeMap<String, serde_json::Value>),
    List(Vec<String>),
}

#[derive(Debug)]
pub struct SeenStore {
    path: PathBuf,
    ids: RwLock<HashSet<String>>,
}

impl SeenStore {
    /// Empty store that will persist to `path`.
    pub fn empty(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ids: RwLock::new(HashSet::new()),
        }
    }

    /// Load from `path`. A missing file yields an empty store; unreadable or
    /// malformed content is an error.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, SeenStoreError> {
        let path = path.into();
        let raw = match fs::read_to_string(&path) {
            Ok(s) => s,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Self::empty(path)),
            Err(source) => return Err(SeenStoreError::Io { path, source }),
        };

        if raw.trim().is_empty() {
            return Err(SeenStoreError::Corrupt {
                path,
                reason: "file is empty".to_string(),
            });
        }

        let parsed: OnDisk = serde_json::from_str(&raw).map_err(|e| SeenStoreError::Corrupt {
            path: path.clone(),
            reason: e.to_string(),
        })?;

        let ids: HashSet<String> = match parsed {
            OnDisk::Map(m) => m.into_keys().collect(),
            OnDisk::List(v) => v.into_iter().collect(),
        };

        Ok(Self {
            path,
            ids: RwLock::new(ids),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.read().contains(id)
    }

    /// Returns true if the id was not present before.
    pub fn mark_seen(&self, id: &str) -> bool {
        if self.contains(id) {
            return false;
        }
        self.ids.write().insert(id.to_string())
    }

    pub fn len(&self) -> usize {
        self.ids.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Write the full id set, replacing the previous file.
    ///
    /// Written to a sibling temp file first and renamed into place, so a crash
    /// leaves either the old or the new content on disk.
    pub fn persist(&self) -> Result<(), SeenStoreError> {
        let snapshot: BTreeMap<String, bool> = {
            let g = self.ids.read();
            g.iter().map(|id| (id.clone(), true)).collect()
        };
        let json = serde_json::to_vec_pretty(&snapshot)?;

        let io_err = |source: io::Error| SeenStoreError::Io {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_err)?;
        }

        let tmp = tmp_path(&self.path);
        let mut f = fs::File::create(&tmp).map_err(io_err)?;
        f.write_all(&json).map_err(io_err)?;
        f.sync_all().map_err(io_err)?;
        drop(f);
        fs::rename(&tmp, &self.path).map_err(io_err)?;
        Ok(())
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
