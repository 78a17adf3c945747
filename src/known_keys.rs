// src/known_keys.rs
//! Offers we already notified about (or rejected), per site.
//!
//! Stored as a small TOML file mapping the site name to its ids:
//!
//! ```toml
//! Immowelt = ["2abc3de", "2abc3df"]
//! Kleinanzeigen = ["2712345678-203-9409"]
//! ```
//!
//! The set only ever grows. `load` merges the file into memory, `persist`
//! writes the full set via a temp file and rename.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::StoreError;

pub const DEFAULT_KNOWN_KEYS_PATH: &str = "state/known_keys.toml";

#[derive(Debug, Clone)]
pub struct KnownKeys {
    path: PathBuf,
    keys: BTreeMap<String, BTreeSet<String>>,
}

impl KnownKeys {
    /// Empty set bound to `path`. Nothing is read or created yet.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            keys: BTreeMap::new(),
        }
    }

    /// `new` followed by `load`.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let mut keys = Self::new(path);
        keys.load()?;
        Ok(keys)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn has_seen(&self, site: &str, id: &str) -> bool {
        self.keys.get(site).is_some_and(|ids| ids.contains(id))
    }

    /// Remember `id` for `site`. Returns `false` if it was already known.
    pub fn mark_seen(&mut self, site: &str, id: &str) -> bool {
        self.keys
            .entry(site.to_string())
            .or_default()
            .insert(id.to_string())
    }

    pub fn len(&self, site: &str) -> usize {
        self.keys.get(site).map_or(0, BTreeSet::len)
    }

    pub fn is_empty(&self) -> bool {
        self.keys.values().all(BTreeSet::is_empty)
    }

    /// Merge the stored ids into memory. A missing file is not an error.
    pub fn load(&mut self) -> Result<(), StoreError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(source) => {
                return Err(StoreError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        let stored: BTreeMap<String, BTreeSet<String>> =
            toml::from_str(&content).map_err(|source| StoreError::Parse {
                path: self.path.clone(),
                source,
            })?;

        for (site, ids) in stored {
            self.keys.entry(site).or_default().extend(ids);
        }
        Ok(())
    }

    /// Write the full set to disk, creating parent directories on first use.
    pub fn persist(&self) -> Result<(), StoreError> {
        let io_err = |source| StoreError::Io {
            path: self.path.clone(),
            source,
        };

        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).map_err(io_err)?;
        }

        let body = toml::to_string_pretty(&self.keys)?;
        let tmp = self.path.with_extension("toml.tmp");
        fs::write(&tmp, body).map_err(io_err)?;
        fs::rename(&tmp, &self.path).map_err(io_err)?;
        Ok(())
    }
}
