//! Photo metadata cache.
//!
//! Every Flickr lookup costs one or two HTTP round trips, and a site with a
//! few hundred photos would otherwise hit the API for each of them on every
//! build. This module keeps the resolved metadata on disk between builds so
//! only photos that have never been seen before are fetched.
//!
//! # Design
//!
//! The cache is a flat map from [`PhotoKey`] to [`PhotoRecord`]. Entries are
//! never evicted: a record is fetched once and then reused for as long as the
//! cache file exists. To pick up a retitled photo on Flickr, delete the cache
//! file (or the entry) and rebuild.
//!
//! A build pass uses the cache in four steps:
//!
//! 1. [`PhotoCache::load`] once at the start of the pass
//! 2. [`PhotoCache::reconcile`] to find the requested keys it lacks
//! 3. [`PhotoCache::merge`] the freshly fetched records
//! 4. [`PhotoCache::save`] once at the end, only if something was added
//!
//! ## Storage
//!
//! The cache is a versioned JSON file at the configured location (by
//! default in the system temp directory). Saves write a sibling temp file
//! and rename it over the target, so an interrupted build never leaves a
//! truncated cache behind.
//!
//! There is no locking. Two builds sharing one cache path can overwrite each
//! other's additions; the loser's entries are simply fetched again next time.

use crate::tag::PhotoKey;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Version of the cache file format. Bump this to invalidate all existing
/// caches when the format or key computation changes.
const CACHE_VERSION: u32 = 1;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("IO error writing {path}: {source}")]
    Io { path: PathBuf, source: io::Error },
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Resolved metadata for one photo.
///
/// Records are never edited after a fetch; a re-fetch replaces the whole
/// record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhotoRecord {
    /// Display title: the inline marker title if given, else the Flickr title.
    pub title: String,
    /// Direct image URL for the configured size.
    pub raw_url: String,
    /// Flickr photo page URL.
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    /// Rotation in degrees as reported by Flickr.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rotation: Option<u32>,
}

/// On-disk photo metadata cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhotoCache {
    pub version: u32,
    pub entries: BTreeMap<PhotoKey, PhotoRecord>,
}

impl Default for PhotoCache {
    fn default() -> Self {
        Self::empty()
    }
}

impl PhotoCache {
    pub fn empty() -> Self {
        Self {
            version: CACHE_VERSION,
            entries: BTreeMap::new(),
        }
    }

    /// Load the cache from `path`.
    ///
    /// Never fails: a missing file, unreadable or truncated content, or a
    /// version mismatch all yield an empty cache so the build can carry on
    /// and refetch.
    pub fn load(path: &Path) -> Self {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) => {
                debug!("No usable cache at {}: {}", path.display(), e);
                return Self::empty();
            }
        };
        let cache: Self = match serde_json::from_str(&content) {
            Ok(c) => c,
            Err(e) => {
                debug!("Ignoring corrupt cache at {}: {}", path.display(), e);
                return Self::empty();
            }
        };
        if cache.version != CACHE_VERSION {
            debug!(
                "Ignoring cache at {} with version {} (expected {})",
                path.display(),
                cache.version,
                CACHE_VERSION
            );
            return Self::empty();
        }
        debug!("Loaded {} cached photos from {}", cache.len(), path.display());
        cache
    }

    /// Save the whole cache to `path`, replacing it atomically.
    pub fn save(&self, path: &Path) -> Result<(), CacheError> {
        let json = serde_json::to_string_pretty(self)?;
        let io_err = |source| CacheError::Io {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        let tmp_path = temp_path(path);
        std::fs::write(&tmp_path, json).map_err(io_err)?;
        if let Err(e) = std::fs::rename(&tmp_path, path) {
            let _ = std::fs::remove_file(&tmp_path);
            return Err(io_err(e));
        }
        debug!("Saved {} cached photos to {}", self.len(), path.display());
        Ok(())
    }

    /// Keys in `requested` that this cache has no record for.
    pub fn reconcile(&self, requested: &BTreeSet<PhotoKey>) -> BTreeSet<PhotoKey> {
        requested
            .iter()
            .filter(|key| !self.entries.contains_key(*key))
            .cloned()
            .collect()
    }

    /// Insert new records, replacing any existing record under the same key.
    pub fn merge<I>(&mut self, new_entries: I)
    where
        I: IntoIterator<Item = (PhotoKey, PhotoRecord)>,
    {
        self.entries.extend(new_entries);
    }

    pub fn insert(&mut self, key: PhotoKey, record: PhotoRecord) {
        self.entries.insert(key, record);
    }

    pub fn get(&self, key: &PhotoKey) -> Option<&PhotoRecord> {
        self.entries.get(key)
    }

    pub fn contains(&self, key: &PhotoKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Sibling temp path used for atomic saves: `<name>.tmp` in the same directory.
fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Summary of cache use for one build pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u32,
    pub fetched: u32,
}

impl CacheStats {
    pub fn total(&self) -> u32 {
        self.hits + self.fetched
    }
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.hits > 0 {
            write!(
                f,
                "{} cached, {} fetched ({} total)",
                self.hits,
                self.fetched,
                self.total()
            )
        } else {
            write!(f, "{} fetched", self.fetched)
        }
    }
}
