//! Content-addressed cache of transformed images.
//!
//! Transforming an image is the bottleneck of every request: fetching the
//! source, decoding, resampling and re-encoding can take hundreds of
//! milliseconds. This module lets repeat requests skip all of it when the
//! exact same parameter set has been rendered before.
//!
//! # Design
//!
//! ## Cache keys
//!
//! The cache is **content-addressed** by the request's
//! [`Fingerprint`]: a SHA-256 of the canonical parameter mapping. Each
//! entry is one file named by the fingerprint's 64-character hex encoding,
//! directly inside the cache directory. There is no index and no sharding;
//! an entry exists iff its file exists.
//!
//! ## Lifetime
//!
//! The directory is created with [`tempfile`] at startup and owned by the
//! [`CacheStore`]. [`CacheStore::close`] (called on graceful shutdown)
//! removes it; dropping the store does the same. Nothing survives a restart
//! and there is no eviction: entries live as long as the process.
//!
//! ## Writes
//!
//! [`CacheStore::put`] writes to a `.staging-*` file in the same directory
//! and renames it over the final name, so readers see either no entry or a
//! complete one. A failed write removes its staging file and is reported to
//! the caller, which treats it as a missed opportunity, not a request failure.
//!
//! ## Concurrent identical requests
//!
//! There is no per-fingerprint lock. Two requests for the same fingerprint
//! that both miss will both render and both write. Their bytes are identical,
//! the rename is atomic, and the last writer wins.
//!
//! ## Bypassing the cache
//!
//! Pass `--no-cache` (or set `cache.enabled = false`) to get a
//! [`CacheStore::disabled`] store: every lookup misses and writes are no-ops.

use crate::request::Fingerprint;
use bytes::Bytes;
use std::fmt;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use tempfile::TempDir;
use thiserror::Error;

/// Prefix of the process-scoped cache directory.
const DIR_PREFIX: &str = "image-proxy-";

/// Prefix of in-progress writes. Never a valid fingerprint.
const STAGING_PREFIX: &str = ".staging-";

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("cache IO error: {0}")]
    Io(#[from] io::Error),
    #[error("cache is closed")]
    Closed,
}

/// Fingerprint-keyed store of encoded outputs in a process-scoped directory.
#[derive(Debug)]
pub struct CacheStore {
    /// `None` for a disabled store.
    dir: Option<PathBuf>,
    root: Mutex<Option<TempDir>>,
    stats: CacheStats,
}

impl CacheStore {
    /// Create the cache directory, inside `parent` if given, else in the
    /// system temp dir.
    pub fn create(parent: Option<&Path>) -> Result<Self, CacheError> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(DIR_PREFIX);
        let root = match parent {
            Some(parent) => {
                std::fs::create_dir_all(parent)?;
                builder.tempdir_in(parent)?
            }
            None => builder.tempdir()?,
        };
        Ok(Self {
            dir: Some(root.path().to_path_buf()),
            root: Mutex::new(Some(root)),
            stats: CacheStats::default(),
        })
    }

    /// A store that never holds anything.
    pub fn disabled() -> Self {
        Self {
            dir: None,
            root: Mutex::new(None),
            stats: CacheStats::default(),
        }
    }

    /// The cache directory, if enabled.
    pub fn path(&self) -> Option<&Path> {
        self.dir.as_deref()
    }

    pub fn is_enabled(&self) -> bool {
        self.dir.is_some()
    }

    fn is_open(&self) -> bool {
        self.root
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Where the entry for `fingerprint` lives. `None` when disabled or closed.
    pub fn entry_path(&self, fingerprint: &Fingerprint) -> Option<PathBuf> {
        let dir = self.dir.as_ref()?;
        self.is_open().then(|| dir.join(fingerprint.to_string()))
    }

    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    /// Look up a cached output. Any failure to read counts as a miss.
    pub async fn get(&self, fingerprint: &Fingerprint) -> Option<Bytes> {
        let Some(path) = self.entry_path(fingerprint) else {
            self.stats.miss();
            return None;
        };

        if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
            self.stats.miss();
            return None;
        }

        match tokio::fs::read(&path).await {
            Ok(bytes) => {
                self.stats.hit();
                Some(Bytes::from(bytes))
            }
            Err(e) => {
                tracing::warn!(%fingerprint, error = %e, "cache entry unreadable");
                self.stats.miss();
                None
            }
        }
    }

    /// Store an output under `fingerprint`, replacing any existing entry.
    ///
    /// A no-op on a disabled store.
    pub async fn put(&self, fingerprint: &Fingerprint, bytes: Bytes) -> Result<(), CacheError> {
        let Some(dir) = self.dir.clone() else {
            return Ok(());
        };
        if !self.is_open() {
            return Err(CacheError::Closed);
        }

        let name = fingerprint.to_string();
        let result = tokio::task::spawn_blocking(move || write_atomic(&dir, &name, &bytes))
            .await
            .map_err(io::Error::other)
            .and_then(|written| written);

        match result {
            Ok(()) => {
                self.stats.stored();
                Ok(())
            }
            Err(e) => {
                self.stats.write_failed();
                Err(CacheError::Io(e))
            }
        }
    }

    /// Remove the cache directory. Later lookups miss and later writes fail
    /// with [`CacheError::Closed`]. Closing twice is fine.
    pub fn close(&self) -> Result<(), CacheError> {
        let root = self
            .root
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(root) = root {
            root.close()?;
        }
        Ok(())
    }
}

/// Write `bytes` to `dir/name` via a staging file and rename.
///
/// On error the staging file is removed when it drops.
fn write_atomic(dir: &Path, name: &str, bytes: &[u8]) -> io::Result<()> {
    let mut staging = tempfile::Builder::new()
        .prefix(STAGING_PREFIX)
        .tempfile_in(dir)?;
    staging.write_all(bytes)?;
    staging.flush()?;
    staging.persist(dir.join(name)).map_err(|e| e.error)?;
    Ok(())
}

/// Running totals for a cache, safe to update from any task.
#[derive(Debug, Default)]
pub struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
    stored: AtomicU64,
    write_failures: AtomicU64,
}

impl CacheStats {
    pub fn hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn stored(&self) {
        self.stored.fetch_add(1, Ordering::Relaxed);
    }

    pub fn write_failed(&self) {
        self.write_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    pub fn stored_count(&self) -> u64 {
        self.stored.load(Ordering::Relaxed)
    }

    pub fn write_failures(&self) -> u64 {
        self.write_failures.load(Ordering::Relaxed)
    }

    pub fn total(&self) -> u64 {
        self.hits() + self.misses()
    }
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.hits() > 0 {
            write!(
                f,
                "{} cached, {} rendered ({} total)",
                self.hits(),
                self.misses(),
                self.total()
            )?;
        } else {
            write!(f, "{} rendered", self.misses())?;
        }
        if self.write_failures() > 0 {
            write!(f, ", {} failed writes", self.write_failures())?;
        }
        Ok(())
    }
}
