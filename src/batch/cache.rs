//! Content-addressed on-disk memoisation of batch results.
//!
//! The key is the SHA-256 of the entry point's name, the crate version, a
//! cache schema version and the JSON encoding of the inputs and the
//! [`EstimationConfig::cache_identity`](crate::estimation::EstimationConfig::cache_identity).
//! Execution options are never hashed, so a sequential and a parallel run of
//! the same batch share an entry. Floats are written and parsed with
//! `serde_json`'s `float_roundtrip`, so a hit returns the stored bits. A new
//! crate version invalidates everything.

use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::error::{RndError, Result};

const SCHEMA_VERSION: u32 = 1;

/// Hex digest identifying one memoised call.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// Hashes `function` and the serialised `args`.
    pub fn new<A: Serialize + ?Sized>(function: &str, args: &A) -> Result<Self> {
        let payload = serde_json::to_vec(args).map_err(|e| RndError::Cache {
            message: format!("could not encode cache key: {e}"),
        })?;
        let mut hasher = Sha256::new();
        hasher.update(function.as_bytes());
        hasher.update([0u8]);
        hasher.update(env!("CARGO_PKG_VERSION").as_bytes());
        hasher.update(SCHEMA_VERSION.to_le_bytes());
        hasher.update(&payload);
        Ok(Self(hex::encode(hasher.finalize())))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Single-writer JSON file cache under one directory.
#[derive(Debug, Clone)]
pub struct DiskCache {
    root: PathBuf,
}

impl DiskCache {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path(&self, key: &CacheKey) -> PathBuf {
        self.root.join(format!("{}.json", key.as_str()))
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        self.path(key).is_file()
    }

    /// Cached value for `key`. Unreadable or stale entries count as misses.
    pub fn get<T: DeserializeOwned>(&self, key: &CacheKey) -> Option<T> {
        let path = self.path(key);
        let bytes = fs::read(&path).ok()?;
        match serde_json::from_slice(&bytes) {
            Ok(value) => {
                debug!(key = key.as_str(), "cache hit");
                Some(value)
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "ignoring unreadable cache entry");
                None
            }
        }
    }

    /// Writes through a temporary file so readers never see half an entry.
    pub fn put<T: Serialize>(&self, key: &CacheKey, value: &T) -> Result<()> {
        let bytes = serde_json::to_vec(value).map_err(|e| RndError::Cache {
            message: format!("could not encode cache entry: {e}"),
        })?;
        let path = self.path(key);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, bytes)?;
        fs::rename(&tmp, &path)?;
        debug!(key = key.as_str(), "cache entry written");
        Ok(())
    }

    /// Returns the cached value or computes, stores and returns it.
    ///
    /// A failed write is logged and does not fail the computation.
    pub fn get_or_compute<T, F>(&self, key: &CacheKey, compute: F) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Result<T>,
    {
        if let Some(hit) = self.get(key) {
            return Ok(hit);
        }
        let value = compute()?;
        if let Err(e) = self.put(key, &value) {
            warn!(key = key.as_str(), error = %e, "could not write cache entry");
        }
        Ok(value)
    }

    /// Removes every entry.
    pub fn clear(&self) -> Result<usize> {
        let mut removed = 0;
        for entry in fs::read_dir(&self.root)? {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                fs::remove_file(path)?;
                removed += 1;
            }
        }
        Ok(removed)
    }
}
