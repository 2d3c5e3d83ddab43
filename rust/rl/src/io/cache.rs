use super::{load_json, save_json};
use crate::error::Result;
use serde::{de::DeserializeOwned, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};

/// Hex SHA-256 of the JSON form of `value`.
///
/// Struct fields serialize in declaration order and maps in `serde_json`'s
/// sorted order, so equal configurations produce equal keys.
pub fn content_key<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    let bytes = serde_json::to_vec(value)?;
    let hash = Sha256::digest(&bytes);
    Ok(format!("{hash:x}"))
}

/// JSON artifacts stored under `<dir>/<kind>-<key>.json`.
#[derive(Debug, Clone)]
pub struct ArtifactCache {
    dir: PathBuf,
}

impl ArtifactCache {
    pub fn new<P: AsRef<Path>>(dir: P) -> Result<Self> {
        fs::create_dir_all(dir.as_ref())?;
        Ok(Self {
            dir: dir.as_ref().to_path_buf(),
        })
    }

    pub fn path(&self, key: &str, kind: &str) -> PathBuf {
        self.dir.join(format!("{kind}-{key}.json"))
    }

    /// A missing entry is a miss; so is one that no longer parses.
    pub fn get<T: DeserializeOwned>(&self, key: &str, kind: &str) -> Option<T> {
        let path = self.path(key, kind);
        if !path.exists() {
            return None;
        }

        match load_json(&path) {
            Ok(v) => Some(v),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "ignoring unreadable cache entry");
                None
            }
        }
    }

    pub fn put<T: Serialize>(&self, key: &str, kind: &str, value: &T) -> Result<()> {
        save_json(value, self.path(key, kind))
    }

    pub fn get_or_try_insert_with<T, F>(&self, key: &str, kind: &str, compute: F) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Result<T>,
    {
        if let Some(v) = self.get(key, kind) {
            tracing::info!(kind, key, "cache hit");
            return Ok(v);
        }

        let v = compute()?;
        self.put(key, kind, &v)?;
        Ok(v)
    }
}
