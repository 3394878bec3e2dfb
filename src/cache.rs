//! Persistent digest cache
//!
//! Maps `namespace/image:tag` of a source repository to the content digest observed right
//! after that tag was last copied. The file is a flat JSON object and is rewritten
//! atomically (temporary file in the same directory, then rename).

use crate::error::{MirrorError, Result};
use crate::image::Repository;
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

/// Composite cache key for a source tag
pub fn cache_key(repository: &dyn Repository, tag: &str) -> String {
    format!("{}:{}", repository.path(), tag)
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DigestCache {
    entries: BTreeMap<String, String>,
    dirty: bool,
}

impl DigestCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the cache, creating an empty file when none exists yet
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)?;
            }
            fs::write(path, b"{}\n").map_err(|e| MirrorError::Cache {
                message: format!("Failed to create cache file: {}", e),
                path: Some(path.to_path_buf()),
            })?;
            return Ok(Self::new());
        }

        let contents = fs::read_to_string(path)?;
        Self::from_json(&contents).map_err(|e| MirrorError::Cache {
            message: e.to_string(),
            path: Some(path.to_path_buf()),
        })
    }

    pub fn from_json(contents: &str) -> Result<Self> {
        if contents.trim().is_empty() {
            return Ok(Self::new());
        }
        let entries: BTreeMap<String, String> = serde_json::from_str(contents)
            .map_err(|e| MirrorError::Parse(format!("Failed to parse digest cache: {}", e)))?;
        Ok(Self {
            entries,
            dirty: false,
        })
    }

    pub fn to_json(&self) -> Result<String> {
        let mut json = serde_json::to_string_pretty(&self.entries)?;
        json.push('\n');
        Ok(json)
    }

    /// Atomically replace the file at `path` with the current entries
    pub fn save(&self, path: &Path) -> Result<()> {
        let dir = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        let cache_err = |message: String| MirrorError::Cache {
            message,
            path: Some(path.to_path_buf()),
        };

        let mut tmp = NamedTempFile::new_in(dir)
            .map_err(|e| cache_err(format!("Failed to create temporary file: {}", e)))?;
        tmp.write_all(self.to_json()?.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(path)
            .map_err(|e| cache_err(format!("Failed to replace cache file: {}", e.error)))?;
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// Upsert; marks the cache dirty even when the digest is unchanged
    pub fn put(&mut self, key: impl Into<String>, digest: impl Into<String>) {
        self.entries.insert(key.into(), digest.into());
        self.dirty = true;
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}
