//! File-backed persistence: one JSON document per cache key.

use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use tokio::fs;

use super::entry::CacheEntry;
use super::error::CacheError;

const EXTENSION: &str = "json";
const MAX_KEY_LEN: usize = 128;

#[derive(Debug)]
pub struct PersistentStore {
    root: PathBuf,
}

impl PersistentStore {
    /// Open the store rooted at `root`, creating the directory if necessary.
    pub fn new(root: PathBuf) -> Result<Self, std::io::Error> {
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Read one entry. Missing files are `Ok(None)`; undecodable files are `Corrupt`.
    pub async fn read(&self, key: &str) -> Result<Option<CacheEntry>, CacheError> {
        Ok(self.read_sized(key).await?.map(|(entry, _)| entry))
    }

    /// Like [`read`](Self::read), also returning the on-disk size in bytes.
    pub(crate) async fn read_sized(
        &self,
        key: &str,
    ) -> Result<Option<(CacheEntry, u64)>, CacheError> {
        let path = self.path_for(key)?;
        let bytes = match fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(CacheError::io(key, err)),
        };

        let entry = serde_json::from_slice(&bytes).map_err(|source| CacheError::Corrupt {
            key: key.to_string(),
            source,
        })?;
        Ok(Some((entry, bytes.len() as u64)))
    }

    /// Replace the entry on disk atomically; returns the serialized size.
    pub async fn write(&self, entry: &CacheEntry) -> Result<u64, CacheError> {
        let path = self.path_for(&entry.key)?;
        let bytes = serde_json::to_vec(entry).map_err(|source| CacheError::Serialize {
            key: entry.key.clone(),
            source,
        })?;
        let size = bytes.len() as u64;

        write_atomic(path, bytes)
            .await
            .map_err(|err| CacheError::io(entry.key.as_str(), err))?;
        Ok(size)
    }

    /// Delete the entry. Returns whether a file was removed.
    pub async fn remove(&self, key: &str) -> Result<bool, CacheError> {
        let path = self.path_for(key)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
            Err(err) => Err(CacheError::io(key, err)),
        }
    }

    /// Every key with a document on disk, sorted.
    pub async fn keys(&self) -> Result<Vec<String>, CacheError> {
        let mut dir = match fs::read_dir(&self.root).await {
            Ok(dir) => dir,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(CacheError::io("*", err)),
        };

        let mut keys = Vec::new();
        while let Some(item) = dir
            .next_entry()
            .await
            .map_err(|err| CacheError::io("*", err))?
        {
            let path = item.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(EXTENSION) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|stem| stem.to_str())
                && is_valid_key(stem)
            {
                keys.push(stem.to_string());
            }
        }
        keys.sort();
        Ok(keys)
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, CacheError> {
        if !is_valid_key(key) {
            return Err(CacheError::InvalidKey(key.to_string()));
        }
        Ok(self.root.join(format!("{key}.{EXTENSION}")))
    }
}

pub(crate) fn is_valid_key(key: &str) -> bool {
    !key.is_empty()
        && key.len() <= MAX_KEY_LEN
        && key
            .bytes()
            .all(|byte| byte.is_ascii_lowercase() || byte.is_ascii_digit() || matches!(byte, b'-' | b'_'))
}

/// Write `bytes` to `path` through a synced temp file in the same directory,
/// so readers see either the old document or the new one.
pub(crate) async fn write_atomic(path: PathBuf, bytes: Vec<u8>) -> std::io::Result<()> {
    tokio::task::spawn_blocking(move || {
        let dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        std::fs::create_dir_all(&dir)?;

        let mut tmp = tempfile::Builder::new()
            .prefix(".tmp-")
            .tempfile_in(&dir)?;
        tmp.write_all(&bytes)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&path).map_err(|err| err.error)?;
        Ok(())
    })
    .await
    .map_err(std::io::Error::other)?
}
