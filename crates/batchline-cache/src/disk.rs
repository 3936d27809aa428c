//! On-disk blob store for the warm tier.
//!
//! One file per entry under the cache directory. Each blob starts with a
//! fixed header so that expiry survives process restart:
//!
//! ```text
//! magic "BLC1" | version u8 | flags u8 | created_ms u64 | ttl_ms u64 | payload_len u32
//! ```
//!
//! Integers are little-endian; `ttl_ms == 0` means no expiry; flag bit 0
//! marks a gzip-compressed payload. The payload itself is a 2-byte key
//! length, the original key, then the value, so key collisions after
//! sanitisation are detectable.

use crate::error::CacheError;
use batchline_core::Clock;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::fs;
use tokio::sync::Mutex as AsyncMutex;

const MAGIC: [u8; 4] = *b"BLC1";
const VERSION: u8 = 1;
const FLAG_COMPRESSED: u8 = 0b0000_0001;
const HEADER_LEN: usize = 4 + 1 + 1 + 8 + 8 + 4;

const BLOB_EXT: &str = "blob";
const INDEX_FILE: &str = "_index.json";

/// Longest key stored as-is; anything longer (or unsafe) is hashed.
const MAX_PLAIN_KEY: usize = 128;

#[derive(Debug, Serialize, Deserialize)]
struct IndexFile {
    saved_at_ms: u64,
    entries: Vec<IndexEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
struct IndexEntry {
    filename: String,
    created_ms: u64,
    ttl_ms: u64,
}

/// Header fields of a decoded blob.
#[derive(Debug, Clone, Copy)]
pub(crate) struct BlobMeta {
    pub(crate) created_ms: u64,
    pub(crate) ttl_ms: u64,
}

impl BlobMeta {
    pub(crate) fn is_expired(&self, now_ms: u64) -> bool {
        self.ttl_ms > 0 && now_ms.saturating_sub(self.created_ms) > self.ttl_ms
    }
}

/// Maps a caller key to a filename-safe stem. Keys made of
/// `[A-Za-z0-9._-]` pass through; anything else becomes SHA-256 hex.
pub fn sanitize_key(key: &str) -> String {
    let safe = !key.is_empty()
        && key.len() <= MAX_PLAIN_KEY
        && key
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'.' || b == b'_' || b == b'-');
    if safe {
        key.to_string()
    } else {
        format!("{:x}", Sha256::digest(key.as_bytes()))
    }
}

pub(crate) fn encode_blob(
    key: &str,
    value: &[u8],
    created_ms: u64,
    ttl: Option<Duration>,
    compress: bool,
) -> Result<Vec<u8>, CacheError> {
    if key.len() > u16::MAX as usize {
        return Err(CacheError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "cache key exceeds 64 KiB",
        )));
    }
    let mut payload = Vec::with_capacity(2 + key.len() + value.len());
    payload.extend_from_slice(&(key.len() as u16).to_le_bytes());
    payload.extend_from_slice(key.as_bytes());
    payload.extend_from_slice(value);

    let (payload, flags) = if compress {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&payload)?;
        (encoder.finish()?, FLAG_COMPRESSED)
    } else {
        (payload, 0)
    };

    let ttl_ms = ttl.map(|d| d.as_millis() as u64).unwrap_or(0);
    let mut blob = Vec::with_capacity(HEADER_LEN + payload.len());
    blob.extend_from_slice(&MAGIC);
    blob.push(VERSION);
    blob.push(flags);
    blob.extend_from_slice(&created_ms.to_le_bytes());
    blob.extend_from_slice(&ttl_ms.to_le_bytes());
    blob.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    blob.extend_from_slice(&payload);
    Ok(blob)
}

pub(crate) fn decode_blob(
    path: &Path,
    bytes: &[u8],
) -> Result<(BlobMeta, String, Vec<u8>), CacheError> {
    if bytes.len() < HEADER_LEN {
        return Err(CacheError::corrupt(path, "truncated header"));
    }
    if bytes[0..4] != MAGIC {
        return Err(CacheError::corrupt(path, "bad magic"));
    }
    if bytes[4] != VERSION {
        return Err(CacheError::corrupt(
            path,
            format!("unsupported version {}", bytes[4]),
        ));
    }
    let flags = bytes[5];
    let created_ms = u64::from_le_bytes(bytes[6..14].try_into().unwrap());
    let ttl_ms = u64::from_le_bytes(bytes[14..22].try_into().unwrap());
    let payload_len = u32::from_le_bytes(bytes[22..26].try_into().unwrap()) as usize;
    let raw = &bytes[HEADER_LEN..];
    if raw.len() != payload_len {
        return Err(CacheError::corrupt(path, "payload length mismatch"));
    }

    let payload = if flags & FLAG_COMPRESSED != 0 {
        let mut decoder = GzDecoder::new(raw);
        let mut out = Vec::new();
        decoder
            .read_to_end(&mut out)
            .map_err(|e| CacheError::corrupt(path, format!("gzip: {e}")))?;
        out
    } else {
        raw.to_vec()
    };

    if payload.len() < 2 {
        return Err(CacheError::corrupt(path, "missing key prefix"));
    }
    let key_len = u16::from_le_bytes(payload[0..2].try_into().unwrap()) as usize;
    if payload.len() < 2 + key_len {
        return Err(CacheError::corrupt(path, "key prefix overruns payload"));
    }
    let key = std::str::from_utf8(&payload[2..2 + key_len])
        .map_err(|_| CacheError::corrupt(path, "key is not utf-8"))?
        .to_string();
    let value = payload[2 + key_len..].to_vec();

    Ok((
        BlobMeta {
            created_ms,
            ttl_ms,
        },
        key,
        value,
    ))
}

/// Content-addressed blob store with per-key write locks and an index
/// journal written on clean shutdown.
pub(crate) struct DiskStore {
    dir: PathBuf,
    compress: bool,
    clock: Arc<dyn Clock>,
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl DiskStore {
    /// Opens the store, creating the directory and replaying the index
    /// journal. A missing or corrupt index triggers a full directory scan;
    /// corrupt or expired blobs are removed either way.
    pub(crate) async fn open(
        dir: PathBuf,
        compress: bool,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, CacheError> {
        fs::create_dir_all(&dir).await?;
        // An unwritable directory must fail open, not the first put.
        let probe = dir.join(".write-probe");
        fs::write(&probe, b"").await?;
        let _ = fs::remove_file(&probe).await;
        let store = Self {
            dir,
            compress,
            clock,
            locks: Mutex::new(HashMap::new()),
        };
        store.replay_index().await;
        Ok(store)
    }

    fn blob_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.{BLOB_EXT}", sanitize_key(key)))
    }

    fn key_lock(&self, key: &str) -> Arc<AsyncMutex<()>> {
        let mut locks = self.locks.lock().unwrap();
        Arc::clone(locks.entry(sanitize_key(key)).or_default())
    }

    /// Writes a blob under a per-key lock; temp-file-then-rename keeps
    /// readers from observing partial writes.
    pub(crate) async fn put(
        &self,
        key: &str,
        value: &[u8],
        ttl: Option<Duration>,
    ) -> Result<(), CacheError> {
        let lock = self.key_lock(key);
        let _guard = lock.lock().await;

        let blob = encode_blob(key, value, self.clock.system_time_ms(), ttl, self.compress)?;
        let path = self.blob_path(key);
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, &blob).await?;
        fs::rename(&tmp, &path).await?;
        Ok(())
    }

    /// Reads a blob. Lock-free; expired entries are removed and reported
    /// as absent.
    pub(crate) async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let path = self.blob_path(key);
        let bytes = match fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let (meta, stored_key, value) = match decode_blob(&path, &bytes) {
            Ok(decoded) => decoded,
            Err(e) => {
                let _ = fs::remove_file(&path).await;
                return Err(e);
            }
        };
        if stored_key != key {
            return Err(CacheError::KeyCollision {
                stored: stored_key,
                requested: key.to_string(),
            });
        }
        if meta.is_expired(self.clock.system_time_ms()) {
            let _ = fs::remove_file(&path).await;
            return Ok(None);
        }
        Ok(Some(value))
    }

    pub(crate) async fn remove(&self, key: &str) -> Result<(), CacheError> {
        match fs::remove_file(self.blob_path(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    pub(crate) async fn clear(&self) -> Result<(), CacheError> {
        let mut dir = fs::read_dir(&self.dir).await?;
        while let Some(entry) = dir.next_entry().await? {
            let path = entry.path();
            let is_blob = path.extension().is_some_and(|ext| ext == BLOB_EXT);
            let is_index = path.file_name().is_some_and(|name| name == INDEX_FILE);
            if is_blob || is_index {
                let _ = fs::remove_file(&path).await;
            }
        }
        Ok(())
    }

    /// Writes the index journal; called on clean shutdown.
    pub(crate) async fn close(&self) -> Result<(), CacheError> {
        let mut entries = Vec::new();
        let mut dir = fs::read_dir(&self.dir).await?;
        while let Some(entry) = dir.next_entry().await? {
            let path = entry.path();
            if !path.extension().is_some_and(|ext| ext == BLOB_EXT) {
                continue;
            }
            let Ok(bytes) = fs::read(&path).await else {
                continue;
            };
            // Skip corrupt blobs rather than journalling them.
            let Ok((meta, _, _)) = decode_blob(&path, &bytes) else {
                continue;
            };
            let Some(filename) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            entries.push(IndexEntry {
                filename: filename.to_string(),
                created_ms: meta.created_ms,
                ttl_ms: meta.ttl_ms,
            });
        }
        let index = IndexFile {
            saved_at_ms: self.clock.system_time_ms(),
            entries,
        };
        let json = serde_json::to_vec_pretty(&index)
            .map_err(|e| CacheError::Io(std::io::Error::other(e)))?;
        fs::write(self.dir.join(INDEX_FILE), json).await?;
        Ok(())
    }

    async fn replay_index(&self) {
        let index_path = self.dir.join(INDEX_FILE);
        let parsed = match fs::read(&index_path).await {
            Ok(bytes) => serde_json::from_slice::<IndexFile>(&bytes).ok(),
            Err(_) => None,
        };
        match parsed {
            Some(index) => {
                let now_ms = self.clock.system_time_ms();
                let mut dropped = 0usize;
                for entry in &index.entries {
                    let meta = BlobMeta {
                        created_ms: entry.created_ms,
                        ttl_ms: entry.ttl_ms,
                    };
                    if meta.is_expired(now_ms) {
                        let _ = fs::remove_file(self.dir.join(&entry.filename)).await;
                        dropped += 1;
                    }
                }
                tracing::debug!(
                    entries = index.entries.len(),
                    dropped,
                    "replayed disk cache index"
                );
            }
            None => {
                tracing::debug!("disk cache index missing or corrupt, scanning directory");
                self.scan_dir().await;
            }
        }
    }

    /// Full directory scan: drops corrupt and expired blobs.
    async fn scan_dir(&self) {
        let Ok(mut dir) = fs::read_dir(&self.dir).await else {
            return;
        };
        let now_ms = self.clock.system_time_ms();
        let mut kept = 0usize;
        let mut dropped = 0usize;
        while let Ok(Some(entry)) = dir.next_entry().await {
            let path = entry.path();
            if !path.extension().is_some_and(|ext| ext == BLOB_EXT) {
                continue;
            }
            let should_drop = match fs::read(&path).await {
                Ok(bytes) => match decode_blob(&path, &bytes) {
                    Ok((meta, _, _)) => meta.is_expired(now_ms),
                    Err(_) => true,
                },
                Err(_) => true,
            };
            if should_drop {
                let _ = fs::remove_file(&path).await;
                dropped += 1;
            } else {
                kept += 1;
            }
        }
        tracing::debug!(kept, dropped, "scanned disk cache directory");
    }
}
