//! Disk shader cache
//!
//! Precompiled shaders are stored one per file so a session can warm the
//! pipeline cache before the first frame.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Shader cache magic number
const CACHE_MAGIC: u32 = 0x5348_4452; // "SHDR"
const CACHE_VERSION: u32 = 1;
const HEADER_SIZE: usize = 8;

/// File extension of cache entries
pub const CACHE_EXTENSION: &str = "shd";

/// One validated cache entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedShader {
    pub hash: u64,
    pub code: Vec<u8>,
}

/// On-disk shader cache directory
#[derive(Debug, Clone)]
pub struct DiskShaderCache {
    dir: PathBuf,
}

impl DiskShaderCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Cache entry paths, sorted. A missing directory is an empty cache.
    pub fn entries(&self) -> io::Result<Vec<PathBuf>> {
        let read_dir = match fs::read_dir(&self.dir) {
            Ok(read_dir) => read_dir,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };
        let mut entries = Vec::new();
        for entry in read_dir {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == CACHE_EXTENSION) {
                entries.push(path);
            }
        }
        entries.sort();
        Ok(entries)
    }

    /// Read and validate one entry. Stale or foreign files yield `None`.
    pub fn load_entry(path: &Path) -> Option<CachedShader> {
        let hash = path
            .file_stem()
            .and_then(|s| s.to_str())
            .and_then(|s| u64::from_str_radix(s, 16).ok())?;
        let data = match fs::read(path) {
            Ok(data) => data,
            Err(e) => {
                warn!("Failed to read shader cache entry {}: {}", path.display(), e);
                return None;
            }
        };
        if data.len() < HEADER_SIZE {
            return None;
        }
        let magic = u32::from_le_bytes([data[0], data[1], data[2], data[3]]);
        let version = u32::from_le_bytes([data[4], data[5], data[6], data[7]]);
        if magic != CACHE_MAGIC || version != CACHE_VERSION {
            debug!("Skipping stale shader cache entry {}", path.display());
            return None;
        }
        Some(CachedShader {
            hash,
            code: data[HEADER_SIZE..].to_vec(),
        })
    }

    /// Write an entry
    pub fn store(&self, shader: &CachedShader) -> io::Result<()> {
        fs::create_dir_all(&self.dir)?;
        let mut data = Vec::with_capacity(HEADER_SIZE + shader.code.len());
        data.extend_from_slice(&CACHE_MAGIC.to_le_bytes());
        data.extend_from_slice(&CACHE_VERSION.to_le_bytes());
        data.extend_from_slice(&shader.code);
        fs::write(self.dir.join(format!("{:016x}.{}", shader.hash, CACHE_EXTENSION)), data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DiskShaderCache::new(dir.path());
        let shader = CachedShader {
            hash: 0xABCD,
            code: vec![1, 2, 3],
        };
        cache.store(&shader).unwrap();

        let entries = cache.entries().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(DiskShaderCache::load_entry(&entries[0]), Some(shader));
    }

    #[test]
    fn test_missing_dir_is_empty() {
        let cache = DiskShaderCache::new("/nonexistent/shader/cache");
        assert!(cache.entries().unwrap().is_empty());
    }

    #[test]
    fn test_stale_entry_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("00000000000000ff.shd");
        fs::write(&path, [0u8; 12]).unwrap();
        assert_eq!(DiskShaderCache::load_entry(&path), None);
    }
}
