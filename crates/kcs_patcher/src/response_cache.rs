//! Access to the raw response cache.
//!
//! The proxy stores upstream responses somewhere; this crate only needs to
//! enumerate what is stored and find the stored bytes for a key. The storage
//! format belongs to the proxy, so it is abstracted behind [`ResponseCache`].

use crate::error::Result;
use crate::utils::normalize_request_path;
use camino::{Utf8Path, Utf8PathBuf};
use walkdir::WalkDir;

/// Cache metadata recorded for one stored response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssetMeta {
    /// Upstream modification token (typically the `Last-Modified` header).
    /// Opaque: only ever compared for equality.
    pub last_modified: Option<String>,
}

impl AssetMeta {
    pub fn new(last_modified: impl Into<String>) -> Self {
        Self {
            last_modified: Some(last_modified.into()),
        }
    }
}

/// One stored response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedAsset {
    /// Virtual asset path, e.g. `/kcs2/img/common/sheet.png`.
    pub key: String,
    pub meta: AssetMeta,
}

/// The proxy's response cache, as seen by the patcher.
pub trait ResponseCache: Send + Sync {
    /// Every currently cached asset.
    fn cached_assets(&self) -> Result<Vec<CachedAsset>>;

    /// Where the stored bytes for `key` live.
    fn location(&self, key: &str) -> Utf8PathBuf;
}

/// A [`ResponseCache`] read straight from a directory tree.
///
/// Each file below the root is an asset keyed by its `/`-joined relative
/// path, with its modification time (UNIX seconds) as the
/// [`last_modified`](AssetMeta::last_modified) token. Hidden files and any
/// excluded subdirectories (such as a patched cache stored inside the same
/// tree) are skipped.
#[derive(Debug, Clone)]
pub struct DirResponseCache {
    root: Utf8PathBuf,
    excluded: Vec<Utf8PathBuf>,
}

impl DirResponseCache {
    pub fn new(root: impl Into<Utf8PathBuf>) -> Self {
        Self {
            root: root.into(),
            excluded: Vec::new(),
        }
    }

    /// Skip everything under `dir` when enumerating.
    pub fn exclude(mut self, dir: impl Into<Utf8PathBuf>) -> Self {
        self.excluded.push(dir.into());
        self
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    /// Look up a single asset without walking the whole tree.
    pub fn asset(&self, key: &str) -> Option<CachedAsset> {
        let key = normalize_request_path(key);
        let metadata = std::fs::metadata(self.location(&key).as_std_path()).ok()?;
        if !metadata.is_file() {
            return None;
        }

        Some(CachedAsset {
            key,
            meta: AssetMeta {
                last_modified: mtime_secs(&metadata),
            },
        })
    }

    fn is_excluded(&self, path: &Utf8Path) -> bool {
        self.excluded.iter().any(|dir| path.starts_with(dir))
    }
}

fn mtime_secs(metadata: &std::fs::Metadata) -> Option<String> {
    let modified = metadata.modified().ok()?;
    let duration = modified.duration_since(std::time::UNIX_EPOCH).ok()?;
    Some(duration.as_secs().to_string())
}

impl ResponseCache for DirResponseCache {
    fn cached_assets(&self) -> Result<Vec<CachedAsset>> {
        if !self.root.as_std_path().is_dir() {
            tracing::warn!("Response cache directory {} does not exist", self.root);
            return Ok(Vec::new());
        }

        let mut assets = Vec::new();
        let walker = WalkDir::new(self.root.as_std_path())
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| {
                let hidden = entry.depth() > 0
                    && entry.file_name().to_string_lossy().starts_with('.');
                let excluded = Utf8Path::from_path(entry.path())
                    .is_some_and(|path| self.is_excluded(path));
                !hidden && !excluded
            });

        for entry in walker {
            let entry = entry.map_err(std::io::Error::from)?;
            if !entry.file_type().is_file() {
                continue;
            }

            let Some(path) = Utf8Path::from_path(entry.path()) else {
                tracing::warn!("Skipping non-UTF-8 path: {}", entry.path().display());
                continue;
            };
            let Ok(rel) = path.strip_prefix(&self.root) else {
                continue;
            };

            let key = format!("/{}", rel.as_str().replace('\\', "/"));
            let last_modified = entry.metadata().ok().as_ref().and_then(mtime_secs);
            assets.push(CachedAsset {
                key,
                meta: AssetMeta { last_modified },
            });
        }

        Ok(assets)
    }

    fn location(&self, key: &str) -> Utf8PathBuf {
        self.root
            .join(normalize_request_path(key).trim_start_matches('/'))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_dir_cache_lists_files() {
        let dir = tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
        fs::create_dir_all(root.join("kcs2/img")).unwrap();
        fs::write(root.join("kcs2/img/a.png"), b"a").unwrap();
        fs::write(root.join("kcs2/img/a.json"), b"{}").unwrap();
        fs::write(root.join(".hidden"), b"x").unwrap();
        fs::create_dir_all(root.join("modded/kcs2")).unwrap();
        fs::write(root.join("modded/kcs2/a.png"), b"patched").unwrap();

        let cache = DirResponseCache::new(root.clone()).exclude(root.join("modded"));
        let keys: Vec<String> = cache
            .cached_assets()
            .unwrap()
            .into_iter()
            .map(|a| a.key)
            .collect();

        assert_eq!(keys, vec!["/kcs2/img/a.json", "/kcs2/img/a.png"]);
    }

    #[test]
    fn test_dir_cache_records_mtime() {
        let dir = tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
        fs::write(root.join("a.png"), b"a").unwrap();

        let assets = DirResponseCache::new(root).cached_assets().unwrap();
        assert_eq!(assets.len(), 1);
        assert!(assets[0].meta.last_modified.is_some());
    }

    #[test]
    fn test_location() {
        let cache = DirResponseCache::new("cache");
        assert_eq!(
            cache.location("/kcs2/img/a.png"),
            Utf8PathBuf::from("cache/kcs2/img/a.png")
        );
        assert_eq!(
            cache.location("/kcs2/../../secret"),
            Utf8PathBuf::from("cache/secret")
        );
    }

    #[test]
    fn test_single_asset_lookup() {
        let dir = tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
        fs::create_dir_all(root.join("kcs2")).unwrap();
        fs::write(root.join("kcs2/a.png"), b"a").unwrap();

        let cache = DirResponseCache::new(root);
        let asset = cache.asset("kcs2/a.png").unwrap();
        assert_eq!(asset.key, "/kcs2/a.png");
        assert!(asset.meta.last_modified.is_some());
        assert!(cache.asset("/kcs2").is_none());
        assert!(cache.asset("/kcs2/missing.png").is_none());
    }

    #[test]
    fn test_missing_root_is_empty() {
        let dir = tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(dir.path().join("missing")).unwrap();
        assert!(DirResponseCache::new(root).cached_assets().unwrap().is_empty());
    }
}
