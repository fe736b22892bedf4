//! Patched result caching.
//!
//! Decoding and compositing an atlas is expensive, so finished outputs are
//! stored keyed by `(asset path, patch fingerprint, last modified)`. A change
//! to either the applicable overrides or the upstream asset produces a new key
//! and the stale entry is simply never hit again.
//!
//! [`FsPatchedCache`] persists entries to disk next to an `index.json`
//! manifest; [`MemoryPatchedCache`] keeps them in process.

use crate::error::{Error, Result};
use crate::utils::PatchFingerprint;
use camino::{Utf8Component, Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

/// Store of previously computed patch outputs.
///
/// Implementations must tolerate concurrent readers and writers. Two requests
/// missing on the same key may both compute and write; outputs for one key are
/// identical, so the last write wins harmlessly.
pub trait PatchedCache: Send + Sync {
    /// Return the cached output for this exact key, if any.
    fn check_cached(
        &self,
        path: &str,
        fingerprint: PatchFingerprint,
        last_modified: Option<&str>,
    ) -> Option<Vec<u8>>;

    /// Store a fully computed output. Never called with partial results.
    fn cache_modded(
        &self,
        path: &str,
        bytes: &[u8],
        fingerprint: PatchFingerprint,
        last_modified: Option<&str>,
    ) -> Result<()>;

    /// Re-synchronize the in-memory view with persistent storage. Called after
    /// every override index rebuild.
    fn load_cached(&self) -> Result<()>;
}

/// Manifest record for one cached output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedPatch {
    pub fingerprint: PatchFingerprint,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<String>,
}

impl CachedPatch {
    fn matches(&self, fingerprint: PatchFingerprint, last_modified: Option<&str>) -> bool {
        self.fingerprint == fingerprint && self.last_modified.as_deref() == last_modified
    }
}

/// On-disk manifest, persisted as `index.json` in the cache root.
///
/// ```json
/// {
///   "version": 1,
///   "entries": {
///     "/kcs2/img/common/sheet.png": { "fingerprint": 1234, "lastModified": "1700000000" }
///   }
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CacheManifest {
    version: u32,
    #[serde(default)]
    entries: HashMap<String, CachedPatch>,
}

const MANIFEST_VERSION: u32 = 1;
const MANIFEST_FILE: &str = "index.json";

impl Default for CacheManifest {
    fn default() -> Self {
        Self {
            version: MANIFEST_VERSION,
            entries: HashMap::new(),
        }
    }
}

/// Directory-backed [`PatchedCache`].
///
/// Outputs are stored at the asset's path below the cache root
/// (`/kcs2/img/sheet.png` → `<root>/kcs2/img/sheet.png`).
pub struct FsPatchedCache {
    root: Utf8PathBuf,
    entries: RwLock<HashMap<String, CachedPatch>>,
}

impl FsPatchedCache {
    /// Create a cache rooted at `root` and load any existing manifest.
    pub fn open(root: impl Into<Utf8PathBuf>) -> Result<Self> {
        let cache = Self {
            root: root.into(),
            entries: RwLock::new(HashMap::new()),
        };
        cache.load_cached()?;
        Ok(cache)
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    fn manifest_path(&self) -> Utf8PathBuf {
        self.root.join(MANIFEST_FILE)
    }

    /// Where the output for `path` is stored. Keys that would resolve outside
    /// the cache root are rejected.
    fn file_path(&self, path: &str) -> Result<Utf8PathBuf> {
        let rel = Utf8Path::new(path.trim_start_matches('/'));
        let contained = !rel.as_str().is_empty()
            && rel
                .components()
                .all(|c| matches!(c, Utf8Component::Normal(_)));
        if !contained {
            return Err(Error::InvalidAssetKey(path.to_string()));
        }
        Ok(self.root.join(rel))
    }

    /// Number of entries in the in-memory view.
    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn save_manifest(&self, entries: &HashMap<String, CachedPatch>) -> Result<()> {
        let manifest = CacheManifest {
            version: MANIFEST_VERSION,
            entries: entries.clone(),
        };
        write_atomic(
            &self.manifest_path(),
            &serde_json::to_vec_pretty(&manifest)?,
        )
    }
}

static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Write to a temporary sibling and rename into place.
fn write_atomic(path: &Utf8Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent.as_std_path())?;
    }

    let tmp = path.with_file_name(format!(
        ".{}.{}-{}.tmp",
        path.file_name().unwrap_or("entry"),
        std::process::id(),
        TMP_COUNTER.fetch_add(1, Ordering::Relaxed)
    ));
    std::fs::write(tmp.as_std_path(), bytes)?;
    std::fs::rename(tmp.as_std_path(), path.as_std_path())?;
    Ok(())
}

impl PatchedCache for FsPatchedCache {
    fn check_cached(
        &self,
        path: &str,
        fingerprint: PatchFingerprint,
        last_modified: Option<&str>,
    ) -> Option<Vec<u8>> {
        // Held across the read so a concurrent write can't swap the file
        // under a matching entry
        let entries = self.entries.read().ok()?;
        let hit = entries
            .get(path)
            .is_some_and(|entry| entry.matches(fingerprint, last_modified));
        if !hit {
            return None;
        }

        let file = self.file_path(path).ok()?;
        match std::fs::read(file.as_std_path()) {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                tracing::warn!("Patched cache entry for {} unreadable: {}", path, e);
                None
            }
        }
    }

    fn cache_modded(
        &self,
        path: &str,
        bytes: &[u8],
        fingerprint: PatchFingerprint,
        last_modified: Option<&str>,
    ) -> Result<()> {
        let file = self.file_path(path)?;

        // The file and its entry change together under the write lock
        let mut entries = self
            .entries
            .write()
            .map_err(|_| "patched cache lock poisoned".to_string())?;
        write_atomic(&file, bytes)?;
        entries.insert(
            path.to_string(),
            CachedPatch {
                fingerprint,
                last_modified: last_modified.map(str::to_string),
            },
        );
        self.save_manifest(&entries)
    }

    fn load_cached(&self) -> Result<()> {
        let manifest_path = self.manifest_path();
        let manifest = if manifest_path.as_std_path().exists() {
            let contents = std::fs::read(manifest_path.as_std_path())?;
            serde_json::from_slice::<CacheManifest>(&contents)?
        } else {
            CacheManifest::default()
        };

        if manifest.version != MANIFEST_VERSION {
            tracing::info!(
                "Patched cache manifest version {} is stale, starting empty",
                manifest.version
            );
        }

        let loaded: HashMap<String, CachedPatch> = if manifest.version == MANIFEST_VERSION {
            manifest
                .entries
                .into_iter()
                .filter(|(path, _)| {
                    self.file_path(path)
                        .is_ok_and(|file| file.as_std_path().is_file())
                })
                .collect()
        } else {
            HashMap::new()
        };

        tracing::info!("Loaded {} patched cache entries from {}", loaded.len(), self.root);
        *self
            .entries
            .write()
            .map_err(|_| "patched cache lock poisoned".to_string())? = loaded;
        Ok(())
    }
}

/// In-process [`PatchedCache`]. Nothing survives the process.
#[derive(Default)]
pub struct MemoryPatchedCache {
    entries: RwLock<HashMap<String, (CachedPatch, Vec<u8>)>>,
}

impl MemoryPatchedCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl PatchedCache for MemoryPatchedCache {
    fn check_cached(
        &self,
        path: &str,
        fingerprint: PatchFingerprint,
        last_modified: Option<&str>,
    ) -> Option<Vec<u8>> {
        let entries = self.entries.read().ok()?;
        let (meta, bytes) = entries.get(path)?;
        meta.matches(fingerprint, last_modified)
            .then(|| bytes.clone())
    }

    fn cache_modded(
        &self,
        path: &str,
        bytes: &[u8],
        fingerprint: PatchFingerprint,
        last_modified: Option<&str>,
    ) -> Result<()> {
        let meta = CachedPatch {
            fingerprint,
            last_modified: last_modified.map(str::to_string),
        };
        self.entries
            .write()
            .map_err(|_| "patched cache lock poisoned".to_string())?
            .insert(path.to_string(), (meta, bytes.to_vec()));
        Ok(())
    }

    fn load_cached(&self) -> Result<()> {
        Ok(())
    }
}
