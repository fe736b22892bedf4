//! Patch resolution: from a requested asset path to its patched bytes.

use crate::atlas::{AtlasPatcher, ImagePatch, ImageRequest};
use crate::descriptor::ModDescriptor;
use crate::diff::{ImageDiff, PixelDiff};
use crate::error::Result;
use crate::exact_match::find_exact_match;
use crate::override_index::{IndexBuildReport, OverrideIndex};
use crate::patched_cache::PatchedCache;
use crate::response_cache::AssetMeta;
use crate::utils::{
    ancestor_keys, compute_patch_fingerprint, is_image_asset, normalize_request_path,
};
use arc_swap::ArcSwap;
use camino::{Utf8Path, Utf8PathBuf};
use std::sync::Arc;

/// One override applicable to a request: the original it must match and the
/// patched bytes that replace it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    /// Entry name (filename plus owning mod name and version).
    pub name: String,
    pub original_path: Utf8PathBuf,
    pub patched: Vec<u8>,
}

/// Result of [`Patcher::patch_asset`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatchOutcome {
    /// No override is declared for the asset's directory or any ancestor.
    /// Holds the caller's content as given (empty when none was passed);
    /// the stored file is never read.
    NoOverrides(Vec<u8>),
    /// Overrides exist but none matched the asset.
    Unchanged(Vec<u8>),
    /// At least one override was applied.
    Patched(Vec<u8>),
}

impl PatchOutcome {
    pub fn bytes(&self) -> &[u8] {
        match self {
            PatchOutcome::NoOverrides(b)
            | PatchOutcome::Unchanged(b)
            | PatchOutcome::Patched(b) => b,
        }
    }

    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            PatchOutcome::NoOverrides(b)
            | PatchOutcome::Unchanged(b)
            | PatchOutcome::Patched(b) => b,
        }
    }

    pub fn is_patched(&self) -> bool {
        matches!(self, PatchOutcome::Patched(_))
    }
}

/// Resolves requests against the current override index and applies the
/// matching overrides.
///
/// The index is held behind an [`ArcSwap`]: [`reload_index`](Self::reload_index)
/// publishes a fully built replacement in one store, and every request works
/// on the snapshot it loaded when it started.
///
/// # Example
///
/// ```no_run
/// use camino::Utf8Path;
/// use std::sync::Arc;
/// use kcs_patcher::{AssetMeta, FsPatchedCache, ModDescriptor, Patcher};
///
/// # fn main() -> kcs_patcher::Result<()> {
/// let cache = Arc::new(FsPatchedCache::open("cache/modded")?);
/// let patcher = Patcher::new(cache);
/// patcher.reload_index(&[ModDescriptor::new("mods/icons/mod.json")]);
///
/// let bytes = patcher.patch(
///     "/kcs2/img/common/sheet.png",
///     None,
///     Utf8Path::new("cache/kcs2/img/common/sheet.png"),
///     &AssetMeta::new("1700000000"),
/// )?;
/// # let _ = bytes;
/// # Ok(())
/// # }
/// ```
pub struct Patcher {
    index: ArcSwap<OverrideIndex>,
    cache: Arc<dyn PatchedCache>,
    diff: Arc<dyn ImageDiff>,
}

impl Patcher {
    /// Create a patcher with an empty index and the default [`PixelDiff`].
    pub fn new(cache: Arc<dyn PatchedCache>) -> Self {
        Self {
            index: ArcSwap::from_pointee(OverrideIndex::default()),
            cache,
            diff: Arc::new(PixelDiff::default()),
        }
    }

    /// Replace the difference scorer.
    pub fn with_diff(mut self, diff: Arc<dyn ImageDiff>) -> Self {
        self.diff = diff;
        self
    }

    /// Current index snapshot.
    pub fn index(&self) -> Arc<OverrideIndex> {
        self.index.load_full()
    }

    /// Rebuild the index from `mods`, publish it, and re-synchronize the
    /// patched cache.
    pub fn reload_index(&self, mods: &[ModDescriptor]) -> IndexBuildReport {
        let (index, report) = OverrideIndex::build(mods);
        self.index.store(Arc::new(index));

        if let Err(e) = self.cache.load_cached() {
            tracing::error!("Failed to reload patched cache: {}", e);
        }
        report
    }

    /// Collect every applicable candidate for a normalized path.
    ///
    /// Levels are visited deepest first, and entries within a level in name
    /// order. Originals without a patched counterpart, and patched files that
    /// cannot be read, are logged and left out.
    pub fn resolve_candidates(&self, normalized_path: &str) -> Vec<Candidate> {
        let index = self.index.load();
        let mut candidates = Vec::new();

        for key in ancestor_keys(normalized_path) {
            let Some(set) = index.get(&key) else {
                continue;
            };

            for (original, patched) in set.pairs() {
                let Some(patched) = patched else {
                    tracing::error!("Missing {} in patched under {}", original.name, key);
                    continue;
                };

                match std::fs::read(patched.source_path.as_std_path()) {
                    Ok(bytes) => candidates.push(Candidate {
                        name: original.name.clone(),
                        original_path: original.source_path.clone(),
                        patched: bytes,
                    }),
                    Err(e) => {
                        tracing::error!(
                            "Failed to read patched '{}': {}",
                            patched.source_path,
                            e
                        );
                    }
                }
            }
        }

        candidates
    }

    /// Patch one asset.
    ///
    /// `content` is the asset's bytes if the caller already has them;
    /// otherwise they are read from `stored_file`, but only once some
    /// override applies. Spritesheet
    /// metadata is looked up next to `stored_file`.
    pub fn patch_asset(
        &self,
        path: &str,
        content: Option<Vec<u8>>,
        stored_file: &Utf8Path,
        meta: &AssetMeta,
    ) -> Result<PatchOutcome> {
        let path = normalize_request_path(path);
        let candidates = self.resolve_candidates(&path);

        if candidates.is_empty() {
            return Ok(PatchOutcome::NoOverrides(content.unwrap_or_default()));
        }

        let content = match content {
            Some(content) => content,
            None => std::fs::read(stored_file.as_std_path())?,
        };

        let fingerprint = compute_patch_fingerprint(
            &candidates
                .iter()
                .map(|c| (c.name.as_str(), c.patched.as_slice()))
                .collect::<Vec<_>>(),
        );
        tracing::debug!(
            "{} candidates for {} (fingerprint {})",
            candidates.len(),
            path,
            fingerprint
        );

        if !is_image_asset(&path) {
            return Ok(match find_exact_match(&content, &candidates) {
                Some(candidate) => {
                    tracing::debug!("Replacing {} with {}", path, candidate.name);
                    PatchOutcome::Patched(candidate.patched.clone())
                }
                None => PatchOutcome::Unchanged(content),
            });
        }

        let request = ImageRequest {
            path: &path,
            stored_file,
            content: &content,
            candidates: &candidates,
            fingerprint,
            last_modified: meta.last_modified.as_deref(),
        };

        Ok(
            match AtlasPatcher::new(self.cache.as_ref(), self.diff.as_ref()).apply(&request)? {
                ImagePatch::Cached(bytes) if bytes == content => PatchOutcome::Unchanged(bytes),
                ImagePatch::Cached(bytes) | ImagePatch::Replaced(bytes) => {
                    PatchOutcome::Patched(bytes)
                }
                ImagePatch::Composited { bytes, .. } => PatchOutcome::Patched(bytes),
                ImagePatch::Unchanged => PatchOutcome::Unchanged(content),
            },
        )
    }

    /// Patch one asset and return the bytes to serve.
    pub fn patch(
        &self,
        path: &str,
        content: Option<Vec<u8>>,
        stored_file: &Utf8Path,
        meta: &AssetMeta,
    ) -> Result<Vec<u8>> {
        self.patch_asset(path, content, stored_file, meta)
            .map(PatchOutcome::into_bytes)
    }
}
