//! Batch prepatching of every cached image.
//!
//! Runs [`Patcher::patch_asset`] over each `.png` in a [`ResponseCache`] on a
//! dedicated rayon pool, so at most [`PrepatchOptions::concurrency`] images
//! are decoded at once. Failures are logged and counted; they never stop the
//! sweep.

use crate::error::{Error, Result};
use crate::resolver::{PatchOutcome, Patcher};
use crate::response_cache::{CachedAsset, ResponseCache};
use crate::utils::is_image_asset;
use rayon::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Default number of images patched concurrently.
pub const DEFAULT_PREPATCH_CONCURRENCY: usize = 2;

/// Progress information emitted after each asset finishes.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrepatchProgress {
    /// Number of assets finished so far, including this one.
    pub current: usize,
    pub total: usize,
    /// Key of the asset that just finished.
    pub key: String,
}

type ProgressCallback = Arc<dyn Fn(PrepatchProgress) + Send + Sync>;

/// Options for [`prepatch`].
#[derive(Clone)]
pub struct PrepatchOptions {
    /// Maximum assets in flight. Zero is treated as one.
    pub concurrency: usize,
    progress_callback: Option<ProgressCallback>,
}

impl Default for PrepatchOptions {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_PREPATCH_CONCURRENCY,
            progress_callback: None,
        }
    }
}

impl PrepatchOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// Register a progress callback. It may be called from worker threads.
    pub fn with_progress<F>(mut self, callback: F) -> Self
    where
        F: Fn(PrepatchProgress) + Send + Sync + 'static,
    {
        self.progress_callback = Some(Arc::new(callback));
        self
    }

    fn emit_progress(&self, progress: PrepatchProgress) {
        if let Some(callback) = &self.progress_callback {
            callback(progress);
        }
    }
}

/// Outcome counts of a prepatch sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrepatchSummary {
    /// Image assets considered.
    pub total: usize,
    pub patched: usize,
    /// Includes assets no override applies to.
    pub unchanged: usize,
    pub failed: usize,
    pub elapsed: Duration,
}

enum ItemResult {
    Patched,
    Unchanged,
    Failed,
}

/// Patch every cached image asset.
///
/// Only errors that prevent the sweep from starting (listing the response
/// cache, creating the worker pool) are returned.
pub fn prepatch(
    patcher: &Patcher,
    response_cache: &dyn ResponseCache,
    options: &PrepatchOptions,
) -> Result<PrepatchSummary> {
    let start = Instant::now();

    let assets: Vec<CachedAsset> = response_cache
        .cached_assets()?
        .into_iter()
        .filter(|asset| is_image_asset(&asset.key))
        .collect();
    let total = assets.len();
    tracing::info!("Prepatching {} cached images", total);

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(options.concurrency.max(1))
        .thread_name(|i| format!("prepatch-{i}"))
        .build()
        .map_err(|e| Error::Other(format!("Failed to start prepatch workers: {e}")))?;

    let finished = AtomicUsize::new(0);
    let results: Vec<ItemResult> = pool.install(|| {
        assets
            .par_iter()
            .map(|asset| {
                let result = prepatch_one(patcher, response_cache, asset);
                options.emit_progress(PrepatchProgress {
                    current: finished.fetch_add(1, Ordering::Relaxed) + 1,
                    total,
                    key: asset.key.clone(),
                });
                result
            })
            .collect()
    });

    let mut summary = PrepatchSummary {
        total,
        ..Default::default()
    };
    for result in results {
        match result {
            ItemResult::Patched => summary.patched += 1,
            ItemResult::Unchanged => summary.unchanged += 1,
            ItemResult::Failed => summary.failed += 1,
        }
    }
    summary.elapsed = start.elapsed();

    tracing::info!(
        "Prepatch done in {} ms: {} patched, {} unchanged, {} failed",
        summary.elapsed.as_millis(),
        summary.patched,
        summary.unchanged,
        summary.failed
    );
    Ok(summary)
}

fn prepatch_one(
    patcher: &Patcher,
    response_cache: &dyn ResponseCache,
    asset: &CachedAsset,
) -> ItemResult {
    let stored_file = response_cache.location(&asset.key);
    match patcher.patch_asset(&asset.key, None, &stored_file, &asset.meta) {
        Ok(PatchOutcome::Patched(_)) => {
            tracing::debug!("Prepatched {}", asset.key);
            ItemResult::Patched
        }
        Ok(PatchOutcome::Unchanged(_) | PatchOutcome::NoOverrides(_)) => ItemResult::Unchanged,
        Err(e) => {
            tracing::error!("Failed to prepatch {}: {}", asset.key, e);
            ItemResult::Failed
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::ModDescriptor;
    use crate::diff::ImageDiff;
    use crate::patched_cache::MemoryPatchedCache;
    use crate::response_cache::DirResponseCache;
    use camino::Utf8PathBuf;
    use image::{ImageFormat, Rgba, RgbaImage};
    use std::fs;
    use std::io::Cursor;
    use std::path::Path;
    use std::sync::Mutex;
    use tempfile::tempdir;

    fn write(root: &Path, rel: &str, bytes: &[u8]) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, bytes).unwrap();
    }

    fn png(color: [u8; 4]) -> Vec<u8> {
        let mut out = Vec::new();
        RgbaImage::from_pixel(8, 8, Rgba(color))
            .write_to(&mut Cursor::new(&mut out), ImageFormat::Png)
            .unwrap();
        out
    }

    #[test]
    fn test_prepatch_classifies_outcomes() {
        let dir = tempdir().unwrap();
        let mod_root = dir.path().join("mod");
        let cache_root = dir.path().join("cache");

        write(&mod_root, "mod.json", br#"{"name":"m","version":"1"}"#);
        write(&mod_root, "kcs2/original/a.png", &png([1, 1, 1, 255]));
        write(&mod_root, "kcs2/patched/a.png", &png([200, 0, 0, 255]));

        // a.png matches, b.png does not, c.png is corrupt, d.json is ignored
        write(&cache_root, "kcs2/a.png", &png([1, 1, 1, 255]));
        write(&cache_root, "kcs2/b.png", &png([90, 90, 90, 255]));
        write(&cache_root, "kcs2/c.PNG", b"corrupt");
        write(&cache_root, "kcs2/d.json", b"{}");
        write(&cache_root, "other/e.png", &png([1, 1, 1, 255]));

        let patcher = Patcher::new(Arc::new(MemoryPatchedCache::new()));
        patcher.reload_index(&[ModDescriptor::new(
            Utf8PathBuf::from_path_buf(mod_root.join("mod.json")).unwrap(),
        )]);
        let response_cache =
            DirResponseCache::new(Utf8PathBuf::from_path_buf(cache_root).unwrap());

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let options = PrepatchOptions::new().with_progress(move |p| {
            sink.lock().unwrap().push((p.current, p.total));
        });

        let summary = prepatch(&patcher, &response_cache, &options).unwrap();
        assert_eq!(summary.total, 4);
        assert_eq!(summary.patched, 1);
        assert_eq!(summary.unchanged, 2);
        assert_eq!(summary.failed, 1);

        let mut seen = seen.lock().unwrap().clone();
        seen.sort_unstable();
        assert_eq!(seen, vec![(1, 4), (2, 4), (3, 4), (4, 4)]);
    }

    /// Never matches; records how many scores run at once.
    #[derive(Default)]
    struct InFlightDiff {
        current: AtomicUsize,
        peak: AtomicUsize,
    }

    impl ImageDiff for InFlightDiff {
        fn score(&self, _a: &RgbaImage, _b: &RgbaImage) -> f64 {
            let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(std::time::Duration::from_millis(20));
            self.current.fetch_sub(1, Ordering::SeqCst);
            1.0
        }
    }

    fn peak_in_flight(concurrency: usize) -> usize {
        let dir = tempdir().unwrap();
        let mod_root = dir.path().join("mod");
        let cache_root = dir.path().join("cache");

        write(&mod_root, "mod.json", br#"{"name":"m","version":"1"}"#);
        write(&mod_root, "original/a.png", &png([1, 1, 1, 255]));
        write(&mod_root, "patched/a.png", &png([2, 2, 2, 255]));
        for i in 0..8 {
            write(&cache_root, &format!("kcs2/{i}.png"), &png([9, 9, 9, 255]));
        }

        let diff = Arc::new(InFlightDiff::default());
        let patcher =
            Patcher::new(Arc::new(MemoryPatchedCache::new())).with_diff(diff.clone());
        patcher.reload_index(&[ModDescriptor::new(
            Utf8PathBuf::from_path_buf(mod_root.join("mod.json")).unwrap(),
        )]);
        let response_cache =
            DirResponseCache::new(Utf8PathBuf::from_path_buf(cache_root).unwrap());

        let options = PrepatchOptions::new().with_concurrency(concurrency);
        let summary = prepatch(&patcher, &response_cache, &options).unwrap();
        assert_eq!(summary.unchanged, 8);

        diff.peak.load(Ordering::SeqCst)
    }

    #[test]
    fn test_prepatch_respects_concurrency() {
        assert_eq!(peak_in_flight(1), 1);

        let peak = peak_in_flight(2);
        assert!((1..=2).contains(&peak), "peak in flight was {peak}");
    }

    #[test]
    fn test_default_concurrency_is_two() {
        assert_eq!(PrepatchOptions::default().concurrency, 2);
    }

    #[test]
    fn test_prepatch_empty_cache() {
        let dir = tempdir().unwrap();
        let patcher = Patcher::new(Arc::new(MemoryPatchedCache::new()));
        let response_cache =
            DirResponseCache::new(Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap());

        let summary = prepatch(
            &patcher,
            &response_cache,
            &PrepatchOptions::new().with_concurrency(0),
        )
        .unwrap();
        assert_eq!(summary.total, 0);
        assert_eq!(summary.failed, 0);
    }
}
