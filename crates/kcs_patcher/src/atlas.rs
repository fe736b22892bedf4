//! Image patching: whole-sprite replacement and atlas frame compositing.
//!
//! # Algorithm
//!
//! 1. Look up `(path, fingerprint, last_modified)` in the [`PatchedCache`].
//!    A hit is returned as-is; nothing is decoded.
//! 2. Decode the base image. Failure here aborts the request.
//! 3. Decode every candidate's original image. Its dimensions are the first
//!    matching key; a candidate that fails to decode is dropped.
//! 4. Without spritesheet metadata, the image is a single sprite: the first
//!    same-sized candidate scoring below [`DIFF_THRESHOLD`] against the whole
//!    image wins, and its patched file is returned byte-for-byte.
//! 5. With metadata, each frame is cropped and compared against the
//!    same-sized candidates still in the pool. The first match is consumed:
//!    the frame rectangle is cleared to transparent and the patched image is
//!    composited into exactly that rectangle. Scanning stops once the pool is
//!    empty.
//! 6. The output (re-encoded if anything was composited, otherwise the
//!    replacement or the untouched input) is written to the cache and returned.

use crate::diff::{ImageDiff, DIFF_THRESHOLD};
use crate::error::{Error, Result};
use crate::patched_cache::PatchedCache;
use crate::resolver::Candidate;
use crate::spritesheet::{load_frames, AtlasFrame};
use crate::utils::{companion_meta_path, PatchFingerprint};
use camino::Utf8Path;
use image::{imageops, ImageFormat, Rgba, RgbaImage};
use std::io::Cursor;
use std::time::Instant;

const TRANSPARENT: Rgba<u8> = Rgba([0, 0, 0, 0]);

/// Everything needed to patch one image asset.
#[derive(Debug, Clone, Copy)]
pub struct ImageRequest<'a> {
    /// Normalized asset path; the cache key's first component.
    pub path: &'a str,
    /// Where the response cache stored the asset. Spritesheet metadata is
    /// looked up next to it.
    pub stored_file: &'a Utf8Path,
    pub content: &'a [u8],
    pub candidates: &'a [Candidate],
    pub fingerprint: PatchFingerprint,
    pub last_modified: Option<&'a str>,
}

/// How an image request was satisfied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImagePatch {
    /// Served from the patched cache.
    Cached(Vec<u8>),
    /// The whole image matched a candidate; these are its patched bytes.
    Replaced(Vec<u8>),
    /// One or more atlas frames were replaced; the re-encoded PNG.
    Composited { bytes: Vec<u8>, frames: usize },
    /// Nothing matched. The output is the input.
    Unchanged,
}

/// A candidate whose original image has been decoded.
struct PreparedCandidate<'a> {
    candidate: &'a Candidate,
    original: RgbaImage,
}

impl PreparedCandidate<'_> {
    fn dimensions(&self) -> (u32, u32) {
        self.original.dimensions()
    }
}

/// Applies candidates to image assets, caching the results.
pub struct AtlasPatcher<'a> {
    cache: &'a dyn PatchedCache,
    diff: &'a dyn ImageDiff,
}

impl<'a> AtlasPatcher<'a> {
    pub fn new(cache: &'a dyn PatchedCache, diff: &'a dyn ImageDiff) -> Self {
        Self { cache, diff }
    }

    /// Patch one image. See the module docs for the full algorithm.
    pub fn apply(&self, request: &ImageRequest<'_>) -> Result<ImagePatch> {
        if let Some(cached) =
            self.cache
                .check_cached(request.path, request.fingerprint, request.last_modified)
        {
            tracing::trace!("Patched cache hit for {}", request.path);
            return Ok(ImagePatch::Cached(cached));
        }

        tracing::info!("Need to repatch {}", request.path);
        let start = Instant::now();

        let result = self.compute(request)?;
        let output = match &result {
            ImagePatch::Replaced(bytes) | ImagePatch::Composited { bytes, .. } => bytes.as_slice(),
            ImagePatch::Unchanged | ImagePatch::Cached(_) => request.content,
        };

        if let Err(e) = self.cache.cache_modded(
            request.path,
            output,
            request.fingerprint,
            request.last_modified,
        ) {
            tracing::error!("Failed to cache patched {}: {}", request.path, e);
        }

        tracing::info!(
            "Patching {} took {} ms",
            request.path,
            start.elapsed().as_millis()
        );
        Ok(result)
    }

    fn compute(&self, request: &ImageRequest<'_>) -> Result<ImagePatch> {
        let base = image::load_from_memory(request.content)
            .map_err(|source| Error::BaseImageDecode {
                path: request.path.to_string(),
                source,
            })?
            .to_rgba8();

        let pool = prepare_candidates(request.candidates);

        match load_frames(&companion_meta_path(request.stored_file))? {
            None => Ok(match_single_sprite(&base, &pool, self.diff)
                .map(|candidate| ImagePatch::Replaced(candidate.patched.clone()))
                .unwrap_or(ImagePatch::Unchanged)),
            Some(frames) => {
                let mut working = base;
                let replaced = patch_frames(&mut working, &frames, pool, self.diff);
                if replaced == 0 {
                    return Ok(ImagePatch::Unchanged);
                }

                let mut bytes = Vec::new();
                working.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)?;
                Ok(ImagePatch::Composited {
                    bytes,
                    frames: replaced,
                })
            }
        }
    }
}

/// Decode each candidate's original image, dropping those that fail.
fn prepare_candidates(candidates: &[Candidate]) -> Vec<PreparedCandidate<'_>> {
    candidates
        .iter()
        .filter_map(|candidate| {
            let decoded = std::fs::read(candidate.original_path.as_std_path())
                .map_err(Error::from)
                .and_then(|bytes| image::load_from_memory(&bytes).map_err(Error::from));

            match decoded {
                Ok(img) => Some(PreparedCandidate {
                    candidate,
                    original: img.to_rgba8(),
                }),
                Err(e) => {
                    tracing::error!(
                        "Failed to decode original '{}' for {}: {}",
                        candidate.original_path,
                        candidate.name,
                        e
                    );
                    None
                }
            }
        })
        .collect()
}

/// First same-sized candidate whose original matches the whole image.
fn match_single_sprite<'a>(
    base: &RgbaImage,
    pool: &[PreparedCandidate<'a>],
    diff: &dyn ImageDiff,
) -> Option<&'a Candidate> {
    pool.iter()
        .filter(|prepared| prepared.dimensions() == base.dimensions())
        .find(|prepared| diff.score(&prepared.original, base) < DIFF_THRESHOLD)
        .map(|prepared| prepared.candidate)
}

/// Replace matching frames in `working`. Returns how many frames were
/// replaced. Each candidate is consumed by at most one frame.
fn patch_frames(
    working: &mut RgbaImage,
    frames: &[AtlasFrame],
    mut pool: Vec<PreparedCandidate<'_>>,
    diff: &dyn ImageDiff,
) -> usize {
    let (width, height) = working.dimensions();
    let mut replaced = 0;

    for frame in frames {
        if pool.is_empty() {
            break;
        }

        let size = (frame.width, frame.height);
        if !pool.iter().any(|prepared| prepared.dimensions() == size) {
            continue;
        }

        if !frame.fits_within(width, height) {
            tracing::warn!(
                "Frame {:?} lies outside the {}x{} atlas, skipping",
                frame,
                width,
                height
            );
            continue;
        }

        let region =
            imageops::crop_imm(working, frame.x, frame.y, frame.width, frame.height).to_image();
        let Some(pos) = pool.iter().position(|prepared| {
            prepared.dimensions() == size
                && diff.score(&prepared.original, &region) < DIFF_THRESHOLD
        }) else {
            continue;
        };

        let consumed = pool.remove(pos);
        match image::load_from_memory(&consumed.candidate.patched) {
            Ok(patched) => {
                composite_frame(working, frame, &patched.to_rgba8());
                replaced += 1;
                tracing::debug!("Replaced frame {:?} with {}", frame, consumed.candidate.name);
            }
            Err(e) => {
                tracing::error!(
                    "Failed to decode patched image for {}: {}",
                    consumed.candidate.name,
                    e
                );
            }
        }
    }

    replaced
}

/// Clear `frame` to transparent, then draw `patched` into it. Pixels of
/// `patched` beyond the frame are discarded so neighbouring frames are never
/// touched.
fn composite_frame(working: &mut RgbaImage, frame: &AtlasFrame, patched: &RgbaImage) {
    for y in frame.y..frame.y + frame.height {
        for x in frame.x..frame.x + frame.width {
            working.put_pixel(x, y, TRANSPARENT);
        }
    }

    let clip_w = patched.width().min(frame.width);
    let clip_h = patched.height().min(frame.height);
    let clipped = imageops::crop_imm(patched, 0, 0, clip_w, clip_h).to_image();
    imageops::overlay(working, &clipped, i64::from(frame.x), i64::from(frame.y));
}
