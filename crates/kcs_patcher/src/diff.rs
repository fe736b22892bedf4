//! Perceptual difference scoring.
//!
//! The atlas applier only needs a number: `0.0` for identical images, growing
//! as they diverge. Anything implementing [`ImageDiff`] can be plugged into
//! [`Patcher`](crate::Patcher); [`PixelDiff`] is the default.

use image::{Rgba, RgbaImage};

/// Scores below this are treated as the same image. The comparison is strict:
/// a score of exactly `DIFF_THRESHOLD` does not match.
pub const DIFF_THRESHOLD: f64 = 0.01;

/// Scores how different two images are.
pub trait ImageDiff: Send + Sync {
    /// Non-negative score; `0.0` means identical. Callers only compare images
    /// of equal dimensions.
    fn score(&self, a: &RgbaImage, b: &RgbaImage) -> f64;
}

/// Fraction of pixels whose colour distance exceeds a per-pixel threshold.
///
/// Pixels are alpha-blended onto white and compared in YIQ space, so fully
/// transparent pixels compare equal regardless of their colour channels. The
/// per-pixel cutoff is `35215 * threshold^2`, where `35215` is the largest
/// possible YIQ delta.
#[derive(Debug, Clone, Copy)]
pub struct PixelDiff {
    /// Per-pixel sensitivity in `0.0..=1.0`; smaller is stricter.
    pub threshold: f64,
}

impl Default for PixelDiff {
    fn default() -> Self {
        Self { threshold: 0.1 }
    }
}

const MAX_YIQ_DELTA: f64 = 35215.0;

impl ImageDiff for PixelDiff {
    fn score(&self, a: &RgbaImage, b: &RgbaImage) -> f64 {
        if a.dimensions() != b.dimensions() {
            return 1.0;
        }

        let total = u64::from(a.width()) * u64::from(a.height());
        if total == 0 {
            return 0.0;
        }

        let max_delta = MAX_YIQ_DELTA * self.threshold * self.threshold;
        let differing = a
            .pixels()
            .zip(b.pixels())
            .filter(|(pa, pb)| pa != pb && color_delta(pa, pb) > max_delta)
            .count();

        differing as f64 / total as f64
    }
}

fn blend_white(c: u8, alpha: f64) -> f64 {
    255.0 + (f64::from(c) - 255.0) * alpha
}

fn yiq(p: &Rgba<u8>) -> (f64, f64, f64) {
    let alpha = f64::from(p[3]) / 255.0;
    let r = blend_white(p[0], alpha);
    let g = blend_white(p[1], alpha);
    let b = blend_white(p[2], alpha);

    let y = r * 0.298_895_31 + g * 0.586_622_47 + b * 0.114_482_23;
    let i = r * 0.595_977_99 - g * 0.274_176_47 - b * 0.321_801_52;
    let q = r * 0.211_470_17 - g * 0.522_617_24 + b * 0.311_147_07;
    (y, i, q)
}

/// Squared, weighted YIQ distance between two pixels.
fn color_delta(a: &Rgba<u8>, b: &Rgba<u8>) -> f64 {
    let (ya, ia, qa) = yiq(a);
    let (yb, ib, qb) = yiq(b);
    let (dy, di, dq) = (ya - yb, ia - ib, qa - qb);
    0.5053 * dy * dy + 0.299 * di * di + 0.1957 * dq * dq
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid(w: u32, h: u32, color: [u8; 4]) -> RgbaImage {
        RgbaImage::from_pixel(w, h, Rgba(color))
    }

    #[test]
    fn test_identical_scores_zero() {
        let img = solid(8, 8, [10, 20, 30, 255]);
        assert_eq!(PixelDiff::default().score(&img, &img.clone()), 0.0);
    }

    #[test]
    fn test_completely_different_scores_one() {
        let a = solid(4, 4, [0, 0, 0, 255]);
        let b = solid(4, 4, [255, 255, 255, 255]);
        assert_eq!(PixelDiff::default().score(&a, &b), 1.0);
    }

    #[test]
    fn test_fraction_of_changed_pixels() {
        let a = solid(10, 10, [0, 0, 0, 255]);
        let mut b = a.clone();
        b.put_pixel(3, 3, Rgba([255, 0, 0, 255]));
        let score = PixelDiff::default().score(&a, &b);
        assert!((score - 0.01).abs() < 1e-12);
    }

    #[test]
    fn test_slight_tint_ignored() {
        let a = solid(4, 4, [100, 100, 100, 255]);
        let b = solid(4, 4, [101, 100, 100, 255]);
        assert_eq!(PixelDiff::default().score(&a, &b), 0.0);
    }

    #[test]
    fn test_transparent_pixels_compare_equal() {
        let a = solid(4, 4, [0, 0, 0, 0]);
        let b = solid(4, 4, [255, 0, 255, 0]);
        assert_eq!(PixelDiff::default().score(&a, &b), 0.0);
    }

    #[test]
    fn test_size_mismatch_is_maximal() {
        let a = solid(4, 4, [0, 0, 0, 255]);
        let b = solid(4, 5, [0, 0, 0, 255]);
        assert_eq!(PixelDiff::default().score(&a, &b), 1.0);
    }
}
