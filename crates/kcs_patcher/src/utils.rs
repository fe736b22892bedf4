//! Path normalization and fingerprint utilities.
//!
//! These functions bridge the gap between how requests name an asset
//! (`/kcs2/img/common/foo.png?version=3`) and the `/`-joined directory keys
//! the [`OverrideIndex`](crate::OverrideIndex) is built from.

use camino::Utf8Path;
use serde::{Deserialize, Serialize};
use std::fmt;
use xxhash_rust::xxh3::Xxh3;

/// Extension (lowercase, without the dot) of assets routed to the atlas applier.
pub const IMAGE_EXTENSION: &str = "png";

/// Normalize a requested asset path for index lookup.
///
/// - Backslashes become `/`.
/// - A query string (`?...`) or fragment (`#...`) is dropped.
/// - Empty and `.` segments are removed, and `..` removes the segment before
///   it. Nothing climbs above the root.
/// - A leading `/` is ensured.
pub fn normalize_request_path(path: &str) -> String {
    let path = path
        .split(['?', '#'])
        .next()
        .unwrap_or_default()
        .replace('\\', "/");

    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            segment => segments.push(segment),
        }
    }

    target_key(&segments)
}

/// Build an index target key from directory segments.
///
/// The empty segment list is the mod root and maps to `/`.
pub fn target_key<S: AsRef<str>>(segments: &[S]) -> String {
    let mut key = String::from("/");
    key.push_str(
        &segments
            .iter()
            .map(|s| s.as_ref())
            .collect::<Vec<_>>()
            .join("/"),
    );
    key
}

/// Every directory key a normalized request path can be overridden from,
/// deepest first.
///
/// For `/kcs2/img/common/foo.png` this yields `/kcs2/img/common`,
/// `/kcs2/img`, `/kcs2` and finally `/`.
pub fn ancestor_keys(normalized_path: &str) -> Vec<String> {
    let segments: Vec<&str> = normalized_path
        .split('/')
        .filter(|s| !s.is_empty())
        .collect();

    if segments.is_empty() {
        return Vec::new();
    }

    let dirs = &segments[..segments.len() - 1];
    (0..=dirs.len())
        .rev()
        .map(|depth| target_key(&dirs[..depth]))
        .collect()
}

/// Whether an asset goes through the image (atlas) applier.
pub fn is_image_asset(path: &str) -> bool {
    Utf8Path::new(path)
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case(IMAGE_EXTENSION))
}

/// Location of the spritesheet metadata that may accompany a stored image.
pub fn companion_meta_path(stored_file: &Utf8Path) -> camino::Utf8PathBuf {
    stored_file.with_extension("json")
}

/// Deterministic hash of the patched contents that apply to one asset.
///
/// Part of the patched-cache key: when any applicable patched file changes,
/// is added or removed, the fingerprint changes and the cached result is
/// ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PatchFingerprint(pub u64);

impl fmt::Display for PatchFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Compute the [`PatchFingerprint`] for a set of `(name, patched_bytes)` pairs.
///
/// Pairs are sorted by name before hashing so the result does not depend on
/// the order the filesystem (or a hash map) produced them in. Each content is
/// length-prefixed so adjacent contents cannot alias each other.
pub fn compute_patch_fingerprint<N, B>(patches: &[(N, B)]) -> PatchFingerprint
where
    N: AsRef<str>,
    B: AsRef<[u8]>,
{
    let mut sorted: Vec<&(N, B)> = patches.iter().collect();
    sorted.sort_by(|(a, _), (b, _)| a.as_ref().cmp(b.as_ref()));

    let mut hasher = Xxh3::new();
    for (_, bytes) in sorted {
        let bytes = bytes.as_ref();
        hasher.update(&(bytes.len() as u64).to_le_bytes());
        hasher.update(bytes);
    }

    PatchFingerprint(hasher.digest())
}
