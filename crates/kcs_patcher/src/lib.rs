//! Mod override engine for cached game assets.
//!
//! This crate replaces assets served from a local response cache with
//! community mod replacements. It supports:
//!
//! - **Override indexing**: Pair `original`/`patched` files from every mod
//! - **Ancestor matching**: Overrides declared at any directory level apply
//! - **Atlas patching**: Replace individual frames inside a texture atlas
//! - **Result caching**: Skip image work when neither the mods nor the asset changed
//! - **Batch prepatching**: Patch the whole cache ahead of time
//!
//! # Example
//!
//! ```no_run
//! use camino::Utf8Path;
//! use kcs_patcher::{
//!     prepatch, DirResponseCache, FsPatchedCache, ModDescriptor, Patcher, PrepatchOptions,
//! };
//! use std::sync::Arc;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let cache = Arc::new(FsPatchedCache::open("cache/modded")?);
//! let patcher = Patcher::new(cache);
//!
//! let report = patcher.reload_index(&[ModDescriptor::new("mods/ship-icons/mod.json")]);
//! println!("Indexed {} override files", report.entries);
//!
//! let responses = DirResponseCache::new("cache").exclude(Utf8Path::new("cache/modded"));
//! let options = PrepatchOptions::new().with_progress(|progress| {
//!     println!("{}/{} {}", progress.current, progress.total, progress.key);
//! });
//!
//! let summary = prepatch(&patcher, &responses, &options)?;
//! println!("Patched {}, unchanged {}", summary.patched, summary.unchanged);
//! # Ok(())
//! # }
//! ```

pub mod atlas;
pub mod descriptor;
pub mod diff;
pub mod error;
pub mod exact_match;
pub mod override_index;
pub mod patched_cache;
pub mod prepatch;
pub mod resolver;
pub mod response_cache;
pub mod spritesheet;
pub mod utils;

// Re-export main types
pub use descriptor::ModDescriptor;
pub use diff::{ImageDiff, PixelDiff, DIFF_THRESHOLD};
pub use error::{Error, Result};
pub use override_index::{IndexBuildReport, OverrideEntry, OverrideIndex, OverrideSet, Variant};
pub use patched_cache::{FsPatchedCache, MemoryPatchedCache, PatchedCache};
pub use prepatch::{prepatch, PrepatchOptions, PrepatchProgress, PrepatchSummary};
pub use resolver::{Candidate, PatchOutcome, Patcher};
pub use response_cache::{AssetMeta, CachedAsset, DirResponseCache, ResponseCache};
pub use utils::PatchFingerprint;
