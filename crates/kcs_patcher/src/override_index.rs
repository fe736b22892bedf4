//! Override indexing.
//!
//! The [`OverrideIndex`] is built by scanning every configured mod directory.
//! Each leaf file is classified as an `original` (what the game ships) or a
//! `patched` replacement, and filed under the virtual asset directory it
//! applies to:
//!
//! 1. **Directory rule**: the nearest ancestor directory literally named
//!    `original` or `patched` decides the variant; the target key is the
//!    file's directory path with that one segment removed.
//!    `kcs2/img/original/ship.png` → `/kcs2/img`, entry `ship.png`.
//! 2. **Prefix rule**: otherwise the filename must start with `original` or
//!    `patched`; the prefix is stripped from the entry name and the target key
//!    is the file's directory path.
//!    `kcs2/img/patchedship.png` → `/kcs2/img`, entry `ship.png`.
//!
//! Files matching neither rule are logged and skipped. Hidden entries
//! (leading `.`), markdown files and the descriptor itself are ignored.
//!
//! Subdirectories are scanned concurrently on the rayon pool. Each subtree
//! returns its findings to its parent, and only the single-threaded
//! [`OverrideIndexBuilder`] inserts them, so the finished index is immutable
//! and can be published in one step.

use crate::descriptor::{ModDescriptor, ResolvedMod};
use crate::error::{Error, Result};
use crate::utils::target_key;
use camino::{Utf8Path, Utf8PathBuf};
use rayon::prelude::*;
use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, Instant};

/// Which side of an override pair a file is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Variant {
    Original,
    Patched,
}

impl Variant {
    const ALL: [Variant; 2] = [Variant::Original, Variant::Patched];

    pub fn as_str(&self) -> &'static str {
        match self {
            Variant::Original => "original",
            Variant::Patched => "patched",
        }
    }

    fn from_segment(segment: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|v| v.as_str() == segment)
    }
}

/// One physical override file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverrideEntry {
    pub variant: Variant,
    /// Filename with any classification prefix stripped, suffixed with the
    /// owning mod's name and version.
    pub name: String,
    pub source_path: Utf8PathBuf,
}

/// All overrides declared for one virtual directory.
///
/// Both maps are keyed by entry name and iterate in name order.
#[derive(Debug, Clone, Default)]
pub struct OverrideSet {
    pub original: BTreeMap<String, OverrideEntry>,
    pub patched: BTreeMap<String, OverrideEntry>,
}

impl OverrideSet {
    fn side_mut(&mut self, variant: Variant) -> &mut BTreeMap<String, OverrideEntry> {
        match variant {
            Variant::Original => &mut self.original,
            Variant::Patched => &mut self.patched,
        }
    }

    /// Originals paired with their patched counterpart, in name order.
    /// The counterpart is `None` for an orphaned original.
    pub fn pairs(&self) -> impl Iterator<Item = (&OverrideEntry, Option<&OverrideEntry>)> {
        self.original
            .iter()
            .map(|(name, original)| (original, self.patched.get(name)))
    }

    /// Names of originals without a patched counterpart.
    pub fn orphaned(&self) -> impl Iterator<Item = &str> {
        self.original
            .keys()
            .filter(|name| !self.patched.contains_key(*name))
            .map(String::as_str)
    }

    /// Names of patched files without an original to match against.
    pub fn unmatched_patched(&self) -> impl Iterator<Item = &str> {
        self.patched
            .keys()
            .filter(|name| !self.original.contains_key(*name))
            .map(String::as_str)
    }
}

/// Immutable map from virtual directory key (`/kcs2/img/common`) to the
/// overrides declared for it.
#[derive(Debug, Clone, Default)]
pub struct OverrideIndex {
    targets: HashMap<String, OverrideSet>,
}

/// Summary of an index build.
#[derive(Debug, Clone, Default)]
pub struct IndexBuildReport {
    /// Mods whose directory was scanned to completion.
    pub mods_scanned: usize,
    /// Mods that failed to resolve or scan, with the reason.
    pub mods_failed: Vec<(Utf8PathBuf, String)>,
    /// Override files indexed.
    pub entries: usize,
    /// Files skipped because they matched neither layout rule.
    pub invalid_paths: usize,
    /// Originals with no patched counterpart.
    pub orphaned: usize,
    pub elapsed: Duration,
}

impl OverrideIndex {
    /// Build an index from an ordered list of mods.
    ///
    /// A mod that cannot be resolved or scanned is logged, recorded in the
    /// report and skipped; the remaining mods are still indexed.
    pub fn build(mods: &[ModDescriptor]) -> (Self, IndexBuildReport) {
        let start = Instant::now();
        let mut builder = OverrideIndexBuilder::default();

        for descriptor in mods {
            tracing::info!("Preparing mod {}", descriptor.root());
            if let Err(e) = builder.scan_mod(descriptor) {
                tracing::error!("Failed to index mod '{}': {}", descriptor.descriptor_path, e);
                builder
                    .report
                    .mods_failed
                    .push((descriptor.descriptor_path.clone(), e.to_string()));
            }
        }

        let (index, mut report) = builder.finish();
        report.elapsed = start.elapsed();
        tracing::info!(
            "Preparing mod images took {} ms: {} targets, {} entries, {} invalid, {} orphaned",
            report.elapsed.as_millis(),
            index.len(),
            report.entries,
            report.invalid_paths,
            report.orphaned
        );

        (index, report)
    }

    /// Overrides declared for exactly this directory key.
    pub fn get(&self, key: &str) -> Option<&OverrideSet> {
        self.targets.get(key)
    }

    /// All directory keys, sorted.
    pub fn keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.targets.keys().map(String::as_str).collect();
        keys.sort_unstable();
        keys
    }

    /// Number of directory keys.
    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

/// Accumulates scanned mods into a new [`OverrideIndex`].
#[derive(Debug, Default)]
pub struct OverrideIndexBuilder {
    targets: HashMap<String, OverrideSet>,
    report: IndexBuildReport,
}

impl OverrideIndexBuilder {
    /// Scan one mod and merge its overrides.
    ///
    /// Returns the number of entries the mod contributed. The whole tree is
    /// scanned before anything is merged, so an I/O error leaves the builder
    /// without any of this mod's entries.
    pub fn scan_mod(&mut self, descriptor: &ModDescriptor) -> Result<usize> {
        let resolved = descriptor.resolve()?;
        let scanned = scan_dir(&resolved.root, &[], &resolved)?;

        let mut added = 0;
        for item in scanned {
            match item {
                Scanned::Entry { target, entry } => {
                    self.insert(target, entry);
                    added += 1;
                }
                Scanned::Invalid(path) => {
                    tracing::error!("{}", Error::InvalidOverridePath(path));
                    self.report.invalid_paths += 1;
                }
            }
        }

        tracing::debug!(
            "Mod '{}' version '{}' contributed {} entries",
            resolved.name,
            resolved.version,
            added
        );
        self.report.mods_scanned += 1;
        self.report.entries += added;
        Ok(added)
    }

    fn insert(&mut self, target: String, entry: OverrideEntry) {
        let side = self.targets.entry(target).or_default().side_mut(entry.variant);
        if let Some(prev) = side.insert(entry.name.clone(), entry) {
            tracing::warn!(
                "Override '{}' replaced by a later file (prev={})",
                prev.name,
                prev.source_path
            );
        }
    }

    /// Finish building. Orphaned originals and unmatched patched files are
    /// reported here; they stay in the index and are skipped at resolve time.
    pub fn finish(self) -> (OverrideIndex, IndexBuildReport) {
        let Self {
            targets,
            mut report,
        } = self;

        for (key, set) in &targets {
            for name in set.orphaned() {
                tracing::warn!("Missing {name} in patched under {key}");
                report.orphaned += 1;
            }
            for name in set.unmatched_patched() {
                tracing::warn!("Patched {name} under {key} has no original and will never apply");
            }
        }

        (OverrideIndex { targets }, report)
    }
}

/// Result of classifying one file during a scan.
#[derive(Debug)]
enum Scanned {
    Entry { target: String, entry: OverrideEntry },
    Invalid(Utf8PathBuf),
}

/// Recursively scan `dir`, whose path relative to the mod root is `rel_dirs`.
///
/// Files are classified in name order before subdirectories (also in name
/// order), so the result order is stable across runs.
fn scan_dir(dir: &Utf8Path, rel_dirs: &[String], owner: &ResolvedMod) -> Result<Vec<Scanned>> {
    let mut files = Vec::new();
    let mut subdirs = Vec::new();

    for entry in std::fs::read_dir(dir.as_std_path())? {
        let entry = entry?;
        let path = match Utf8PathBuf::from_path_buf(entry.path()) {
            Ok(p) => p,
            Err(p) => {
                tracing::warn!("Skipping non-UTF-8 path: {}", p.display());
                continue;
            }
        };

        let Some(name) = path.file_name() else {
            continue;
        };
        if name.starts_with('.') || name.to_ascii_lowercase().ends_with(".md") {
            continue;
        }
        if rel_dirs.is_empty() && owner.descriptor_path.file_name() == Some(name) {
            continue;
        }

        if path.as_std_path().is_dir() {
            subdirs.push(path);
        } else if path.as_std_path().is_file() {
            files.push(path);
        }
    }

    files.sort_unstable();
    subdirs.sort_unstable();

    let mut scanned: Vec<Scanned> = files
        .into_iter()
        .map(|path| classify(path, rel_dirs, owner))
        .collect();

    let nested = subdirs
        .par_iter()
        .map(|sub| {
            let mut rel = rel_dirs.to_vec();
            rel.push(sub.file_name().unwrap_or_default().to_string());
            scan_dir(sub, &rel, owner)
        })
        .collect::<Result<Vec<_>>>()?;

    scanned.extend(nested.into_iter().flatten());
    Ok(scanned)
}

fn classify(path: Utf8PathBuf, rel_dirs: &[String], owner: &ResolvedMod) -> Scanned {
    let file_name = path.file_name().unwrap_or_default().to_string();

    match classify_parts(rel_dirs, &file_name) {
        Some((target, variant, stripped)) => Scanned::Entry {
            target,
            entry: OverrideEntry {
                variant,
                name: format!("{stripped}{}", owner.name_suffix()),
                source_path: path,
            },
        },
        None => Scanned::Invalid(path),
    }
}

/// Apply the directory rule, then the prefix rule. Returns the target key,
/// the variant and the filename with any classification prefix removed.
fn classify_parts<'a>(
    rel_dirs: &[String],
    file_name: &'a str,
) -> Option<(String, Variant, &'a str)> {
    if let Some(pos) = rel_dirs
        .iter()
        .rposition(|segment| Variant::from_segment(segment).is_some())
    {
        let variant = Variant::from_segment(&rel_dirs[pos])?;
        let mut dirs = rel_dirs.to_vec();
        dirs.remove(pos);
        return Some((target_key(&dirs), variant, file_name));
    }

    Variant::ALL.into_iter().find_map(|variant| {
        file_name
            .strip_prefix(variant.as_str())
            .map(|stripped| (target_key(rel_dirs), variant, stripped))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn segs(s: &[&str]) -> Vec<String> {
        s.iter().map(|s| s.to_string()).collect()
    }

    fn write(root: &std::path::Path, rel: &str, bytes: &[u8]) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, bytes).unwrap();
    }

    fn create_mod(root: &std::path::Path, name: &str, version: &str) -> ModDescriptor {
        fs::create_dir_all(root).unwrap();
        let descriptor = root.join("mod.json");
        fs::write(
            &descriptor,
            format!(r#"{{"name":"{name}","version":"{version}"}}"#),
        )
        .unwrap();
        ModDescriptor::new(Utf8PathBuf::from_path_buf(descriptor).unwrap())
    }

    #[test]
    fn test_classify_directory_rule() {
        let (target, variant, name) =
            classify_parts(&segs(&["kcs2", "img", "original"]), "ship.png").unwrap();
        assert_eq!(target, "/kcs2/img");
        assert_eq!(variant, Variant::Original);
        assert_eq!(name, "ship.png");
    }

    #[test]
    fn test_classify_nearest_ancestor() {
        let (target, variant, _) =
            classify_parts(&segs(&["kcs2", "patched", "sub"]), "ship.png").unwrap();
        assert_eq!(target, "/kcs2/sub");
        assert_eq!(variant, Variant::Patched);

        let (_, variant, _) =
            classify_parts(&segs(&["original", "patched"]), "ship.png").unwrap();
        assert_eq!(variant, Variant::Patched);
    }

    #[test]
    fn test_classify_prefix_rule() {
        let (target, variant, name) =
            classify_parts(&segs(&["kcs2", "img"]), "patchedship.png").unwrap();
        assert_eq!(target, "/kcs2/img");
        assert_eq!(variant, Variant::Patched);
        assert_eq!(name, "ship.png");
    }

    #[test]
    fn test_classify_root_level() {
        let (target, variant, _) = classify_parts(&[], "originalship.png").unwrap();
        assert_eq!(target, "/");
        assert_eq!(variant, Variant::Original);
    }

    #[test]
    fn test_classify_invalid() {
        assert!(classify_parts(&segs(&["kcs2", "img"]), "ship.png").is_none());
        assert!(classify_parts(&segs(&["originals"]), "ship.png").is_none());
    }

    #[test]
    fn test_build_index() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("icons");
        let desc = create_mod(&root, "icons", "1.0");
        write(&root, "kcs2/img/common/original/ship.png", b"orig");
        write(&root, "kcs2/img/common/patched/ship.png", b"new");
        write(&root, "kcs2/img/originalbanner.png", b"orig2");
        write(&root, "kcs2/img/patchedbanner.png", b"new2");
        write(&root, "kcs2/img/README.md", b"docs");
        write(&root, ".git/original/ship.png", b"hidden");
        write(&root, "kcs2/stray.png", b"stray");

        let (index, report) = OverrideIndex::build(&[desc]);
        assert_eq!(report.mods_scanned, 1);
        assert_eq!(report.entries, 4);
        assert_eq!(report.invalid_paths, 1);
        assert_eq!(report.orphaned, 0);
        assert_eq!(index.keys(), vec!["/kcs2/img", "/kcs2/img/common"]);

        let common = index.get("/kcs2/img/common").unwrap();
        assert!(common.original.contains_key("ship.pngicons1.0"));
        assert!(common.patched.contains_key("ship.pngicons1.0"));

        let img = index.get("/kcs2/img").unwrap();
        let pairs: Vec<_> = img.pairs().collect();
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].0.name, "banner.pngicons1.0");
        assert!(pairs[0].1.is_some());
    }

    #[test]
    fn test_mods_do_not_collide() {
        let dir = tempdir().unwrap();
        let a = dir.path().join("a");
        let b = dir.path().join("b");
        let desc_a = create_mod(&a, "a", "1");
        let desc_b = create_mod(&b, "b", "1");
        write(&a, "kcs2/original/ship.png", b"orig");
        write(&a, "kcs2/patched/ship.png", b"from-a");
        write(&b, "kcs2/original/ship.png", b"orig");
        write(&b, "kcs2/patched/ship.png", b"from-b");

        let (index, _) = OverrideIndex::build(&[desc_a, desc_b]);
        let set = index.get("/kcs2").unwrap();
        assert_eq!(set.original.len(), 2);
        assert_eq!(set.patched.len(), 2);
    }

    #[test]
    fn test_orphan_reported() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("m");
        let desc = create_mod(&root, "m", "1");
        write(&root, "kcs2/original/foo.png", b"orig");

        let (index, report) = OverrideIndex::build(&[desc]);
        assert_eq!(report.orphaned, 1);
        let set = index.get("/kcs2").unwrap();
        assert_eq!(set.orphaned().collect::<Vec<_>>(), vec!["foo.pngm1"]);
    }

    #[test]
    fn test_failed_scan_contributes_nothing() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("ok");
        let desc = create_mod(&root, "ok", "1");
        write(&root, "kcs2/original/foo.png", b"orig");
        write(&root, "kcs2/patched/foo.png", b"new");

        let mut builder = OverrideIndexBuilder::default();
        assert_eq!(builder.scan_mod(&desc).unwrap(), 2);

        let missing = ModDescriptor::new(
            Utf8PathBuf::from_path_buf(dir.path().join("gone/mod.json")).unwrap(),
        );
        assert!(builder.scan_mod(&missing).is_err());

        let (index, report) = builder.finish();
        assert_eq!(report.entries, 2);
        assert_eq!(report.mods_scanned, 1);
        assert_eq!(index.keys(), vec!["/kcs2"]);
    }

    #[test]
    fn test_failed_mod_does_not_stop_others() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("ok");
        let desc = create_mod(&root, "ok", "1");
        write(&root, "kcs2/original/foo.png", b"orig");
        write(&root, "kcs2/patched/foo.png", b"new");

        let missing = ModDescriptor::new(
            Utf8PathBuf::from_path_buf(dir.path().join("gone/mod.json")).unwrap(),
        );

        let (index, report) = OverrideIndex::build(&[missing, desc]);
        assert_eq!(report.mods_failed.len(), 1);
        assert_eq!(report.mods_scanned, 1);
        assert!(index.get("/kcs2").is_some());
    }

    #[test]
    fn test_scan_order_is_stable() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("m");
        let desc = create_mod(&root, "m", "");
        for name in ["c", "a", "b"] {
            write(&root, &format!("x/{name}/original/f.png"), b"o");
        }

        let resolved = desc.resolve().unwrap();
        let first: Vec<String> = scan_dir(&resolved.root, &[], &resolved)
            .unwrap()
            .into_iter()
            .filter_map(|s| match s {
                Scanned::Entry { target, .. } => Some(target),
                Scanned::Invalid(_) => None,
            })
            .collect();
        assert_eq!(first, vec!["/x/a", "/x/b", "/x/c"]);
    }
}
