//! Mod descriptors.
//!
//! A mod is configured by pointing at its descriptor file. The directory that
//! contains the descriptor is the root that gets scanned for overrides, and the
//! descriptor's `name`/`version` are appended to every entry name so two mods
//! replacing the same original file never collide in the index.
//!
//! ```text
//! mods/better-icons/
//!   mod.json                     # { "name": "better-icons", "version": "1.2" }
//!   kcs2/img/common/
//!     original/icon.png          # what the game ships
//!     patched/icon.png           # what to serve instead
//! ```

use crate::error::{Error, Result};
use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};

/// One configured mod.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModDescriptor {
    /// Path to the descriptor file. Its parent directory is the scan root.
    #[serde(rename = "path")]
    pub descriptor_path: Utf8PathBuf,
    /// Display name; read from the descriptor file when not configured.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Version string; read from the descriptor file when not configured.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

/// Contents of a descriptor file. Unknown keys are ignored.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ModMeta {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
}

/// A descriptor with its metadata resolved and its scan root computed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedMod {
    pub descriptor_path: Utf8PathBuf,
    pub root: Utf8PathBuf,
    pub name: String,
    pub version: String,
}

impl ResolvedMod {
    /// Suffix appended to every entry name contributed by this mod.
    pub fn name_suffix(&self) -> String {
        format!("{}{}", self.name, self.version)
    }
}

impl ModDescriptor {
    pub fn new(descriptor_path: impl Into<Utf8PathBuf>) -> Self {
        Self {
            descriptor_path: descriptor_path.into(),
            name: None,
            version: None,
        }
    }

    /// Directory scanned for this mod's overrides.
    pub fn root(&self) -> &Utf8Path {
        self.descriptor_path
            .parent()
            .filter(|parent| !parent.as_str().is_empty())
            .unwrap_or_else(|| Utf8Path::new("."))
    }

    /// Resolve name and version, reading the descriptor file for whatever the
    /// configuration left unset.
    pub fn resolve(&self) -> Result<ResolvedMod> {
        if !self.descriptor_path.as_std_path().is_file() {
            return Err(Error::DescriptorNotFound(self.descriptor_path.clone()));
        }

        let meta = if self.name.is_some() && self.version.is_some() {
            ModMeta::default()
        } else {
            let contents = std::fs::read(self.descriptor_path.as_std_path())?;
            match serde_json::from_slice::<ModMeta>(&contents) {
                Ok(meta) => meta,
                // Configured values are enough to identify the mod
                Err(e) if self.name.is_some() || self.version.is_some() => {
                    tracing::warn!(
                        "Ignoring unreadable descriptor '{}': {}",
                        self.descriptor_path,
                        e
                    );
                    ModMeta::default()
                }
                Err(e) => return Err(e.into()),
            }
        };

        Ok(ResolvedMod {
            descriptor_path: self.descriptor_path.clone(),
            root: self.root().to_path_buf(),
            name: self.name.clone().or(meta.name).unwrap_or_default(),
            version: self.version.clone().or(meta.version).unwrap_or_default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn utf8(path: &std::path::Path) -> Utf8PathBuf {
        Utf8PathBuf::from_path_buf(path.to_path_buf()).unwrap()
    }

    #[test]
    fn test_root_is_parent() {
        let desc = ModDescriptor::new("mods/icons/mod.json");
        assert_eq!(desc.root(), Utf8Path::new("mods/icons"));
        assert_eq!(ModDescriptor::new("mod.json").root(), Utf8Path::new("."));
    }

    #[test]
    fn test_resolve_reads_descriptor() {
        let dir = tempdir().unwrap();
        let path = utf8(&dir.path().join("mod.json"));
        fs::write(&path, r#"{"name":"icons","version":"1.2","author":"x"}"#).unwrap();

        let resolved = ModDescriptor::new(path.clone()).resolve().unwrap();
        assert_eq!(resolved.name, "icons");
        assert_eq!(resolved.version, "1.2");
        assert_eq!(resolved.root, utf8(dir.path()));
        assert_eq!(resolved.name_suffix(), "icons1.2");
    }

    #[test]
    fn test_configured_values_win() {
        let dir = tempdir().unwrap();
        let path = utf8(&dir.path().join("mod.json"));
        fs::write(&path, r#"{"name":"icons","version":"1.2"}"#).unwrap();

        let desc = ModDescriptor {
            descriptor_path: path,
            name: Some("renamed".to_string()),
            version: None,
        };
        let resolved = desc.resolve().unwrap();
        assert_eq!(resolved.name, "renamed");
        assert_eq!(resolved.version, "1.2");
    }

    #[test]
    fn test_invalid_json_tolerated_with_configured_name() {
        let dir = tempdir().unwrap();
        let path = utf8(&dir.path().join("mod.json"));
        fs::write(&path, "not json").unwrap();

        let desc = ModDescriptor {
            descriptor_path: path.clone(),
            name: Some("icons".to_string()),
            version: None,
        };
        assert_eq!(desc.resolve().unwrap().version, "");
        assert!(matches!(
            ModDescriptor::new(path).resolve(),
            Err(Error::Json(_))
        ));
    }

    #[test]
    fn test_missing_descriptor() {
        let dir = tempdir().unwrap();
        let path = utf8(&dir.path().join("missing.json"));
        assert!(matches!(
            ModDescriptor::new(path).resolve(),
            Err(Error::DescriptorNotFound(_))
        ));
    }
}
