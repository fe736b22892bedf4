//! Application configuration management utilities.

use crate::errors::CliError;
use camino::{Utf8Path, Utf8PathBuf};
use kcs_patcher::prepatch::DEFAULT_PREPATCH_CONCURRENCY;
use kcs_patcher::ModDescriptor;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::io;

pub const CONFIG_FILE_NAME: &str = "kcs-patcher.toml";

/// Patched outputs live in this subdirectory of the response cache unless
/// configured otherwise.
const DEFAULT_PATCHED_SUBDIR: &str = "modded";

/// Application-wide configuration stored in kcs-patcher.toml.
///
/// Relative paths are resolved against the directory containing the
/// configuration file.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct AppConfig {
    pub enable_modder: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_dir: Option<Utf8PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub patched_cache_dir: Option<Utf8PathBuf>,
    pub prepatch_concurrency: usize,
    pub mods: Vec<ModDescriptor>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            enable_modder: true,
            cache_dir: None,
            patched_cache_dir: None,
            prepatch_concurrency: DEFAULT_PREPATCH_CONCURRENCY,
            mods: Vec::new(),
        }
    }
}

impl AppConfig {
    /// Make every configured path absolute relative to `base_dir`.
    pub fn resolve_paths(&mut self, base_dir: &Utf8Path) {
        let resolve = |path: &mut Utf8PathBuf| {
            if path.is_relative() {
                *path = base_dir.join(&*path);
            }
        };

        if let Some(dir) = self.cache_dir.as_mut() {
            resolve(dir);
        }
        if let Some(dir) = self.patched_cache_dir.as_mut() {
            resolve(dir);
        }
        for descriptor in &mut self.mods {
            resolve(&mut descriptor.descriptor_path);
        }
    }

    /// Where patched outputs are stored: `patched_cache_dir`, or the `modded`
    /// subdirectory of `cache_dir`.
    pub fn patched_cache_dir(&self) -> Option<Utf8PathBuf> {
        self.patched_cache_dir.clone().or_else(|| {
            self.cache_dir
                .as_ref()
                .map(|dir| dir.join(DEFAULT_PATCHED_SUBDIR))
        })
    }
}

/// Returns the directory where the current executable resides.
pub fn install_dir() -> Option<Utf8PathBuf> {
    let exe = env::current_exe().ok()?;
    let parent = exe.parent()?;
    Utf8PathBuf::from_path_buf(parent.to_path_buf()).ok()
}

/// Returns the default configuration file path (kcs-patcher.toml next to the
/// executable).
pub fn default_config_path() -> Option<Utf8PathBuf> {
    install_dir().map(|dir| dir.join(CONFIG_FILE_NAME))
}

/// Loads the configuration at `path`.
/// Returns the default configuration if the file doesn't exist.
pub fn load_config(path: &Utf8Path) -> Result<AppConfig, CliError> {
    if !path.as_std_path().exists() {
        tracing::debug!("No configuration at {}, using defaults", path);
        return Ok(AppConfig::default());
    }

    let content = fs::read_to_string(path.as_std_path())?;
    let mut cfg: AppConfig = toml::from_str(&content)
        .map_err(|e| CliError::config_parse_error(path.to_path_buf(), e))?;

    if let Some(base_dir) = path.parent() {
        cfg.resolve_paths(base_dir);
    }
    Ok(cfg)
}

/// Saves the configuration to `path`.
pub fn save_config(path: &Utf8Path, cfg: &AppConfig) -> io::Result<()> {
    let content = toml::to_string_pretty(cfg).map_err(io::Error::other)?;
    fs::write(path.as_std_path(), content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_missing_file_is_default() {
        let dir = tempdir().unwrap();
        let path = Utf8PathBuf::from_path_buf(dir.path().join(CONFIG_FILE_NAME)).unwrap();

        let cfg = load_config(&path).unwrap();
        assert_eq!(cfg, AppConfig::default());
        assert!(cfg.enable_modder);
        assert_eq!(cfg.prepatch_concurrency, 2);
    }

    #[test]
    fn test_load_resolves_relative_paths() {
        let dir = tempdir().unwrap();
        let base = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
        let path = base.join(CONFIG_FILE_NAME);
        fs::write(
            &path,
            r#"
enable_modder = false
cache_dir = "cache"
prepatch_concurrency = 4

[[mods]]
path = "mods/icons/mod.json"
name = "icons"
"#,
        )
        .unwrap();

        let cfg = load_config(&path).unwrap();
        assert!(!cfg.enable_modder);
        assert_eq!(cfg.prepatch_concurrency, 4);
        assert_eq!(cfg.cache_dir, Some(base.join("cache")));
        assert_eq!(cfg.patched_cache_dir(), Some(base.join("cache/modded")));
        assert_eq!(cfg.mods.len(), 1);
        assert_eq!(cfg.mods[0].descriptor_path, base.join("mods/icons/mod.json"));
        assert_eq!(cfg.mods[0].name.as_deref(), Some("icons"));
        assert_eq!(cfg.mods[0].version, None);
    }

    #[test]
    fn test_explicit_patched_cache_dir() {
        let cfg = AppConfig {
            cache_dir: Some("cache".into()),
            patched_cache_dir: Some("elsewhere".into()),
            ..Default::default()
        };
        assert_eq!(cfg.patched_cache_dir(), Some(Utf8PathBuf::from("elsewhere")));
    }

    #[test]
    fn test_invalid_toml_is_error() {
        let dir = tempdir().unwrap();
        let path = Utf8PathBuf::from_path_buf(dir.path().join(CONFIG_FILE_NAME)).unwrap();
        fs::write(&path, "mods = [").unwrap();

        assert!(matches!(
            load_config(&path),
            Err(CliError::ConfigParseError { .. })
        ));
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempdir().unwrap();
        let base = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
        let path = base.join(CONFIG_FILE_NAME);
        let cfg = AppConfig {
            cache_dir: Some(base.join("cache")),
            mods: vec![ModDescriptor::new(base.join("m/mod.json"))],
            ..Default::default()
        };

        save_config(&path, &cfg).unwrap();
        assert_eq!(load_config(&path).unwrap(), cfg);
    }
}
