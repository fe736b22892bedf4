use crate::errors::CliError;
use crate::println_pad;
use crate::utils::config::{self, AppConfig};
use camino::{Utf8Path, Utf8PathBuf};
use colored::Colorize;
use kcs_patcher::{DirResponseCache, FsPatchedCache, IndexBuildReport, Patcher};
use miette::Result;
use std::sync::Arc;

mod config_cmd;
mod index;
mod patch;
mod prepatch;

pub use config_cmd::{init_config, show_config};
pub use index::{show_index, ShowIndexArgs};
pub use patch::{patch_asset, PatchAssetArgs};
pub use prepatch::{prepatch_cache, PrepatchCacheArgs};

/// Resolved configuration shared by every command.
pub struct CliContext {
    pub config_path: Utf8PathBuf,
    pub config: AppConfig,
}

impl CliContext {
    /// Load the configuration from `--config`, or from next to the executable.
    pub fn load(config_arg: Option<String>) -> Result<Self> {
        let config_path = match config_arg {
            Some(path) => Utf8PathBuf::from(path),
            None => config::default_config_path().ok_or(CliError::ConfigPathUnknown)?,
        };
        let config = config::load_config(&config_path)?;

        Ok(Self {
            config_path,
            config,
        })
    }

    /// Whether work commands should run. Prints a notice when they shouldn't.
    pub fn modder_enabled(&self) -> bool {
        if !self.config.enable_modder {
            println_pad!(
                "{} {}",
                "Modder is disabled".bright_yellow().bold(),
                format!("(enable_modder = false in {})", self.config_path).dimmed()
            );
        }
        self.config.enable_modder
    }

    pub fn cache_dir(&self) -> Result<&Utf8Path, CliError> {
        self.config
            .cache_dir
            .as_deref()
            .ok_or(CliError::CacheDirNotSet)
    }

    /// The response cache, with the patched output directory hidden from it.
    pub fn response_cache(&self) -> Result<DirResponseCache, CliError> {
        let mut cache = DirResponseCache::new(self.cache_dir()?);
        if let Some(patched) = self.config.patched_cache_dir() {
            cache = cache.exclude(patched);
        }
        Ok(cache)
    }

    /// Open the patched cache and build the override index.
    pub fn open_patcher(&self) -> Result<Patcher> {
        let patched_dir = self
            .config
            .patched_cache_dir()
            .ok_or(CliError::CacheDirNotSet)?;
        let cache = FsPatchedCache::open(patched_dir).map_err(CliError::from)?;

        let patcher = Patcher::new(Arc::new(cache));
        let report = patcher.reload_index(&self.config.mods);
        print_index_report(&report);
        Ok(patcher)
    }
}

fn print_index_report(report: &IndexBuildReport) {
    println_pad!(
        "{} {} mods, {} override files in {} ms",
        "🔎 Indexed".bright_blue().bold(),
        report.mods_scanned.to_string().bright_white().bold(),
        report.entries.to_string().bright_white().bold(),
        report.elapsed.as_millis()
    );

    if report.invalid_paths > 0 {
        println_pad!(
            "   {} {} files outside the original/patched layout were skipped",
            "•".bright_yellow(),
            report.invalid_paths
        );
    }
    if report.orphaned > 0 {
        println_pad!(
            "   {} {} originals have no patched counterpart",
            "•".bright_yellow(),
            report.orphaned
        );
    }
    for (path, message) in &report.mods_failed {
        println_pad!(
            "   {} {} {}",
            "✗".bright_red(),
            path.as_str().bright_red(),
            message.dimmed()
        );
    }
}
