use camino::Utf8PathBuf;
use miette::Diagnostic;
use thiserror::Error;

#[derive(Error, Debug, Diagnostic)]
pub enum CliError {
    #[error("Could not determine config path")]
    #[diagnostic(
        code(config::path_unknown),
        help("Pass the configuration file explicitly with --config <path>")
    )]
    ConfigPathUnknown,

    #[error("Configuration file error: {path}")]
    #[diagnostic(
        code(config::parse_error),
        help("Check the configuration file for TOML syntax errors")
    )]
    ConfigParseError {
        path: Utf8PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Configuration file already exists: {path}")]
    #[diagnostic(
        code(config::already_exists),
        help("Edit the existing file, or remove it before running 'config init' again")
    )]
    ConfigExists { path: Utf8PathBuf },

    #[error("Response cache directory is not configured")]
    #[diagnostic(
        code(config::cache_dir_missing),
        help("Set cache_dir in the configuration file to the proxy's cache directory")
    )]
    CacheDirNotSet,

    #[error("Asset is not cached: {key}")]
    #[diagnostic(
        code(cache::asset_missing),
        help("Asset keys are paths relative to cache_dir, e.g. /kcs2/img/common/sheet.png")
    )]
    AssetNotCached { key: String },

    #[error("Patching failed")]
    #[diagnostic(code(patcher::failed))]
    Patcher {
        #[from]
        source: kcs_patcher::Error,
    },

    #[error("IO operation failed")]
    #[diagnostic(code(io::operation_failed))]
    IoError {
        #[from]
        source: std::io::Error,
    },
}

impl CliError {
    pub fn config_parse_error(path: Utf8PathBuf, source: toml::de::Error) -> Self {
        Self::ConfigParseError { path, source }
    }

    pub fn config_exists(path: Utf8PathBuf) -> Self {
        Self::ConfigExists { path }
    }

    pub fn asset_not_cached(key: impl Into<String>) -> Self {
        Self::AssetNotCached { key: key.into() }
    }
}
