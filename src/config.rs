//! Configuration and derived run paths.
//!
//! Tunables are layered with figment, later layers winning:
//!
//! 1. built-in defaults
//! 2. `config.toml` in the platform config directory
//! 3. `DUPESTASH_*` environment variables
//! 4. command-line flags
//!
//! A broken default config file or environment value never stops a run:
//! it is logged and the remaining layers are used. A file named with
//! `--config` must exist and parse (see [`Config::load_from`]), and the
//! target directory must be usable (see [`RunPaths::derive`]).

use directories::ProjectDirs;
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use std::ffi::OsStr;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::pipeline::ScanOptions;
use crate::scanner::{WalkerConfig, DEFAULT_CHUNK_SIZE};

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "DUPESTASH_";

/// Default suffix of the duplicates directory.
pub const DEFAULT_DUPLICATES_SUFFIX: &str = "_duplicates";

/// Problems with the target directory or the configuration layers.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The target does not exist.
    #[error("target directory not found: {0}")]
    NotFound(PathBuf),

    /// The target exists but is not a directory.
    #[error("target is not a directory: {0}")]
    NotADirectory(PathBuf),

    /// The target cannot be listed or resolved.
    #[error("cannot read target directory {path}: {source}")]
    Unreadable {
        /// Target directory
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: io::Error,
    },

    /// No base name can be taken from the target (e.g. `/`).
    #[error("cannot derive a name from {0}; pass --name")]
    NoBaseName(PathBuf),

    /// The name override is empty or contains a path separator.
    #[error("invalid name {0:?}: must be a single path component")]
    InvalidName(String),

    /// The derived duplicates directory would be inside the scan root.
    #[error("duplicates directory {duplicates_root} lies inside scan root {scan_root}")]
    DuplicatesInsideRoot {
        /// Scan root
        scan_root: PathBuf,
        /// Derived duplicates directory
        duplicates_root: PathBuf,
    },

    /// The configuration file passed with `--config` does not exist.
    #[error("configuration file not found: {0}")]
    FileNotFound(PathBuf),

    /// A configuration layer could not be parsed.
    #[error("invalid configuration: {0}")]
    Figment(#[from] figment::Error),
}

/// User-tunable settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Hashing threads; 1 hashes on the main thread
    pub hash_threads: usize,
    /// Bytes read per hashing chunk
    pub chunk_size: usize,
    /// Descend into symlinked directories and hash symlinked files
    pub follow_symlinks: bool,
    /// Skip dot-files and dot-directories
    pub skip_hidden: bool,
    /// Appended to the target's name to form the duplicates directory
    pub duplicates_suffix: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            hash_threads: 1,
            chunk_size: DEFAULT_CHUNK_SIZE,
            follow_symlinks: false,
            skip_hidden: false,
            duplicates_suffix: DEFAULT_DUPLICATES_SUFFIX.to_string(),
        }
    }
}

impl Config {
    /// Load all layers with `overrides` (usually CLI flags) on top.
    ///
    /// If the file or environment layers are invalid the error is logged
    /// and only defaults plus `overrides` are used.
    #[must_use]
    pub fn load_with_overrides<T: Serialize>(overrides: &T) -> Self {
        let layered = Self::figment(Self::config_path().as_deref())
            .merge(Serialized::defaults(overrides))
            .extract();

        match layered {
            Ok(config) => config,
            Err(e) => {
                log::debug!("Failed to load config, using defaults: {}", e);
                Figment::from(Serialized::defaults(Self::default()))
                    .merge(Serialized::defaults(overrides))
                    .extract()
                    .unwrap_or_default()
            }
        }
    }

    /// Defaults, then `file` (if any), then the environment.
    #[must_use]
    pub fn figment(file: Option<&Path>) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));
        if let Some(path) = file {
            figment = figment.merge(Toml::file(path));
        }
        figment.merge(Env::prefixed(ENV_PREFIX))
    }

    /// Load an explicitly chosen file plus environment, with `overrides`
    /// on top. Unlike the default location, a missing or broken file here
    /// is an error.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::FileNotFound`] if `file` does not exist and
    /// [`ConfigError::Figment`] if a layer cannot be parsed.
    pub fn load_from<T: Serialize>(file: &Path, overrides: &T) -> Result<Self, ConfigError> {
        if !file.is_file() {
            return Err(ConfigError::FileNotFound(file.to_path_buf()));
        }
        Ok(Self::figment(Some(file))
            .merge(Serialized::defaults(overrides))
            .extract()?)
    }

    /// Platform-specific config file location.
    #[must_use]
    pub fn config_path() -> Option<PathBuf> {
        ProjectDirs::from("org", "dupestash", "dupestash")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Scan options derived from these settings.
    #[must_use]
    pub fn scan_options(&self) -> ScanOptions {
        ScanOptions {
            walker: WalkerConfig::new(self.follow_symlinks, self.skip_hidden),
            hash_threads: self.hash_threads.max(1),
            chunk_size: self.chunk_size,
        }
    }
}

/// Locations used by one run, all derived from the target directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunPaths {
    /// Canonical scan root
    pub scan_root: PathBuf,
    /// Base name used for the sibling paths
    pub name: String,
    /// `<parent>/<name><suffix>`
    pub duplicates_root: PathBuf,
    /// `<parent>/<name>.db`
    pub index_path: PathBuf,
}

impl RunPaths {
    /// Validate `target` and derive the duplicates directory and index file.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if the target is missing, not a directory
    /// or unreadable, if no usable name exists, or if the duplicates
    /// directory would end up inside the scan root.
    pub fn derive(
        target: &Path,
        name_override: Option<&str>,
        suffix: &str,
    ) -> Result<Self, ConfigError> {
        let metadata = fs::metadata(target).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => ConfigError::NotFound(target.to_path_buf()),
            _ => ConfigError::Unreadable {
                path: target.to_path_buf(),
                source: e,
            },
        })?;
        if !metadata.is_dir() {
            return Err(ConfigError::NotADirectory(target.to_path_buf()));
        }

        let unreadable = |source| ConfigError::Unreadable {
            path: target.to_path_buf(),
            source,
        };
        fs::read_dir(target).map_err(unreadable)?;
        let scan_root = fs::canonicalize(target).map_err(unreadable)?;

        let name = match name_override {
            Some(name) => {
                if name.is_empty() || Path::new(name).file_name() != Some(OsStr::new(name)) {
                    return Err(ConfigError::InvalidName(name.to_string()));
                }
                name.to_string()
            }
            None => scan_root
                .file_name()
                .and_then(|n| n.to_str())
                .map(str::to_string)
                .ok_or_else(|| ConfigError::NoBaseName(scan_root.clone()))?,
        };
        let parent = scan_root
            .parent()
            .ok_or_else(|| ConfigError::NoBaseName(scan_root.clone()))?;

        let duplicates_root = parent.join(format!("{}{}", name, suffix));
        let index_path = parent.join(format!("{}.db", name));

        if duplicates_root.starts_with(&scan_root) {
            return Err(ConfigError::DuplicatesInsideRoot {
                scan_root,
                duplicates_root,
            });
        }

        log::debug!(
            "Run paths: root={}, duplicates={}, index={}",
            scan_root.display(),
            duplicates_root.display(),
            index_path.display()
        );

        Ok(Self {
            scan_root,
            name,
            duplicates_root,
            index_path,
        })
    }
}
