//! Library-wide configuration.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::namespace::slug;
use crate::scanner::ScanConfig;
use crate::search::SearchConfig;
use crate::store::StoreConfig;

/// Directory created inside a media folder when no `index_root` is set.
pub const DEFAULT_INDEX_DIR: &str = ".mediavec";

/// Configuration for a [`Library`](crate::Library).
///
/// Every field has a default, so a JSON file only needs the values it
/// changes:
///
/// ```
/// use mediavec_core::{LibraryConfig, QueryMode};
///
/// let config = LibraryConfig::from_json_str(
///     r#"{ "store": { "workers": 2 }, "search": { "mode": "approximate" } }"#,
/// )
/// .unwrap();
/// assert_eq!(config.store.workers, 2);
/// assert_eq!(config.search.mode, QueryMode::Approximate);
/// assert!(config.index_root.is_none());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LibraryConfig {
    /// Where namespaces live. `None` keeps them inside each media folder.
    pub index_root: Option<PathBuf>,
    pub scan: ScanConfig,
    pub store: StoreConfig,
    pub search: SearchConfig,
}

impl LibraryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores every folder's namespaces below `root`. Chainable.
    pub fn with_index_root<P: Into<PathBuf>>(mut self, root: P) -> Self {
        self.index_root = Some(root.into());
        self
    }

    pub fn with_scan(mut self, scan: ScanConfig) -> Self {
        self.scan = scan;
        self
    }

    pub fn with_store(mut self, store: StoreConfig) -> Self {
        self.store = store;
        self
    }

    pub fn with_search(mut self, search: SearchConfig) -> Self {
        self.search = search;
        self
    }

    /// Parses a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| Error::ConfigurationError(format!("invalid config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads a JSON config file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let json = fs::read_to_string(path)
            .map_err(|e| Error::IoError(format!("read {} failed: {}", path.display(), e)))?;
        Self::from_json_str(&json)
    }

    pub fn validate(&self) -> Result<()> {
        self.store.validate()?;
        self.search.validate()
    }

    /// Directory holding all namespaces of `folder`, which must be canonical.
    pub fn index_dir_for(&self, folder: &Path) -> PathBuf {
        match &self.index_root {
            None => folder.join(DEFAULT_INDEX_DIR),
            Some(root) => root.join(folder_key(folder)),
        }
    }
}

/// Stable directory name for a media folder under a shared index root.
fn folder_key(folder: &Path) -> String {
    let name = folder
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "root".to_string());
    format!(
        "{}-{:08x}",
        slug(&name, 32),
        crc32fast::hash(folder.to_string_lossy().as_bytes())
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distance::DistanceMetric;

    #[test]
    fn test_defaults() {
        let config = LibraryConfig::default();
        assert_eq!(config.store.metric, DistanceMetric::Cosine);
        assert_eq!(config.search.overfetch_factor, 4);
        assert_eq!(config.search.overfetch_min_extra, 50);
        assert!(!config.scan.include_hidden);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_json() {
        assert!(matches!(
            LibraryConfig::from_json_str("{ not json"),
            Err(Error::ConfigurationError(_))
        ));
        assert!(matches!(
            LibraryConfig::from_json_str(r#"{ "store": { "batch_size": 0 } }"#),
            Err(Error::ConfigurationError(_))
        ));
    }

    #[test]
    fn test_load_missing_file() {
        let path = std::env::temp_dir().join("mediavec_missing_config_0.json");
        assert!(matches!(
            LibraryConfig::load(&path),
            Err(Error::IoError(_))
        ));
    }

    #[test]
    fn test_index_dir_for() {
        let folder = Path::new("/home/me/Photos");
        let inline = LibraryConfig::default();
        assert_eq!(
            inline.index_dir_for(folder),
            PathBuf::from("/home/me/Photos/.mediavec")
        );

        let shared = LibraryConfig::default().with_index_root("/var/idx");
        let dir = shared.index_dir_for(folder);
        assert!(dir.starts_with("/var/idx"));
        let key = dir.file_name().unwrap().to_str().unwrap();
        assert!(key.starts_with("photos-"));

        let other = shared.index_dir_for(Path::new("/mnt/Photos"));
        assert_ne!(dir, other);
    }

    #[test]
    fn test_round_trip_json() {
        let config = LibraryConfig::default().with_index_root("/idx");
        let json = serde_json::to_string(&config).unwrap();
        assert_eq!(LibraryConfig::from_json_str(&json).unwrap(), config);
    }
}
