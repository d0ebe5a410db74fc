//! Configuration management for the crawler using the prefer crate.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{CategoryFormOverride, CategoryTable, DedupPolicy, RequestError};
use crate::scrapers::{BrowserEngineConfig, RegistryLayout, TimeoutConfig};
use crate::storage::normalize_store_path;

/// Default store filename.
pub const DEFAULT_STORE: &str = "mevzuat.json";

/// Errors loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("Invalid category override: {0}")]
    Category(#[from] RequestError),
}

/// Application settings, fully resolved.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Default store path for crawl output.
    pub store_path: PathBuf,
    /// Default duplicate handling for append runs.
    pub dedup: DedupPolicy,
    pub browser: BrowserEngineConfig,
    pub layout: RegistryLayout,
    pub timeouts: TimeoutConfig,
    /// Category selector table injected into the crawl controller.
    pub categories: CategoryTable,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            store_path: PathBuf::from(DEFAULT_STORE),
            dedup: DedupPolicy::default(),
            browser: BrowserEngineConfig::default(),
            layout: RegistryLayout::default(),
            timeouts: TimeoutConfig::default(),
            categories: CategoryTable::builtin(),
        }
    }
}

/// Configuration file structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Store path for crawl output.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub store: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dedup: Option<DedupPolicy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub browser: Option<BrowserEngineConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeouts: Option<TimeoutConfig>,
    /// Registry URL and page-wide selectors.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registry: Option<RegistryLayout>,
    /// Per-category form overrides, keyed by slug or registry label.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub categories: HashMap<String, CategoryFormOverride>,
    /// Path to the config file this was loaded from (not serialized).
    #[serde(skip)]
    pub source_path: Option<PathBuf>,
}

impl Config {
    /// Load configuration using prefer crate for discovery.
    /// Falls back to defaults when no file is found or it cannot be parsed.
    pub async fn load() -> Self {
        // Use prefer for file discovery, then parse with serde
        let Ok(pref_config) = prefer::load("mevzuat").await else {
            return Self::default();
        };
        let Some(path) = pref_config.source_path() else {
            return Self::default();
        };
        match Self::load_from_path(path).await {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("Ignoring discovered config: {}", e);
                Self::default()
            }
        }
    }

    /// Load configuration from a specific file path.
    /// TOML and YAML by extension, JSON otherwise.
    pub async fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?;

        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("json");
        let parse_err = |message: String| ConfigError::Parse {
            path: path.to_path_buf(),
            message,
        };

        let mut config: Config = match ext {
            "toml" => toml::from_str(&contents).map_err(|e| parse_err(e.to_string()))?,
            "yaml" | "yml" => {
                serde_yaml::from_str(&contents).map_err(|e| parse_err(e.to_string()))?
            }
            _ => serde_json::from_str(&contents).map_err(|e| parse_err(e.to_string()))?,
        };

        config.source_path = Some(path.to_path_buf());
        Ok(config)
    }

    /// Get the base directory for resolving relative paths.
    pub fn base_dir(&self) -> Option<PathBuf> {
        self.source_path
            .as_ref()
            .and_then(|p| p.parent().map(|p| p.to_path_buf()))
    }

    /// Resolve a path that may be relative to the config file.
    /// `~` is expanded; relative paths are joined onto `base_dir`.
    pub fn resolve_path(&self, path_str: &str, base_dir: &Path) -> PathBuf {
        let expanded = shellexpand::tilde(path_str);
        let path = Path::new(expanded.as_ref());

        if path.is_absolute() {
            path.to_path_buf()
        } else {
            base_dir.join(path)
        }
    }

    /// Apply configuration to settings.
    pub fn apply_to_settings(
        &self,
        settings: &mut Settings,
        base_dir: &Path,
    ) -> Result<(), ConfigError> {
        if let Some(ref store) = self.store {
            settings.store_path = normalize_store_path(self.resolve_path(store, base_dir));
        }
        if let Some(dedup) = self.dedup {
            settings.dedup = dedup;
        }
        if let Some(ref browser) = self.browser {
            settings.browser = browser.clone();
        }
        if let Some(ref timeouts) = self.timeouts {
            settings.timeouts = timeouts.clone();
        }
        if let Some(ref registry) = self.registry {
            settings.layout = registry.clone();
        }
        if !self.categories.is_empty() {
            settings.categories = CategoryTable::with_overrides(&self.categories)?;
        }
        Ok(())
    }
}

/// Options for loading settings.
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// Explicit config file path (overrides auto-discovery).
    pub config_path: Option<PathBuf>,
}

/// Load settings with explicit options.
/// Returns (Settings, Config) tuple.
pub async fn load_settings(options: LoadOptions) -> Result<(Settings, Config), ConfigError> {
    // An explicit --config must load; a discovered one may be skipped
    let config = match options.config_path {
        Some(ref path) => Config::load_from_path(path).await?,
        None => Config::load().await,
    };

    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    let base_dir = config.base_dir().unwrap_or_else(|| cwd.clone());

    let mut settings = Settings::default();
    config.apply_to_settings(&mut settings, &base_dir)?;
    settings.browser = settings.browser.with_env_overrides();

    // MEVZUAT_STORE takes precedence over config
    if let Some(store) = std::env::var("MEVZUAT_STORE")
        .ok()
        .filter(|s| !s.is_empty())
    {
        tracing::debug!("Using MEVZUAT_STORE from environment: {}", store);
        settings.store_path = normalize_store_path(config.resolve_path(&store, &cwd));
    }

    if let Some(ref path) = config.source_path {
        tracing::debug!("Loaded config from {}", path.display());
    }

    Ok((settings, config))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Category;
    use std::io::Write;
    use tempfile::{tempdir, NamedTempFile};

    #[tokio::test]
    async fn test_load_toml_config() {
        let mut file = NamedTempFile::with_suffix(".toml").unwrap();
        writeln!(
            file,
            r#"
store = "out/laws"
dedup = "url"

[browser]
headless = false

[timeouts]
wait_secs = 5

[categories.statute]
form_id = "yeni_form"
"#
        )
        .unwrap();

        let config = Config::load_from_path(file.path()).await.unwrap();
        assert_eq!(config.store.as_deref(), Some("out/laws"));
        assert_eq!(config.dedup, Some(DedupPolicy::Url));
        assert_eq!(config.source_path.as_deref(), Some(file.path()));

        let base = Path::new("/srv/data");
        let mut settings = Settings::default();
        config.apply_to_settings(&mut settings, base).unwrap();
        assert_eq!(settings.store_path, PathBuf::from("/srv/data/out/laws.json"));
        assert!(!settings.browser.headless);
        assert_eq!(settings.timeouts.wait_secs, 5);
        assert_eq!(settings.timeouts.page_settle_ms, 3_000);
        assert_eq!(
            settings.categories.form(Category::Statute).unwrap().form_id,
            "yeni_form"
        );
    }

    #[tokio::test]
    async fn test_load_yaml_config() {
        let mut file = NamedTempFile::with_suffix(".yaml").unwrap();
        writeln!(file, "store: laws.json\nregistry:\n  base_url: http://localhost:8080").unwrap();

        let config = Config::load_from_path(file.path()).await.unwrap();
        let mut settings = Settings::default();
        config
            .apply_to_settings(&mut settings, Path::new("/tmp"))
            .unwrap();
        assert_eq!(settings.layout.base_url, "http://localhost:8080");
        assert_eq!(settings.layout.search_field, "#AranacakIfade");
    }

    #[tokio::test]
    async fn test_load_json_config() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("mevzuat.json");
        std::fs::write(&path, r#"{"store": "~/laws.json"}"#).unwrap();

        let config = Config::load_from_path(&path).await.unwrap();
        let resolved = config.resolve_path(config.store.as_deref().unwrap(), dir.path());
        assert!(!resolved.to_string_lossy().starts_with('~'));
    }

    #[tokio::test]
    async fn test_bad_category_override_rejected() {
        let mut file = NamedTempFile::with_suffix(".toml").unwrap();
        writeln!(file, "[categories.nonsense]\nform_id = \"x\"").unwrap();

        let config = Config::load_from_path(file.path()).await.unwrap();
        let mut settings = Settings::default();
        assert!(matches!(
            config.apply_to_settings(&mut settings, Path::new(".")),
            Err(ConfigError::Category(_))
        ));
    }

    #[tokio::test]
    async fn test_unparsable_config_is_error() {
        let mut file = NamedTempFile::with_suffix(".toml").unwrap();
        writeln!(file, "store = [").unwrap();
        assert!(matches!(
            Config::load_from_path(file.path()).await,
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.store_path, PathBuf::from("mevzuat.json"));
        assert_eq!(settings.dedup, DedupPolicy::None);
        assert!(settings.browser.headless);
    }
}
