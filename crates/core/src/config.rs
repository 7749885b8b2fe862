use crate::ledger::{Pricing, STARTING_BALANCE};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

fn default_balance() -> u64 {
    STARTING_BALANCE
}

fn default_library_path() -> PathBuf {
    PathBuf::from("library.json")
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file `{path}`: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to write config file `{path}`: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse config file `{path}`: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to serialize the config: {0}")]
    Serialize(#[source] serde_json::Error),
}

/// Wire protocol a text interface speaks.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterfaceFormat {
    #[default]
    OpenAi,
    Gemini,
}

/// Connection settings for one text-generation backend.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct TextProfile {
    #[serde(default)]
    pub format: InterfaceFormat,
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
}

/// Connection settings for one image-generation backend.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ImageProfile {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct RecentSelection {
    #[serde(default)]
    pub last_text_interface: Option<String>,
    #[serde(default)]
    pub last_image_interface: Option<String>,
}

/// Everything that persists outside the book library: backend profiles,
/// pricing, the account-wide credit balance and a few paths.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub text_interfaces: BTreeMap<String, TextProfile>,
    #[serde(default)]
    pub image_interfaces: BTreeMap<String, ImageProfile>,
    #[serde(default)]
    pub pricing: Pricing,
    #[serde(default = "default_balance")]
    pub balance: u64,
    #[serde(default = "default_library_path")]
    pub library_path: PathBuf,
    #[serde(default)]
    pub prompt_directories: Vec<PathBuf>,
    #[serde(default)]
    pub recent: RecentSelection,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            text_interfaces: BTreeMap::new(),
            image_interfaces: BTreeMap::new(),
            pricing: Pricing::default(),
            balance: default_balance(),
            library_path: default_library_path(),
            prompt_directories: Vec::new(),
            recent: RecentSelection::default(),
        }
    }
}

impl Config {
    /// Drops recent selections that no longer name a configured interface and
    /// falls back to the first configured one.
    pub fn ensure_recent_defaults(&mut self) -> bool {
        let mut changed = false;
        let text_valid = self
            .recent
            .last_text_interface
            .as_ref()
            .is_some_and(|name| self.text_interfaces.contains_key(name));
        if !text_valid {
            let fallback = self.text_interfaces.keys().next().cloned();
            if self.recent.last_text_interface != fallback {
                self.recent.last_text_interface = fallback;
                changed = true;
            }
        }
        let image_valid = self
            .recent
            .last_image_interface
            .as_ref()
            .is_some_and(|name| self.image_interfaces.contains_key(name));
        if !image_valid {
            let fallback = self.image_interfaces.keys().next().cloned();
            if self.recent.last_image_interface != fallback {
                self.recent.last_image_interface = fallback;
                changed = true;
            }
        }
        changed
    }

    /// `library_path` resolved against the config file's directory when it is
    /// relative.
    pub fn resolve_library_path(&self, config_path: &Path) -> PathBuf {
        if self.library_path.is_absolute() {
            self.library_path.clone()
        } else {
            config_path
                .parent()
                .map(|dir| dir.join(&self.library_path))
                .unwrap_or_else(|| self.library_path.clone())
        }
    }
}

/// JSON-file-backed config. A missing file yields defaults and is created on
/// first save.
#[derive(Debug)]
pub struct ConfigStore {
    path: PathBuf,
    config: Config,
}

impl ConfigStore {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let config = Self::load(&path)?;
        Ok(Self { path, config })
    }

    fn load(path: &Path) -> Result<Config, ConfigError> {
        if !path.exists() {
            return Ok(Config::default());
        }
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut Config {
        &mut self.config
    }

    pub fn reload(&mut self) -> Result<(), ConfigError> {
        self.config = Self::load(&self.path)?;
        Ok(())
    }

    pub fn save(&self) -> Result<(), ConfigError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|source| ConfigError::Write {
                    path: self.path.clone(),
                    source,
                })?;
            }
        }
        let json = serde_json::to_string_pretty(&self.config).map_err(ConfigError::Serialize)?;
        fs::write(&self.path, json).map_err(|source| ConfigError::Write {
            path: self.path.clone(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn profile(model: &str) -> TextProfile {
        TextProfile {
            format: InterfaceFormat::OpenAi,
            base_url: "https://api.example.com/v1".to_string(),
            api_key: "key".to_string(),
            model: model.to_string(),
            temperature: None,
            max_tokens: None,
        }
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempdir().unwrap();
        let store = ConfigStore::open(dir.path().join("config.json")).unwrap();
        assert_eq!(store.config().balance, STARTING_BALANCE);
        assert!(store.config().text_interfaces.is_empty());
    }

    #[test]
    fn save_and_reload_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");

        let mut store = ConfigStore::open(&path).unwrap();
        store.config_mut().balance = 4_200;
        store
            .config_mut()
            .text_interfaces
            .insert("main".to_string(), profile("gpt-x"));
        store.save().unwrap();

        let reloaded = ConfigStore::open(&path).unwrap();
        assert_eq!(reloaded.config().balance, 4_200);
        assert_eq!(reloaded.config().text_interfaces["main"].model, "gpt-x");
    }

    #[test]
    fn recent_defaults_fall_back_to_first_interface() {
        let mut config = Config::default();
        config.text_interfaces.insert("b".to_string(), profile("m"));
        config.text_interfaces.insert("a".to_string(), profile("m"));
        config.recent.last_text_interface = Some("gone".to_string());

        assert!(config.ensure_recent_defaults());
        assert_eq!(config.recent.last_text_interface.as_deref(), Some("a"));
        assert!(!config.ensure_recent_defaults());
    }

    #[test]
    fn relative_library_path_resolves_against_config_dir() {
        let config = Config::default();
        let resolved = config.resolve_library_path(Path::new("/etc/bookforge/config.json"));
        assert_eq!(resolved, Path::new("/etc/bookforge/library.json"));
    }
}
