//! Configuration vault – reads/writes `~/.mnemos/config.toml`.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors raised while reading or writing the config file.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to access config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Persisted user configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// SQLite file holding every memory.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Default number of results for `/search`.
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Base URL of the Ollama instance.
    #[serde(default = "default_ollama_url")]
    pub ollama_url: String,

    /// Model used for intent classification.
    #[serde(default = "default_model")]
    pub active_model: String,

    /// When false, `/ask` skips the model and treats input as a search.
    #[serde(default = "default_true")]
    pub classifier_enabled: bool,
}

fn home_dir() -> PathBuf {
    std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("."))
}

fn default_db_path() -> PathBuf {
    home_dir().join(".mnemos").join("memory.db")
}
fn default_top_k() -> usize {
    5
}
fn default_ollama_url() -> String {
    "http://localhost:11434".to_string()
}
fn default_model() -> String {
    "llama3".to_string()
}
fn default_true() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            top_k: default_top_k(),
            ollama_url: default_ollama_url(),
            active_model: default_model(),
            classifier_enabled: true,
        }
    }
}

impl Config {
    /// Apply `MNEMOS_*` overrides looked up through `var`.
    ///
    /// | Variable | Config field |
    /// |---|---|
    /// | `MNEMOS_DB_PATH` | `db_path` |
    /// | `MNEMOS_TOP_K` | `top_k` (ignored unless a number) |
    /// | `MNEMOS_OLLAMA_URL` | `ollama_url` |
    /// | `MNEMOS_MODEL` | `active_model` |
    pub fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(v) = var("MNEMOS_DB_PATH") {
            self.db_path = PathBuf::from(v);
        }
        if let Some(v) = var("MNEMOS_TOP_K")
            && let Ok(k) = v.parse::<usize>()
        {
            self.top_k = k;
        }
        if let Some(v) = var("MNEMOS_OLLAMA_URL") {
            self.ollama_url = v;
        }
        if let Some(v) = var("MNEMOS_MODEL") {
            self.active_model = v;
        }
    }

    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }
}

/// Return the path to `~/.mnemos/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(&home_dir())
}

pub(crate) fn config_path_for_home(home: &Path) -> PathBuf {
    home.join(".mnemos").join("config.toml")
}

/// Load the config from disk with env overrides applied. `None` if the file
/// does not exist.
pub fn load() -> Result<Option<Config>, ConfigError> {
    let mut cfg = load_from(&config_path())?;
    if let Some(cfg) = cfg.as_mut() {
        cfg.apply_env_overrides();
    }
    Ok(cfg)
}

pub(crate) fn load_from(path: &Path) -> Result<Option<Config>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(Some(toml::from_str(&raw)?))
}

/// Save the config to disk, creating `~/.mnemos/` if necessary.
pub fn save(cfg: &Config) -> Result<(), ConfigError> {
    save_to(cfg, &config_path())
}

pub(crate) fn save_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    let io_err = |source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(io_err)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(parent, fs::Permissions::from_mode(0o700)).map_err(io_err)?;
        }
    }
    let raw = toml::to_string_pretty(cfg)?;
    #[cfg(unix)]
    {
        use std::io::Write;
        use std::os::unix::fs::OpenOptionsExt;
        fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .and_then(|mut f| f.write_all(raw.as_bytes()))
            .map_err(io_err)?;
    }
    #[cfg(not(unix))]
    fs::write(path, raw).map_err(io_err)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults() {
        let cfg = Config::default();
        assert_eq!(cfg.top_k, 5);
        assert_eq!(cfg.ollama_url, "http://localhost:11434");
        assert!(cfg.classifier_enabled);
        assert!(cfg.db_path.ends_with(".mnemos/memory.db"));
    }

    #[cfg(unix)]
    #[test]
    fn config_file_has_restrictive_permissions() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(dir.path());

        save_to(&Config::default(), &path).expect("save");

        let file_mode = fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(file_mode, 0o600);
        let dir_mode = fs::metadata(path.parent().unwrap()).unwrap().permissions().mode() & 0o777;
        assert_eq!(dir_mode, 0o700);
    }

    #[test]
    fn roundtrip_custom_config() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(dir.path());
        let cfg = Config {
            db_path: dir.path().join("elsewhere.db"),
            top_k: 3,
            ollama_url: "http://gpu-box:11434".into(),
            active_model: "qwen2.5".into(),
            classifier_enabled: false,
        };
        save_to(&cfg, &path).expect("save");
        assert_eq!(load_from(&path).unwrap(), Some(cfg));
    }

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("config.toml");
        fs::write(&path, "top_k = 9\n").unwrap();
        let cfg = load_from(&path).unwrap().unwrap();
        assert_eq!(cfg.top_k, 9);
        assert_eq!(cfg.active_model, "llama3");
        assert!(cfg.classifier_enabled);
    }

    #[test]
    fn malformed_file_is_a_parse_error() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("config.toml");
        fs::write(&path, "top_k = \"many\"\n").unwrap();
        assert!(matches!(load_from(&path), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn config_path_points_to_mnemos_dir() {
        let p = config_path_for_home(Path::new("/home/testuser"));
        assert_eq!(p, PathBuf::from("/home/testuser/.mnemos/config.toml"));
    }

    #[test]
    fn load_from_returns_none_when_missing() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(dir.path());
        assert!(load_from(&path).unwrap().is_none());
    }

    #[test]
    fn overrides_replace_fields() {
        let mut cfg = Config::default();
        cfg.apply_overrides(vars(&[
            ("MNEMOS_DB_PATH", "/data/m.db"),
            ("MNEMOS_TOP_K", "12"),
            ("MNEMOS_OLLAMA_URL", "http://robot-host:11434"),
            ("MNEMOS_MODEL", "mistral"),
        ]));
        assert_eq!(cfg.db_path, PathBuf::from("/data/m.db"));
        assert_eq!(cfg.top_k, 12);
        assert_eq!(cfg.ollama_url, "http://robot-host:11434");
        assert_eq!(cfg.active_model, "mistral");
    }

    #[test]
    fn overrides_ignore_invalid_top_k() {
        let mut cfg = Config::default();
        cfg.apply_overrides(vars(&[("MNEMOS_TOP_K", "lots")]));
        assert_eq!(cfg.top_k, 5);
    }
}
