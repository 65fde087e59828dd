//! Configuration for istok.
//!
//! Configuration sources (highest priority first):
//! 1. Environment variables (ISTOK_HOME, ISTOK_MODEL_DIR)
//! 2. Config file (.istok/config.yaml)
//! 3. Defaults (~/.istok)
//!
//! Config file discovery:
//! - Searches the start directory and its parents for .istok/config.yaml
//! - Paths in config file are relative to the .istok/ directory

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::adapters::ollama::{DEFAULT_MODEL, DEFAULT_URL};
use crate::ingest::TranscriberSettings;
use crate::tagger::TrainingConfig;

pub const CONFIG_DIR: &str = ".istok";
pub const CONFIG_FILE: &str = "config.yaml";

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub tagger: Option<TaggerConfig>,
    #[serde(default)]
    pub remote: Option<RemoteConfig>,
    #[serde(default)]
    pub transcriber: Option<TranscriberConfig>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PathsConfig {
    /// State directory
    pub home: Option<String>,
    /// Persisted tagger model directory
    pub model_dir: Option<String>,
    /// Replacement term dictionary (YAML)
    pub terms: Option<String>,
    /// Replacement lexicon (YAML)
    pub lexicon: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TaggerConfig {
    pub iterations: Option<usize>,
    pub seed: Option<u64>,
    pub eval_fraction: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RemoteConfig {
    pub url: Option<String>,
    pub model: Option<String>,
    pub timeout_seconds: Option<u64>,
    pub dashboard_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TranscriberConfig {
    pub whisper_path: Option<String>,
    pub model: Option<String>,
    pub language: Option<String>,
    pub timeout_seconds: Option<u64>,
}

/// Environment overrides, read once by the caller
#[derive(Debug, Clone, Default)]
pub struct EnvOverrides {
    pub home: Option<PathBuf>,
    pub model_dir: Option<PathBuf>,
}

impl EnvOverrides {
    pub fn from_env() -> Self {
        Self {
            home: std::env::var_os("ISTOK_HOME").map(PathBuf::from),
            model_dir: std::env::var_os("ISTOK_MODEL_DIR").map(PathBuf::from),
        }
    }
}

/// Remote annotator settings
#[derive(Debug, Clone, Serialize)]
pub struct RemoteSettings {
    pub url: String,
    pub model: String,
    pub timeout_seconds: u64,
    pub dashboard_url: String,
}

impl Default for RemoteSettings {
    fn default() -> Self {
        Self {
            url: DEFAULT_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            timeout_seconds: 60,
            dashboard_url: crate::adapters::dashboard::DEFAULT_BASE_URL.to_string(),
        }
    }
}

impl RemoteSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

/// Resolved configuration with absolute paths
#[derive(Debug, Clone, Serialize)]
pub struct ResolvedConfig {
    /// State directory
    pub home: PathBuf,
    /// Tagger model directory
    pub model_dir: PathBuf,
    /// Term dictionary override; embedded default when `None`
    pub terms: Option<PathBuf>,
    /// Lexicon override; embedded default when `None`
    pub lexicon: Option<PathBuf>,
    /// Path to config file (if found)
    pub config_file: Option<PathBuf>,
    pub training: TrainingConfig,
    pub remote: RemoteSettings,
    #[serde(skip)]
    pub transcriber: TranscriberSettings,
}

/// Find config file by searching `start` and its parents
pub fn find_config_file(start: &Path) -> Option<PathBuf> {
    let mut current = start.to_path_buf();

    loop {
        let config_path = current.join(CONFIG_DIR).join(CONFIG_FILE);
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            break;
        }
    }

    None
}

/// Load and parse config file
pub fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    serde_yaml::from_str(&content).with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Resolve a path that may be relative to the config directory
pub fn resolve_path(base: &Path, path_str: &str) -> PathBuf {
    let path = PathBuf::from(path_str);
    if path.is_absolute() {
        path
    } else {
        base.join(path)
            .canonicalize()
            .unwrap_or_else(|_| base.join(path_str))
    }
}

impl ResolvedConfig {
    /// Merge an optional config file with env overrides and defaults
    pub fn resolve(config_file: Option<PathBuf>, env: EnvOverrides) -> Result<Self> {
        let default_home = dirs::home_dir()
            .context("Failed to determine home directory")?
            .join(CONFIG_DIR);

        let file = match config_file {
            Some(ref path) => load_config_file(path)?,
            None => ConfigFile::default(),
        };
        let config_dir = config_file
            .as_deref()
            .and_then(Path::parent)
            .map(Path::to_path_buf);
        let resolve = |value: &Option<String>| -> Option<PathBuf> {
            value.as_deref().map(|v| match &config_dir {
                Some(dir) => resolve_path(dir, v),
                None => PathBuf::from(v),
            })
        };

        let home = env
            .home
            .clone()
            .or_else(|| resolve(&file.paths.home))
            .unwrap_or(default_home);
        let model_dir = env
            .model_dir
            .clone()
            .or_else(|| resolve(&file.paths.model_dir))
            .unwrap_or_else(|| home.join("model"));

        let defaults = TrainingConfig::default();
        let training = match &file.tagger {
            Some(t) => TrainingConfig {
                iterations: t.iterations.unwrap_or(defaults.iterations),
                seed: t.seed.unwrap_or(defaults.seed),
                eval_fraction: t.eval_fraction.unwrap_or(defaults.eval_fraction),
            },
            None => defaults,
        };

        let mut remote = RemoteSettings::default();
        if let Some(r) = &file.remote {
            if let Some(url) = &r.url {
                remote.url = url.clone();
            }
            if let Some(model) = &r.model {
                remote.model = model.clone();
            }
            if let Some(timeout) = r.timeout_seconds {
                remote.timeout_seconds = timeout;
            }
            if let Some(dashboard) = &r.dashboard_url {
                remote.dashboard_url = dashboard.clone();
            }
        }

        let mut transcriber = TranscriberSettings::default();
        if let Some(t) = &file.transcriber {
            if let Some(path) = &t.whisper_path {
                transcriber.whisper_path = path.clone();
            }
            if let Some(model) = &t.model {
                transcriber.model = model.clone();
            }
            if let Some(language) = &t.language {
                transcriber.language = language.clone();
            }
            if let Some(timeout) = t.timeout_seconds {
                transcriber.timeout = Duration::from_secs(timeout);
            }
        }

        Ok(Self {
            home,
            model_dir,
            terms: resolve(&file.paths.terms),
            lexicon: resolve(&file.paths.lexicon),
            config_file,
            training,
            remote,
            transcriber,
        })
    }
}

/// Load configuration starting discovery at `start`
pub fn load_config_from(start: &Path) -> Result<ResolvedConfig> {
    ResolvedConfig::resolve(find_config_file(start), EnvOverrides::from_env())
}

/// Load configuration starting discovery at the current directory
pub fn load_config() -> Result<ResolvedConfig> {
    let cwd = std::env::current_dir().context("Failed to determine current directory")?;
    load_config_from(&cwd)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn write_config(root: &Path, body: &str) -> PathBuf {
        let dir = root.join(CONFIG_DIR);
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(CONFIG_FILE);
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "{}", body).unwrap();
        path
    }

    #[test]
    fn test_defaults_without_file() {
        let config = ResolvedConfig::resolve(None, EnvOverrides::default()).unwrap();

        let expected_home = dirs::home_dir().unwrap().join(".istok");
        assert_eq!(config.home, expected_home);
        assert_eq!(config.model_dir, expected_home.join("model"));
        assert!(config.terms.is_none());
        assert_eq!(config.training.iterations, 20);
        assert_eq!(config.transcriber.language, "ru");
    }

    #[test]
    fn test_config_file_parsing() {
        let temp = TempDir::new().unwrap();
        let path = write_config(
            temp.path(),
            r#"
version: "1"
paths:
  home: ./
  model_dir: ./model
  terms: ../terms.yaml
tagger:
  iterations: 7
remote:
  model: llama3
  timeout_seconds: 5
transcriber:
  language: en
"#,
        );

        let config = ResolvedConfig::resolve(Some(path.clone()), EnvOverrides::default()).unwrap();
        let config_dir = path.parent().unwrap();
        assert_eq!(config.home, resolve_path(config_dir, "./"));
        assert_eq!(config.model_dir, resolve_path(config_dir, "./model"));
        assert_eq!(config.terms, Some(resolve_path(config_dir, "../terms.yaml")));
        assert_eq!(config.training.iterations, 7);
        assert_eq!(config.training.seed, 42);
        assert_eq!(config.remote.model, "llama3");
        assert_eq!(config.remote.url, DEFAULT_URL);
        assert_eq!(config.remote.timeout(), Duration::from_secs(5));
        assert_eq!(config.transcriber.language, "en");
    }

    #[test]
    fn test_env_overrides_win() {
        let temp = TempDir::new().unwrap();
        let path = write_config(temp.path(), "paths:\n  model_dir: ./model\n");
        let env = EnvOverrides {
            home: Some(PathBuf::from("/srv/istok")),
            model_dir: Some(PathBuf::from("/srv/models/current")),
        };

        let config = ResolvedConfig::resolve(Some(path), env).unwrap();
        assert_eq!(config.home, PathBuf::from("/srv/istok"));
        assert_eq!(config.model_dir, PathBuf::from("/srv/models/current"));
    }

    #[test]
    fn test_find_config_in_parent() {
        let temp = TempDir::new().unwrap();
        let path = write_config(temp.path(), "version: \"1\"");
        let nested = temp.path().join("a").join("b");
        std::fs::create_dir_all(&nested).unwrap();

        assert_eq!(find_config_file(&nested), Some(path));
    }

    #[test]
    fn test_resolve_relative_path() {
        let base = PathBuf::from("/home/user/project");

        assert_eq!(
            resolve_path(&base, "./subdir"),
            PathBuf::from("/home/user/project/subdir")
        );
        assert_eq!(
            resolve_path(&base, "/absolute/path"),
            PathBuf::from("/absolute/path")
        );
    }
}
