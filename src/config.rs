//! Configuration for mediaq.
//!
//! Configuration sources (highest priority first):
//! 1. Environment variables (MEDIAQ_HOME, ASSEMBLYAI_API_KEY, OPENAI_API_KEY,
//!    OPENAI_MODEL, ARTIFACT_BASE_URL, ARTIFACT_TOKEN, ARTIFACT_DIR)
//! 2. Config file (.mediaq/config.yaml)
//! 3. Defaults (~/.mediaq)
//!
//! Config file discovery:
//! - Searches current directory and parents for .mediaq/config.yaml
//! - `home` is relative to the .mediaq/ directory, `artifacts.dir` to the
//!   project root (the parent of .mediaq/)
//!
//! The resolved [`Config`] is built once by the binary and handed to each
//! component constructor.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::adapters::{ArtifactConfig, LlmConfig, TranscriptionConfig};
use crate::core::{CallbackConfig, QueueConfig, TranslationConfig};

const CONFIG_DIR: &str = ".mediaq";
const CONFIG_FILE: &str = "config.yaml";
const REDACTED: &str = "<redacted>";

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub version: Option<String>,
    /// Engine state directory (relative to the .mediaq/ directory)
    #[serde(default)]
    pub home: Option<String>,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub callback: CallbackConfig,
    #[serde(default)]
    pub transcription: TranscriptionConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub artifacts: ArtifactConfig,
    #[serde(default)]
    pub translation: TranslationConfig,
}

/// Resolved configuration with absolute paths
#[derive(Debug, Clone, Serialize)]
pub struct Config {
    /// Engine state: broker files, journal, local artifacts
    pub home: PathBuf,
    /// Path to config file (if found)
    pub config_file: Option<PathBuf>,
    pub queue: QueueConfig,
    pub callback: CallbackConfig,
    pub transcription: TranscriptionConfig,
    pub llm: LlmConfig,
    pub artifacts: ArtifactConfig,
    pub translation: TranslationConfig,
}

impl Config {
    /// Load configuration from the environment, the discovered config file,
    /// and defaults
    pub fn load() -> Result<Self> {
        let start = std::env::current_dir().context("Failed to determine current directory")?;
        Self::resolve(find_config_file(&start), |key| std::env::var(key).ok())
    }

    /// Resolve configuration from an optional config file and an environment
    /// lookup
    pub fn resolve<F>(config_file: Option<PathBuf>, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = |key: &str| env(key).filter(|value| !value.trim().is_empty());

        let file = match &config_file {
            Some(path) => load_config_file(path)?,
            None => ConfigFile::default(),
        };

        let home = match (env("MEDIAQ_HOME"), &file.home, &config_file) {
            (Some(home), _, _) => PathBuf::from(home),
            (None, Some(home), Some(path)) => resolve_path(config_dir(path), home),
            _ => default_home()?,
        };

        let mut artifacts = file.artifacts;
        if let (Some(dir), Some(path)) = (&artifacts.dir, &config_file) {
            artifacts.dir = Some(resolve_path(project_root(path), &dir.to_string_lossy()));
        }

        let mut config = Self {
            home,
            config_file,
            queue: file.queue,
            callback: file.callback,
            transcription: file.transcription,
            llm: file.llm,
            artifacts,
            translation: file.translation,
        };

        if let Some(key) = env("ASSEMBLYAI_API_KEY") {
            config.transcription.api_key = Some(key);
        }
        if let Some(key) = env("OPENAI_API_KEY") {
            config.llm.api_key = Some(key);
        }
        if let Some(model) = env("OPENAI_MODEL") {
            config.llm.model = model;
        }
        if let Some(url) = env("ARTIFACT_BASE_URL") {
            config.artifacts.base_url = Some(url);
        }
        if let Some(token) = env("ARTIFACT_TOKEN") {
            config.artifacts.token = Some(token);
        }
        if let Some(dir) = env("ARTIFACT_DIR") {
            config.artifacts.dir = Some(PathBuf::from(dir));
        }

        Ok(config)
    }

    /// Broker state directory ($MEDIAQ_HOME/queue)
    pub fn broker_dir(&self) -> PathBuf {
        self.home.join("queue")
    }

    /// Job journal ($MEDIAQ_HOME/journal.jsonl)
    pub fn journal_path(&self) -> PathBuf {
        self.home.join("journal.jsonl")
    }

    /// Default local artifact directory ($MEDIAQ_HOME/artifacts)
    pub fn artifacts_dir(&self) -> PathBuf {
        self.home.join("artifacts")
    }

    /// Copy with secrets masked, for display
    pub fn redacted(&self) -> Self {
        let mask = |secret: &Option<String>| secret.as_ref().map(|_| REDACTED.to_string());

        let mut config = self.clone();
        config.transcription.api_key = mask(&config.transcription.api_key);
        config.llm.api_key = mask(&config.llm.api_key);
        config.artifacts.token = mask(&config.artifacts.token);
        config
    }
}

fn default_home() -> Result<PathBuf> {
    Ok(dirs::home_dir()
        .context("Failed to determine home directory")?
        .join(CONFIG_DIR))
}

/// Find config file by searching `start` and its parents
fn find_config_file(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .map(|dir| dir.join(CONFIG_DIR).join(CONFIG_FILE))
        .find(|candidate| candidate.exists())
}

/// Load and parse config file
fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// The .mediaq/ directory holding the config file
fn config_dir(config_path: &Path) -> &Path {
    config_path.parent().unwrap_or(Path::new("."))
}

/// The directory containing .mediaq/
fn project_root(config_path: &Path) -> &Path {
    config_dir(config_path).parent().unwrap_or(Path::new("."))
}

/// Resolve a path that may be relative to `base`
fn resolve_path(base: &Path, path_str: &str) -> PathBuf {
    let path = PathBuf::from(path_str);
    if path.is_absolute() {
        path
    } else {
        base.join(&path).canonicalize().unwrap_or_else(|_| base.join(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::TranslationPolicy;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    fn write_config(root: &Path, yaml: &str) -> PathBuf {
        let dir = root.join(CONFIG_DIR);
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(CONFIG_FILE);
        std::fs::write(&path, yaml).unwrap();
        path
    }

    #[test]
    fn test_defaults_without_file() {
        let config = Config::resolve(None, env_of(&[])).unwrap();

        let expected_home = dirs::home_dir().unwrap().join(".mediaq");
        assert_eq!(config.home, expected_home);
        assert_eq!(config.journal_path(), expected_home.join("journal.jsonl"));
        assert_eq!(config.queue.name, "media_jobs");
        assert_eq!(config.queue.dead_letter, "media_jobs.dead");
        assert_eq!(config.callback.retry.max_attempts, 3);
        assert_eq!(config.translation.policy, TranslationPolicy::AllOrNothing);
        assert!(config.config_file.is_none());
    }

    #[test]
    fn test_config_file_parsing() {
        let temp = TempDir::new().unwrap();
        let path = write_config(
            temp.path(),
            r#"
version: "1.0"
home: ./state
queue:
  name: lectures
  dead_letter: lectures.dead
llm:
  model: gpt-4o-mini
  temperature: 0.1
artifacts:
  dir: public/media
translation:
  policy: best_effort
"#,
        );

        let config = Config::resolve(Some(path), env_of(&[])).unwrap();
        assert!(config.home.ends_with(".mediaq/state"));
        assert_eq!(config.queue.name, "lectures");
        assert_eq!(config.llm.model, "gpt-4o-mini");
        assert_eq!(config.llm.base_url, "https://api.openai.com/v1");
        assert_eq!(config.translation.policy, TranslationPolicy::BestEffort);
        assert_eq!(
            config.artifacts.dir,
            Some(temp.path().join("public/media"))
        );
    }

    #[test]
    fn test_env_overrides_file() {
        let temp = TempDir::new().unwrap();
        let path = write_config(
            temp.path(),
            "llm:\n  model: from-file\n  api_key: file-key\n",
        );

        let config = Config::resolve(
            Some(path),
            env_of(&[
                ("MEDIAQ_HOME", "/srv/mediaq"),
                ("OPENAI_API_KEY", "env-key"),
                ("OPENAI_MODEL", "from-env"),
                ("ARTIFACT_BASE_URL", "https://cdn.example.com"),
                ("ASSEMBLYAI_API_KEY", ""),
            ]),
        )
        .unwrap();

        assert_eq!(config.home, PathBuf::from("/srv/mediaq"));
        assert_eq!(config.broker_dir(), PathBuf::from("/srv/mediaq/queue"));
        assert_eq!(config.llm.api_key.as_deref(), Some("env-key"));
        assert_eq!(config.llm.model, "from-env");
        assert_eq!(
            config.artifacts.base_url.as_deref(),
            Some("https://cdn.example.com")
        );
        // Empty values are ignored
        assert!(config.transcription.api_key.is_none());
    }

    #[test]
    fn test_redacted_hides_secrets() {
        let config = Config::resolve(
            None,
            env_of(&[("OPENAI_API_KEY", "sk-secret"), ("ARTIFACT_TOKEN", "t0ken")]),
        )
        .unwrap();

        let shown = serde_yaml::to_string(&config.redacted()).unwrap();
        assert!(!shown.contains("sk-secret"));
        assert!(!shown.contains("t0ken"));
        assert!(shown.contains(REDACTED));
    }

    #[test]
    fn test_find_config_file_walks_up() {
        let temp = TempDir::new().unwrap();
        let path = write_config(temp.path(), "version: \"1.0\"\n");
        let nested = temp.path().join("a/b");
        std::fs::create_dir_all(&nested).unwrap();

        assert_eq!(find_config_file(&nested), Some(path));
    }

    #[test]
    fn test_invalid_yaml_is_an_error() {
        let temp = TempDir::new().unwrap();
        let path = write_config(temp.path(), "queue: 42\n");
        let err = Config::resolve(Some(path), env_of(&[])).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config file"));
    }

    #[test]
    fn test_resolve_relative_path() {
        let base = PathBuf::from("/home/user/project");

        assert_eq!(
            resolve_path(&base, "./subdir"),
            PathBuf::from("/home/user/project/./subdir")
        );
        assert_eq!(
            resolve_path(&base, "/absolute/path"),
            PathBuf::from("/absolute/path")
        );
    }
}
