use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use taxmate_ingest::DEFAULT_CHUNK_SIZE;
use taxmate_statement::gemini::{DEFAULT_BASE_URL, DEFAULT_MODEL};
use taxmate_statement::pipeline::DEFAULT_RUN_TIMEOUT;
use taxmate_statement::retry::{DEFAULT_BACKOFF_STEP, DEFAULT_MAX_RETRIES};
use taxmate_statement::scheduler::DEFAULT_CONCURRENCY;
use taxmate_statement::staging::{DEFAULT_DELETE_ENDPOINT, MAX_DOCUMENT_BYTES};
use taxmate_statement::{AnalyserSettings, GeminiConfig, RetryPolicy};

use crate::state::ensure_taxmate_home;

pub const API_KEY_ENV: &str = "GOOGLE_GEMINI_API_KEY";
pub const STORE_TOKEN_ENV: &str = "STATEMENT_READ_WRITE_TOKEN";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub llm: LlmSection,
    pub extraction: ExtractionSection,
    pub server: ServerSection,
    pub staging: StagingSection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    pub model: String,
    pub base_url: String,
    pub temperature: f32,
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionSection {
    /// Pages per provider call.
    pub chunk_size: usize,
    /// Provider calls in flight at once.
    pub concurrency: usize,
    pub max_retries: u32,
    /// Retry `n` waits `n * backoff_step_secs`.
    pub backoff_step_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    pub bind: String,
    pub max_upload_bytes: u64,
    /// Wall-clock budget for one analysis, cleanup excluded.
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StagingSection {
    pub delete_endpoint: String,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            temperature: 0.1,
            request_timeout_secs: 180,
        }
    }
}

impl Default for ExtractionSection {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            concurrency: DEFAULT_CONCURRENCY,
            max_retries: DEFAULT_MAX_RETRIES,
            backoff_step_secs: DEFAULT_BACKOFF_STEP.as_secs(),
        }
    }
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:3000".to_string(),
            max_upload_bytes: MAX_DOCUMENT_BYTES,
            request_timeout_secs: DEFAULT_RUN_TIMEOUT.as_secs(),
        }
    }
}

impl Default for StagingSection {
    fn default() -> Self {
        Self {
            delete_endpoint: DEFAULT_DELETE_ENDPOINT.to_string(),
        }
    }
}

impl Config {
    pub fn analyser_settings(&self) -> AnalyserSettings {
        AnalyserSettings {
            chunk_size: self.extraction.chunk_size.max(1),
            concurrency: self.extraction.concurrency.max(1),
            retry: RetryPolicy {
                max_retries: self.extraction.max_retries,
                backoff_step: Duration::from_secs(self.extraction.backoff_step_secs),
            },
            temperature: self.llm.temperature,
            run_timeout: Duration::from_secs(self.server.request_timeout_secs.max(1)),
        }
    }

    pub fn gemini_config(&self, api_key: String) -> GeminiConfig {
        GeminiConfig {
            api_key,
            model: self.llm.model.clone(),
            base_url: self.llm.base_url.clone(),
            request_timeout: Duration::from_secs(self.llm.request_timeout_secs.max(1)),
        }
    }
}

/// The provider key, if set and non-empty.
pub fn api_key() -> Option<String> {
    std::env::var(API_KEY_ENV).ok().filter(|k| !k.trim().is_empty())
}

pub fn store_token() -> Option<String> {
    std::env::var(STORE_TOKEN_ENV).ok().filter(|k| !k.trim().is_empty())
}

pub fn config_path() -> Result<PathBuf> {
    Ok(ensure_taxmate_home()?.join("config.toml"))
}

pub fn load_config() -> Result<Config> {
    load_config_from(&config_path()?)
}

/// Read `path`, or the defaults when it does not exist. Values that would make
/// every run fail are rejected here rather than at first use.
pub fn load_config_from(path: &Path) -> Result<Config> {
    if !path.exists() {
        return Ok(Config::default());
    }
    let s = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: Config = toml::from_str(&s).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate().with_context(|| format!("invalid {}", path.display()))?;
    Ok(cfg)
}

impl Config {
    fn validate(&self) -> Result<()> {
        self.server
            .bind
            .parse::<SocketAddr>()
            .with_context(|| format!("[server].bind {:?} is not host:port", self.server.bind))?;
        if !(0.0..=2.0).contains(&self.llm.temperature) {
            bail!("[llm].temperature {} is outside 0.0..=2.0", self.llm.temperature);
        }
        if self.llm.model.trim().is_empty() {
            bail!("[llm].model is empty");
        }
        Ok(())
    }
}

/// Write the defaults to `path` unless a file is already there. Returns
/// whether anything was written.
pub fn init_config_at(path: &Path) -> Result<bool> {
    if path.exists() {
        return Ok(false);
    }
    let s = toml::to_string_pretty(&Config::default()).context("serialize config")?;
    fs::write(path, s).with_context(|| format!("write {}", path.display()))?;
    Ok(true)
}

pub fn init_config() -> Result<()> {
    let p = config_path()?;
    if init_config_at(&p)? {
        println!("Wrote {}", p.display());
    } else {
        println!("Config already exists: {}", p.display());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let cfg: Config = toml::from_str(
            r#"
            [extraction]
            concurrency = 4

            [llm]
            model = "gemini-2.5-flash"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.extraction.concurrency, 4);
        assert_eq!(cfg.extraction.chunk_size, 2);
        assert_eq!(cfg.llm.model, "gemini-2.5-flash");
        assert_eq!(cfg.llm.request_timeout_secs, 180);
        assert_eq!(cfg.server.bind, "127.0.0.1:3000");
        assert_eq!(cfg.server.request_timeout_secs, 300);
    }

    #[test]
    fn test_init_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        assert_eq!(load_config_from(&path).unwrap(), Config::default());
        assert!(init_config_at(&path).unwrap());
        assert!(!init_config_at(&path).unwrap());
        assert_eq!(load_config_from(&path).unwrap(), Config::default());
    }

    #[test]
    fn test_invalid_values_name_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[server]\nbind = \"localhost\"\n").unwrap();

        let err = load_config_from(&path).unwrap_err();
        let msg = format!("{err:#}");
        assert!(msg.contains("config.toml"));
        assert!(msg.contains("[server].bind"));

        fs::write(&path, "[llm]\ntemperature = 7.5\n").unwrap();
        assert!(load_config_from(&path).is_err());
    }

    #[test]
    fn test_settings_clamp_zero_values() {
        let mut cfg = Config::default();
        cfg.extraction.chunk_size = 0;
        cfg.extraction.concurrency = 0;
        let s = cfg.analyser_settings();
        assert_eq!(s.chunk_size, 1);
        assert_eq!(s.concurrency, 1);
        assert_eq!(s.retry.backoff_step, Duration::from_secs(4));
        assert_eq!(s.run_timeout, Duration::from_secs(300));
    }
}
