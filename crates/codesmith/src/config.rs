//! Runtime configuration.
//!
//! ## Precedence (highest to lowest)
//!
//! 1. CLI flags (applied by the binary)
//! 2. Environment variables (`CODESMITH_PROVIDER`, `CODESMITH_MODEL`,
//!    `CODESMITH_BASE_URL`, `CODESMITH_COOLDOWN_MS`)
//! 3. `codesmith.toml`
//! 4. Built-in defaults
//!
//! ```toml
//! [provider]
//! kind = "anthropic"
//! model = "claude-3-5-sonnet-latest"
//!
//! [pipeline]
//! cooldown_ms = 1500
//! on_file_error = "continue"
//! path_resolution = "closest"
//!
//! [paths]
//! backup_dir = ".codesmith/backups"
//! ```

use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use coordination::{LineEnding, ResolutionPolicy};

use crate::provider::{ProviderConfig, ProviderKind};

/// Config file looked up in the project root when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "codesmith.toml";

const ENV_PROVIDER: &str = "CODESMITH_PROVIDER";
const ENV_MODEL: &str = "CODESMITH_MODEL";
const ENV_BASE_URL: &str = "CODESMITH_BASE_URL";
const ENV_COOLDOWN_MS: &str = "CODESMITH_COOLDOWN_MS";

const DEFAULT_COOLDOWN_MS: u64 = 1_500;
const DEFAULT_MAX_TOKENS: u32 = 8_192;
const DEFAULT_TIMEOUT_SECS: u64 = 120;

// ── [provider] ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderSection {
    pub kind: ProviderKind,
    /// `None` uses the provider's default model.
    pub model: Option<String>,
    /// Environment variable holding the API key; defaults per provider.
    pub api_key_env: Option<String>,
    pub base_url: Option<String>,
    pub max_tokens: u32,
    pub timeout_secs: u64,
}

impl Default for ProviderSection {
    fn default() -> Self {
        Self {
            kind: ProviderKind::OpenAi,
            model: None,
            api_key_env: None,
            base_url: None,
            max_tokens: DEFAULT_MAX_TOKENS,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl ProviderSection {
    pub fn model(&self) -> &str {
        self.model.as_deref().unwrap_or_else(|| self.kind.default_model())
    }

    pub fn api_key_env(&self) -> &str {
        self.api_key_env
            .as_deref()
            .unwrap_or_else(|| self.kind.default_api_key_env())
    }

    /// Resolve into the per-request value, reading the key from the
    /// environment.
    pub fn to_provider_config(&self) -> Result<ProviderConfig> {
        let var = self.api_key_env();
        let api_key = env::var(var)
            .with_context(|| format!("API key variable {var} is not set for provider {}", self.kind))?;
        Ok(self.with_api_key(api_key))
    }

    pub fn with_api_key(&self, api_key: impl Into<String>) -> ProviderConfig {
        ProviderConfig {
            kind: self.kind,
            model: self.model().to_string(),
            api_key: api_key.into(),
            base_url: self.base_url.clone(),
            max_tokens: self.max_tokens,
            timeout_secs: self.timeout_secs,
        }
    }
}

// ── [pipeline] ───────────────────────────────────────────────────────────────

/// What to do with the remaining queue after a per-file failure.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnFileError {
    #[default]
    Continue,
    Stop,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineEndingSetting {
    #[default]
    Native,
    Lf,
    Crlf,
}

impl LineEndingSetting {
    pub fn resolve(self) -> LineEnding {
        match self {
            Self::Native => LineEnding::native(),
            Self::Lf => LineEnding::Lf,
            Self::Crlf => LineEnding::Crlf,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Minimum delay between consecutive work items.
    pub cooldown_ms: u64,
    pub on_file_error: OnFileError,
    pub path_resolution: ResolutionPolicy,
    pub line_ending: LineEndingSetting,
    pub planner_temperature: f32,
    pub generator_temperature: f32,
    /// Lower than the generator: merges should be conservative.
    pub merge_temperature: f32,
    /// Allow the model-assisted reformat tier.
    pub model_reformat: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            cooldown_ms: DEFAULT_COOLDOWN_MS,
            on_file_error: OnFileError::Continue,
            path_resolution: ResolutionPolicy::Closest,
            line_ending: LineEndingSetting::Native,
            planner_temperature: 0.2,
            generator_temperature: 0.4,
            merge_temperature: 0.1,
            model_reformat: true,
        }
    }
}

impl PipelineConfig {
    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }
}

// ── [paths] ──────────────────────────────────────────────────────────────────

/// Output locations, relative to the project root unless absolute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub backup_dir: PathBuf,
    pub results_dir: PathBuf,
    pub prompt_log: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            backup_dir: PathBuf::from(".codesmith/backups"),
            results_dir: PathBuf::from(".codesmith/results"),
            prompt_log: PathBuf::from(".codesmith/prompts.jsonl"),
        }
    }
}

impl PathsConfig {
    pub fn under(root: &Path, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            root.join(path)
        }
    }
}

// ── Top level ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CodesmithConfig {
    pub provider: ProviderSection,
    pub pipeline: PipelineConfig,
    pub paths: PathsConfig,
}

impl CodesmithConfig {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).context("invalid codesmith configuration")
    }

    /// Load `explicit` if given (it must exist), else `<root>/codesmith.toml`
    /// if present, else defaults. Environment overrides are applied.
    pub fn load(root: &Path, explicit: Option<&Path>) -> Result<Self> {
        let mut config = match explicit {
            Some(path) => Self::read(path)?,
            None => {
                let default_path = root.join(DEFAULT_CONFIG_FILE);
                if default_path.is_file() {
                    Self::read(&default_path)?
                } else {
                    Self::default()
                }
            }
        };
        config.apply_env(|key| env::var(key).ok())?;
        Ok(config)
    }

    fn read(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        Self::from_toml_str(&text).with_context(|| format!("in {}", path.display()))
    }

    /// Apply environment overrides through `lookup` (injectable for tests).
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(kind) = lookup(ENV_PROVIDER) {
            self.provider.kind = kind.parse().map_err(anyhow::Error::msg)?;
        }
        if let Some(model) = lookup(ENV_MODEL) {
            self.provider.model = Some(model);
        }
        if let Some(url) = lookup(ENV_BASE_URL) {
            self.provider.base_url = Some(url);
        }
        if let Some(ms) = lookup(ENV_COOLDOWN_MS) {
            self.pipeline.cooldown_ms = ms
                .trim()
                .parse()
                .with_context(|| format!("{ENV_COOLDOWN_MS} must be an integer, got `{ms}`"))?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), String> {
        let temps = [
            ("planner_temperature", self.pipeline.planner_temperature),
            ("generator_temperature", self.pipeline.generator_temperature),
            ("merge_temperature", self.pipeline.merge_temperature),
        ];
        for (name, value) in temps {
            if !(0.0..=2.0).contains(&value) {
                return Err(format!("{name} must be in [0, 2], got {value}"));
            }
        }
        if self.provider.max_tokens == 0 {
            return Err("max_tokens must be > 0".to_string());
        }
        if self.provider.model().trim().is_empty() {
            return Err("model name must not be empty".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_match_documented_values() {
        let cfg = CodesmithConfig::default();
        assert_eq!(cfg.pipeline.cooldown_ms, 1_500);
        assert_eq!(cfg.pipeline.on_file_error, OnFileError::Continue);
        assert_eq!(cfg.pipeline.path_resolution, ResolutionPolicy::Closest);
        assert!(cfg.pipeline.model_reformat);
        assert_eq!(cfg.paths.backup_dir, PathBuf::from(".codesmith/backups"));
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn partial_toml_keeps_other_defaults() {
        let cfg = CodesmithConfig::from_toml_str(
            r#"
            [provider]
            kind = "gemini"

            [pipeline]
            on_file_error = "stop"
            path_resolution = "unambiguous"
            line_ending = "crlf"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.provider.kind, ProviderKind::Gemini);
        assert_eq!(cfg.provider.model(), "gemini-1.5-pro");
        assert_eq!(cfg.provider.api_key_env(), "GEMINI_API_KEY");
        assert_eq!(cfg.pipeline.on_file_error, OnFileError::Stop);
        assert_eq!(cfg.pipeline.line_ending.resolve(), LineEnding::Crlf);
        assert_eq!(cfg.pipeline.merge_temperature, 0.1);
    }

    #[test]
    fn env_overrides_file_values() {
        let mut cfg = CodesmithConfig::default();
        let vars: HashMap<&str, &str> = [
            ("CODESMITH_PROVIDER", "groq"),
            ("CODESMITH_MODEL", "mixtral"),
            ("CODESMITH_COOLDOWN_MS", "0"),
        ]
        .into_iter()
        .collect();
        cfg.apply_env(|k| vars.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(cfg.provider.kind, ProviderKind::Groq);
        assert_eq!(cfg.provider.model(), "mixtral");
        assert_eq!(cfg.pipeline.cooldown(), Duration::ZERO);
    }

    #[test]
    fn bad_env_values_are_errors() {
        let mut cfg = CodesmithConfig::default();
        assert!(cfg
            .apply_env(|k| (k == "CODESMITH_PROVIDER").then(|| "cohere".to_string()))
            .is_err());
        assert!(cfg
            .apply_env(|k| (k == "CODESMITH_COOLDOWN_MS").then(|| "soon".to_string()))
            .is_err());
    }

    #[test]
    fn validate_rejects_out_of_range_values() {
        let mut cfg = CodesmithConfig::default();
        cfg.pipeline.generator_temperature = 2.5;
        assert!(cfg.validate().unwrap_err().contains("generator_temperature"));

        let mut cfg = CodesmithConfig::default();
        cfg.provider.max_tokens = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = CodesmithConfig::default();
        cfg.provider.model = Some("  ".into());
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn load_reads_root_config_when_present() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(DEFAULT_CONFIG_FILE),
            "[pipeline]\nmerge_temperature = 0.0\n",
        )
        .unwrap();
        let cfg = CodesmithConfig::load(dir.path(), None).unwrap();
        assert_eq!(cfg.pipeline.merge_temperature, 0.0);
        assert!(CodesmithConfig::load(dir.path(), Some(Path::new("/nonexistent/x.toml"))).is_err());
    }

    #[test]
    fn provider_config_carries_section_values() {
        let section = ProviderSection {
            kind: ProviderKind::Anthropic,
            base_url: Some("http://proxy".into()),
            ..ProviderSection::default()
        };
        let cfg = section.with_api_key("k");
        assert_eq!(cfg.model, "claude-3-5-sonnet-latest");
        assert_eq!(cfg.base_url(), "http://proxy");
    }
}
