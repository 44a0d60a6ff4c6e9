use std::env;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use recap_core::StrictnessMode;

/// Note-generation pipeline knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotesConfig {
    pub min_chunk_window_ms: i64,
    pub max_chunk_window_ms: i64,
    /// Minimum gap between the completion of one chunk and the start of the next.
    pub batch_interval_ms: i64,
    pub min_segments_per_chunk: usize,
    pub max_segments_per_chunk: usize,
    pub strictness_mode: StrictnessMode,
    pub min_scope_keywords: usize,
    pub max_scope_keywords: usize,
    pub max_tokens: u32,
    pub temperature: f32,
    /// When false, debug artifacts (subject history rows, draft relevance
    /// labels) are kept in memory only and never written to the repositories.
    pub store_debug_data: bool,
    /// Let an LLM second-opinion rescue action items the rule-based validator
    /// rejected. Off by default.
    pub llm_action_validation: bool,
}

impl Default for NotesConfig {
    fn default() -> Self {
        Self {
            min_chunk_window_ms: 20_000,
            max_chunk_window_ms: 60_000,
            batch_interval_ms: 30_000,
            min_segments_per_chunk: 2,
            max_segments_per_chunk: 30,
            strictness_mode: StrictnessMode::Strict,
            min_scope_keywords: 5,
            max_scope_keywords: 15,
            max_tokens: 4096,
            temperature: 0.3,
            store_debug_data: true,
            llm_action_validation: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub provider: String,
    pub ollama_model: String,
    pub openrouter_model: String,
    /// Base URL for the Ollama API.  Overridden at runtime by the
    /// `OLLAMA_BASE_URL` environment variable when set.
    pub ollama_base_url: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "ollama".to_string(),
            ollama_model: "llama3.1:8b".to_string(),
            openrouter_model: "openai/gpt-4o-mini".to_string(),
            ollama_base_url: "http://localhost:11434".to_string(),
        }
    }
}

/// Logging knobs. Transcript text stays out of the logs unless
/// `log_transcript_content` is flipped on, since meeting audio routinely
/// contains things that must not land in log aggregation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Either a bare level (`info`, `debug`) scoped to the recap crates, or
    /// a full filter directive (`recap_session=debug,recap_llm=trace`).
    pub log_level: String,
    pub log_transcript_content: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_transcript_content: false,
        }
    }
}

impl TelemetryConfig {
    /// Directive string for a `tracing_subscriber` env filter. Bare levels
    /// are scoped to the recap crates so embedder noise stays at default.
    pub fn env_filter(&self) -> String {
        if self.log_level.contains('=') {
            self.log_level.clone()
        } else {
            format!("recap={}", self.log_level)
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub notes: NotesConfig,
    pub llm: LlmConfig,
    pub telemetry: TelemetryConfig,
}

impl AppConfig {
    /// Read the config at `path`. A missing file yields pure defaults; a
    /// file that exists but does not parse is an error (silently ignoring a
    /// typo'd strictness mode would change what the final output keeps).
    /// `OLLAMA_BASE_URL` in the environment beats the file.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = match fs::read_to_string(path) {
            Ok(raw) => toml::from_str(&raw)
                .with_context(|| format!("parse config {}", path.display()))?,
            Err(_) => Self::default(),
        };
        config.apply_env_overrides();
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        match env::var("OLLAMA_BASE_URL") {
            Ok(url) if !url.trim().is_empty() => self.llm.ollama_base_url = url,
            _ => {}
        }
    }

    pub fn save_to(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let body = toml::to_string_pretty(self).context("serialize config")?;
        match path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => fs::create_dir_all(dir)?,
            _ => {}
        }
        fs::write(path, body).with_context(|| format!("write config {}", path.display()))
    }

    /// Model the configured provider will be driven with.
    pub fn active_model(&self) -> &str {
        match self.llm.provider.to_lowercase().as_str() {
            "openrouter" => &self.llm.openrouter_model,
            _ => &self.llm.ollama_model,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let cfg = NotesConfig::default();
        assert_eq!(cfg.min_chunk_window_ms, 20_000);
        assert_eq!(cfg.max_chunk_window_ms, 60_000);
        assert_eq!(cfg.batch_interval_ms, 30_000);
        assert_eq!(cfg.min_segments_per_chunk, 2);
        assert_eq!(cfg.max_segments_per_chunk, 30);
        assert_eq!(cfg.strictness_mode, StrictnessMode::Strict);
        assert_eq!(cfg.min_scope_keywords, 5);
        assert_eq!(cfg.max_scope_keywords, 15);
        assert_eq!(cfg.max_tokens, 4096);
        assert!((cfg.temperature - 0.3).abs() < f32::EPSILON);
        assert!(cfg.store_debug_data);
        assert!(!cfg.llm_action_validation);
    }

    #[test]
    fn missing_file_yields_defaults() {
        let cfg = AppConfig::load_from("/definitely/not/here.toml").unwrap();
        assert_eq!(cfg.llm.provider, "ollama");
        assert_eq!(cfg.notes.max_segments_per_chunk, 30);
    }

    #[test]
    fn save_and_reload_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("recap.toml");

        let mut cfg = AppConfig::default();
        cfg.notes.strictness_mode = StrictnessMode::Loose;
        cfg.notes.batch_interval_ms = 10_000;
        cfg.save_to(&path).unwrap();

        let loaded = AppConfig::load_from(&path).unwrap();
        assert_eq!(loaded.notes.strictness_mode, StrictnessMode::Loose);
        assert_eq!(loaded.notes.batch_interval_ms, 10_000);
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("partial.toml");
        fs::write(&path, "[notes]\nstrictness_mode = \"balanced\"\n").unwrap();

        let cfg = AppConfig::load_from(&path).unwrap();
        assert_eq!(cfg.notes.strictness_mode, StrictnessMode::Balanced);
        assert_eq!(cfg.notes.min_scope_keywords, 5);
    }

    #[test]
    fn malformed_file_is_an_error_not_a_silent_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.toml");
        fs::write(&path, "notes = \"not a table\"\n").unwrap();

        let err = AppConfig::load_from(&path).unwrap_err();
        assert!(err.to_string().contains("parse config"));
    }

    #[test]
    fn env_filter_scopes_bare_levels_to_recap() {
        let mut telemetry = TelemetryConfig::default();
        assert_eq!(telemetry.env_filter(), "recap=info");

        telemetry.log_level = "debug".to_string();
        assert_eq!(telemetry.env_filter(), "recap=debug");

        telemetry.log_level = "recap_session=debug,recap_llm=trace".to_string();
        assert_eq!(telemetry.env_filter(), "recap_session=debug,recap_llm=trace");
    }

    #[test]
    fn transcript_content_logging_defaults_off() {
        assert!(!TelemetryConfig::default().log_transcript_content);
    }

    #[test]
    fn active_model_follows_provider() {
        let mut cfg = AppConfig::default();
        assert_eq!(cfg.active_model(), "llama3.1:8b");
        cfg.llm.provider = "OpenRouter".to_string();
        assert_eq!(cfg.active_model(), "openai/gpt-4o-mini");
    }
}
