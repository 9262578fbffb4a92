//! Optional JSON settings file.
//!
//! Settings fill the gap between built-in defaults and command-line flags. The
//! file is looked up in a fixed order (first existing file wins):
//!
//! 1. `$XDG_CONFIG_HOME/pdf_ocr_pipeline/config.json`
//! 2. `~/.config/pdf_ocr_pipeline/config.json`
//! 3. `~/.pdf_ocr_pipeline/config.json`
//! 4. `./pdf_ocr_pipeline_config.json`
//!
//! [`Settings::candidate_paths`] only assembles that list from values the
//! caller passes in; nothing here reads the environment.
//!
//! ```json
//! { "model": "gpt-4o-mini", "dpi": 400, "lang": "eng+spa", "pretty": true }
//! ```

use crate::config::{LlmConfigBuilder, OcrConfigBuilder};
use crate::error::PipelineError;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::debug;

const APP_DIR: &str = "pdf_ocr_pipeline";

/// Values read from a settings file. Every field is optional; unknown keys
/// are rejected so typos do not silently fall back to defaults.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub model: Option<String>,
    /// Free-form analysis instruction used by `summarize`.
    pub prompt: Option<String>,
    pub segment_prompt: Option<String>,
    pub system_prompt: Option<String>,
    pub dpi: Option<u32>,
    pub lang: Option<String>,
    pub concurrency: Option<usize>,
    pub llm_timeout_secs: Option<u64>,
    pub tool_timeout_secs: Option<u64>,
    pub verbose: Option<bool>,
    pub pretty: Option<bool>,
}

impl Settings {
    /// The lookup order described in the module docs.
    pub fn candidate_paths(
        xdg_config_home: Option<&Path>,
        home: Option<&Path>,
        cwd: &Path,
    ) -> Vec<PathBuf> {
        let mut paths = Vec::with_capacity(4);
        if let Some(xdg) = xdg_config_home.filter(|p| !p.as_os_str().is_empty()) {
            paths.push(xdg.join(APP_DIR).join("config.json"));
        }
        if let Some(home) = home {
            paths.push(home.join(".config").join(APP_DIR).join("config.json"));
            paths.push(home.join(format!(".{APP_DIR}")).join("config.json"));
        }
        paths.push(cwd.join(format!("{APP_DIR}_config.json")));
        paths
    }

    /// Parse one settings file.
    pub fn load(path: &Path) -> Result<Self, PipelineError> {
        let raw = std::fs::read_to_string(path).map_err(|e| PipelineError::SettingsLoad {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })?;
        serde_json::from_str(&raw).map_err(|e| PipelineError::SettingsLoad {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })
    }

    /// Load the first candidate that exists.
    ///
    /// Returns `Ok(None)` when no candidate exists. A file that exists but
    /// does not parse is an error rather than being skipped.
    pub fn discover(candidates: &[PathBuf]) -> Result<Option<(PathBuf, Self)>, PipelineError> {
        for path in candidates {
            if path.is_file() {
                debug!("Loading settings from {}", path.display());
                return Self::load(path).map(|s| Some((path.clone(), s)));
            }
        }
        Ok(None)
    }

    /// Apply file values to an OCR config builder. Flags applied afterwards win.
    pub fn apply_ocr(&self, mut builder: OcrConfigBuilder) -> OcrConfigBuilder {
        if let Some(dpi) = self.dpi {
            builder = builder.dpi(dpi);
        }
        if let Some(ref lang) = self.lang {
            builder = builder.language(lang.clone());
        }
        if let Some(n) = self.concurrency {
            builder = builder.concurrency(n);
        }
        if let Some(secs) = self.tool_timeout_secs {
            builder = builder.tool_timeout_secs(secs);
        }
        builder
    }

    /// Apply file values to an LLM config builder. Flags applied afterwards win.
    pub fn apply_llm(&self, mut builder: LlmConfigBuilder) -> LlmConfigBuilder {
        if let Some(ref key) = self.api_key {
            builder = builder.api_key(key.clone());
        }
        if let Some(ref url) = self.base_url {
            builder = builder.base_url(url.clone());
        }
        if let Some(ref model) = self.model {
            builder = builder.model(model.clone());
        }
        if let Some(ref prompt) = self.prompt {
            builder = builder.analysis_prompt(prompt.clone());
        }
        if let Some(ref prompt) = self.segment_prompt {
            builder = builder.segment_prompt(prompt.clone());
        }
        if let Some(ref prompt) = self.system_prompt {
            builder = builder.system_prompt(prompt.clone());
        }
        if let Some(secs) = self.llm_timeout_secs {
            builder = builder.timeout_secs(secs);
        }
        builder
    }
}
