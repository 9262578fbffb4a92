//! Configuration types for the OCR and LLM stages.
//!
//! The library never reads environment variables or files on its own: every
//! knob arrives through these structs, which callers fill from whatever
//! settings source they use (the CLI layers flags, env vars and
//! [`crate::settings::Settings`]).
//!
//! Both configs are built through builders that clamp obviously bad values and
//! validate the rest in `build()`, following the same pattern for each stage.

use crate::error::PipelineError;
use std::fmt;
use std::time::Duration;

/// Default rendering resolution in DPI.
pub const DEFAULT_DPI: u32 = 300;
/// Default tesseract language code.
pub const DEFAULT_LANGUAGE: &str = "eng";
/// Default model identifier sent to the LLM endpoint.
pub const DEFAULT_MODEL: &str = "gpt-4o";
/// Default OpenAI-compatible API root.
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Configuration for the OCR stage.
///
/// # Example
/// ```rust
/// use pdf_ocr_pipeline::OcrConfig;
///
/// let config = OcrConfig::builder()
///     .dpi(400)
///     .language("deu")
///     .concurrency(2)
///     .build()
///     .unwrap();
/// assert_eq!(config.language, "deu");
/// ```
#[derive(Debug, Clone)]
pub struct OcrConfig {
    /// Rasterisation resolution passed to both tools. Range: 36–1200. Default: 300.
    ///
    /// Tesseract is tuned for ~300 DPI scans; lower values lose small print,
    /// higher values mostly cost time.
    pub dpi: u32,

    /// Tesseract language code, e.g. `"eng"` or `"eng+deu"`. Default: `"eng"`.
    pub language: String,

    /// Raster tool name or path. Default: `"pdftoppm"`.
    pub raster_tool: String,

    /// Recognition tool name or path. Default: `"tesseract"`.
    pub recognition_tool: String,

    /// Per-subprocess timeout in seconds. Default: 300.
    ///
    /// Applies to each raster call and to each page's recognition call. A
    /// process that exceeds it is killed, never left running.
    pub tool_timeout_secs: u64,

    /// Timeout of the one-time streaming capability probe in seconds. Default: 5.
    pub probe_timeout_secs: u64,

    /// Number of PDFs processed at once by [`crate::Pipeline::ocr_many`]. Default: 4.
    ///
    /// Pages within a single PDF are always recognised sequentially.
    pub concurrency: usize,

    /// Apply [`crate::pipeline::postprocess::clean_page_text`] to each page. Default: true.
    pub normalize_text: bool,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            dpi: DEFAULT_DPI,
            language: DEFAULT_LANGUAGE.to_string(),
            raster_tool: "pdftoppm".to_string(),
            recognition_tool: "tesseract".to_string(),
            tool_timeout_secs: 300,
            probe_timeout_secs: 5,
            concurrency: 4,
            normalize_text: true,
        }
    }
}

impl OcrConfig {
    /// Create a new builder for `OcrConfig`.
    pub fn builder() -> OcrConfigBuilder {
        OcrConfigBuilder {
            config: Self::default(),
        }
    }

    pub fn tool_timeout(&self) -> Duration {
        Duration::from_secs(self.tool_timeout_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }
}

/// Builder for [`OcrConfig`].
#[derive(Debug)]
pub struct OcrConfigBuilder {
    config: OcrConfig,
}

impl OcrConfigBuilder {
    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.dpi = dpi;
        self
    }

    pub fn language(mut self, language: impl Into<String>) -> Self {
        self.config.language = language.into();
        self
    }

    pub fn raster_tool(mut self, tool: impl Into<String>) -> Self {
        self.config.raster_tool = tool.into();
        self
    }

    pub fn recognition_tool(mut self, tool: impl Into<String>) -> Self {
        self.config.recognition_tool = tool.into();
        self
    }

    pub fn tool_timeout_secs(mut self, secs: u64) -> Self {
        self.config.tool_timeout_secs = secs.max(1);
        self
    }

    pub fn probe_timeout_secs(mut self, secs: u64) -> Self {
        self.config.probe_timeout_secs = secs.max(1);
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn normalize_text(mut self, v: bool) -> Self {
        self.config.normalize_text = v;
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<OcrConfig, PipelineError> {
        let c = &self.config;
        if !(36..=1200).contains(&c.dpi) {
            return Err(PipelineError::InvalidConfig(format!(
                "DPI must be 36–1200, got {}",
                c.dpi
            )));
        }
        if c.language.trim().is_empty() {
            return Err(PipelineError::InvalidConfig(
                "OCR language must not be empty".into(),
            ));
        }
        if c.raster_tool.trim().is_empty() || c.recognition_tool.trim().is_empty() {
            return Err(PipelineError::InvalidConfig(
                "Tool names must not be empty".into(),
            ));
        }
        Ok(self.config)
    }
}

/// Configuration for the LLM stage.
#[derive(Clone)]
pub struct LlmConfig {
    /// OpenAI-compatible API root, without the `/chat/completions` suffix.
    pub base_url: String,

    /// Bearer credential. `None` sends no `Authorization` header (local gateways).
    pub api_key: Option<String>,

    /// Model identifier. Default: `"gpt-4o"`.
    pub model: String,

    /// Per-call timeout in seconds, covering connect, request and body. Default: 120.
    pub timeout_secs: u64,

    /// Sampling temperature. Default: 0.0.
    pub temperature: f32,

    /// Maximum completion tokens. Default: 4096.
    pub max_tokens: usize,

    /// Override for the analysis system prompt.
    pub system_prompt: Option<String>,

    /// Override for the segmentation instruction template.
    pub segment_prompt: Option<String>,

    /// Override for the free-form analysis instruction.
    pub analysis_prompt: Option<String>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            timeout_secs: 120,
            temperature: 0.0,
            max_tokens: 4096,
            system_prompt: None,
            segment_prompt: None,
            analysis_prompt: None,
        }
    }
}

impl fmt::Debug for LlmConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LlmConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("model", &self.model)
            .field("timeout_secs", &self.timeout_secs)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("system_prompt", &self.system_prompt.is_some())
            .field("segment_prompt", &self.segment_prompt.is_some())
            .field("analysis_prompt", &self.analysis_prompt.is_some())
            .finish()
    }
}

impl LlmConfig {
    /// Create a new builder for `LlmConfig`.
    pub fn builder() -> LlmConfigBuilder {
        LlmConfigBuilder {
            config: Self::default(),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Builder for [`LlmConfig`].
#[derive(Debug)]
pub struct LlmConfigBuilder {
    config: LlmConfig,
}

impl LlmConfigBuilder {
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.config.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.config.api_key = Some(key.into());
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into();
        self
    }

    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.config.timeout_secs = secs.max(1);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = Some(prompt.into());
        self
    }

    pub fn segment_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.segment_prompt = Some(prompt.into());
        self
    }

    pub fn analysis_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.analysis_prompt = Some(prompt.into());
        self
    }

    /// Build the configuration, validating constraints.
    ///
    /// Keys that are empty or still look like the `sk-xxxxxxxx` placeholder
    /// from sample config files are rejected here rather than at the first
    /// request.
    pub fn build(self) -> Result<LlmConfig, PipelineError> {
        let c = &self.config;
        if !(c.base_url.starts_with("http://") || c.base_url.starts_with("https://")) {
            return Err(PipelineError::InvalidConfig(format!(
                "LLM base URL must be http(s), got '{}'",
                c.base_url
            )));
        }
        if c.model.trim().is_empty() {
            return Err(PipelineError::InvalidConfig("Model must not be empty".into()));
        }
        if let Some(ref key) = c.api_key {
            let key = key.trim();
            if key.is_empty() || key.to_lowercase().starts_with("sk-xxxxxxxx") {
                return Err(PipelineError::InvalidConfig(
                    "API key is empty or looks like a placeholder".into(),
                ));
            }
        }
        if c.max_tokens == 0 {
            return Err(PipelineError::InvalidConfig("max_tokens must be ≥ 1".into()));
        }
        Ok(self.config)
    }
}

/// Both stage configurations, as handed to [`crate::Pipeline::new`].
#[derive(Debug, Clone, Default)]
pub struct PipelineConfig {
    pub ocr: OcrConfig,
    pub llm: LlmConfig,
}

impl PipelineConfig {
    pub fn new(ocr: OcrConfig, llm: LlmConfig) -> Self {
        Self { ocr, llm }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ocr_defaults() {
        let c = OcrConfig::default();
        assert_eq!(c.dpi, 300);
        assert_eq!(c.language, "eng");
        assert_eq!(c.raster_tool, "pdftoppm");
        assert_eq!(c.recognition_tool, "tesseract");
        assert_eq!(c.probe_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn ocr_rejects_out_of_range_dpi() {
        assert!(OcrConfig::builder().dpi(10).build().is_err());
        assert!(OcrConfig::builder().dpi(5000).build().is_err());
        assert!(OcrConfig::builder().dpi(600).build().is_ok());
    }

    #[test]
    fn ocr_rejects_blank_language() {
        let err = OcrConfig::builder().language("  ").build().unwrap_err();
        assert!(err.to_string().contains("language"));
    }

    #[test]
    fn ocr_concurrency_clamped_to_one() {
        let c = OcrConfig::builder().concurrency(0).build().unwrap();
        assert_eq!(c.concurrency, 1);
    }

    #[test]
    fn llm_rejects_placeholder_key() {
        let err = LlmConfig::builder()
            .api_key("sk-xxxxxxxxxxxxxxxx")
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("placeholder"));
    }

    #[test]
    fn llm_base_url_trailing_slash_trimmed() {
        let c = LlmConfig::builder()
            .base_url("http://localhost:8080/v1/")
            .build()
            .unwrap();
        assert_eq!(c.base_url, "http://localhost:8080/v1");
    }

    #[test]
    fn llm_debug_redacts_key() {
        let c = LlmConfig::builder().api_key("sk-live-secret").build().unwrap();
        let dbg = format!("{c:?}");
        assert!(!dbg.contains("sk-live-secret"));
        assert!(dbg.contains("<redacted>"));
    }

    #[test]
    fn llm_rejects_non_http_url() {
        assert!(LlmConfig::builder().base_url("ftp://x").build().is_err());
    }
}
