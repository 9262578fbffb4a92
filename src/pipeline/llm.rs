//! LLM interaction: one request, one classified answer.
//!
//! [`LlmClient::send`] performs exactly one round trip and returns the raw
//! text of the model's reply. It does not retry: a caller that wants retries
//! checks [`PipelineError::is_retryable`] and decides for itself.
//!
//! Failures are split into two kinds because they call for different
//! handling:
//!
//! | Kind | Examples | Retry? |
//! |------|----------|--------|
//! | [`PipelineError::LlmTransportFailure`] | connect error, timeout, 401/403, 429, 5xx | yes, with backoff |
//! | [`PipelineError::LlmSchemaFailure`] | non-JSON body, missing/empty `choices[0].message.content` | no |
//!
//! Two backends implement [`LlmBackend`]:
//!
//! - [`OpenAiCompatibleBackend`]: chat-completions over `reqwest`, with the
//!   credential and base URL taken from [`LlmConfig`]
//! - [`ProviderBackend`]: any `edgequake_llm` provider (Anthropic, Gemini,
//!   Ollama, …)

use crate::config::LlmConfig;
use crate::error::PipelineError;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, ProviderFactory};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Everything a backend needs for one completion.
#[derive(Debug, Clone)]
pub struct LlmRequest {
    pub system_prompt: String,
    pub user_content: String,
    pub model: String,
    pub timeout: Duration,
    /// Ask the endpoint for a JSON object response, where supported.
    pub json_mode: bool,
    pub temperature: f32,
    pub max_tokens: usize,
}

/// A transport capable of answering an [`LlmRequest`].
pub trait LlmBackend: Send + Sync {
    fn complete<'a>(&'a self, request: &'a LlmRequest) -> BoxFuture<'a, Result<String, PipelineError>>;

    /// Short name used in logs.
    fn name(&self) -> &str;
}

// ── Client ───────────────────────────────────────────────────────────────────

/// Cheap-to-clone handle on a backend plus request defaults.
#[derive(Clone)]
pub struct LlmClient {
    backend: Arc<dyn LlmBackend>,
    temperature: f32,
    max_tokens: usize,
}

impl std::fmt::Debug for LlmClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmClient")
            .field("backend", &self.backend.name())
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .finish()
    }
}

impl LlmClient {
    pub fn new(backend: Arc<dyn LlmBackend>) -> Self {
        let defaults = LlmConfig::default();
        Self {
            backend,
            temperature: defaults.temperature,
            max_tokens: defaults.max_tokens,
        }
    }

    /// Client over the OpenAI-compatible HTTP backend built from `config`.
    pub fn from_config(config: &LlmConfig) -> Result<Self, PipelineError> {
        let backend = OpenAiCompatibleBackend::new(config)?;
        Ok(Self::new(Arc::new(backend)).with_sampling(config.temperature, config.max_tokens))
    }

    pub fn with_sampling(mut self, temperature: f32, max_tokens: usize) -> Self {
        self.temperature = temperature;
        self.max_tokens = max_tokens;
        self
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// Send one prompt and return the model's raw reply.
    pub async fn send(
        &self,
        system_prompt: &str,
        user_content: &str,
        model: &str,
        timeout: Duration,
    ) -> Result<String, PipelineError> {
        self.send_request(LlmRequest {
            system_prompt: system_prompt.to_string(),
            user_content: user_content.to_string(),
            model: model.to_string(),
            timeout,
            json_mode: false,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        })
        .await
    }

    /// As [`send`](Self::send), asking the endpoint for a JSON object.
    pub async fn send_json(
        &self,
        system_prompt: &str,
        user_content: &str,
        model: &str,
        timeout: Duration,
    ) -> Result<String, PipelineError> {
        self.send_request(LlmRequest {
            system_prompt: system_prompt.to_string(),
            user_content: user_content.to_string(),
            model: model.to_string(),
            timeout,
            json_mode: true,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        })
        .await
    }

    pub async fn send_request(&self, request: LlmRequest) -> Result<String, PipelineError> {
        let start = Instant::now();
        info!(
            "LLM request via {}: model={} (~{} chars)",
            self.backend.name(),
            request.model,
            request.system_prompt.len() + request.user_content.len()
        );

        // The backend's own timeout should fire first; this one also bounds
        // backends that ignore `request.timeout`.
        let result = match tokio::time::timeout(request.timeout, self.backend.complete(&request)).await {
            Ok(result) => result,
            Err(_) => Err(PipelineError::transport(
                format!("request timed out after {}s", request.timeout.as_secs()),
                None,
            )),
        };

        match &result {
            Ok(text) => debug!(
                "LLM reply: {} chars in {:?}",
                text.len(),
                start.elapsed()
            ),
            Err(e) => warn!("LLM request failed: {}", e),
        }
        result
    }
}

// ── OpenAI-compatible backend ────────────────────────────────────────────────

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [WireMessage<'a>; 2],
    temperature: f32,
    max_tokens: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Serialize)]
struct WireMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: Option<ResponseMessage>,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

/// Chat-completions client for OpenAI and compatible gateways.
pub struct OpenAiCompatibleBackend {
    http: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
}

impl OpenAiCompatibleBackend {
    pub fn new(config: &LlmConfig) -> Result<Self, PipelineError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| PipelineError::Internal(format!("HTTP client: {e}")))?;
        Ok(Self {
            http,
            endpoint: format!("{}/chat/completions", config.base_url),
            api_key: config.api_key.clone(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn post(&self, request: &LlmRequest) -> Result<String, PipelineError> {
        let body = ChatRequest {
            model: &request.model,
            messages: [
                WireMessage {
                    role: "system",
                    content: &request.system_prompt,
                },
                WireMessage {
                    role: "user",
                    content: &request.user_content,
                },
            ],
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            response_format: request.json_mode.then_some(ResponseFormat {
                kind: "json_object",
            }),
        };

        let mut builder = self
            .http
            .post(&self.endpoint)
            .timeout(request.timeout)
            .json(&body);
        if let Some(ref key) = self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await.map_err(|e| {
            let detail = if e.is_timeout() {
                format!("request timed out after {}s", request.timeout.as_secs())
            } else if e.is_connect() {
                format!("cannot connect to {}: {e}", self.endpoint)
            } else {
                e.to_string()
            };
            PipelineError::transport(detail, None)
        })?;

        let status = response.status();
        let text = response.text().await.map_err(|e| {
            PipelineError::transport(format!("reading response body: {e}"), Some(status.as_u16()))
        })?;

        if !status.is_success() {
            let detail = match status.as_u16() {
                401 | 403 => "authentication rejected; check the API key".to_string(),
                429 => "rate limited".to_string(),
                _ => format!("endpoint returned {status}"),
            };
            return Err(PipelineError::transport(
                format!("{detail}: {}", snippet(&text)),
                Some(status.as_u16()),
            ));
        }

        extract_content(&text)
    }
}

impl LlmBackend for OpenAiCompatibleBackend {
    fn complete<'a>(&'a self, request: &'a LlmRequest) -> BoxFuture<'a, Result<String, PipelineError>> {
        Box::pin(self.post(request))
    }

    fn name(&self) -> &str {
        "openai-compatible"
    }
}

/// Pull `choices[0].message.content` out of a chat-completions body.
fn extract_content(body: &str) -> Result<String, PipelineError> {
    let parsed: ChatResponse = serde_json::from_str(body).map_err(|e| {
        PipelineError::schema(format!("response body is not chat-completions JSON: {e}"))
    })?;
    let content = parsed
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message)
        .and_then(|m| m.content)
        .ok_or_else(|| PipelineError::schema("response has no choices[0].message.content"))?;
    if content.trim().is_empty() {
        return Err(PipelineError::schema("response content is empty"));
    }
    Ok(content)
}

fn snippet(text: &str) -> String {
    const MAX: usize = 200;
    let trimmed = text.trim();
    match trimmed.char_indices().nth(MAX) {
        Some((cut, _)) => format!("{}…", &trimmed[..cut]),
        None => trimmed.to_string(),
    }
}

// ── edgequake-llm provider backend ──────────────────────────────────────────

/// Adapter over an `edgequake_llm` provider.
///
/// The provider picks its own endpoint and credential; `request.model` is
/// informational here because the model is fixed when the provider is built.
pub struct ProviderBackend {
    provider: Arc<dyn LLMProvider>,
    label: String,
}

impl ProviderBackend {
    pub fn new(provider: Arc<dyn LLMProvider>, label: impl Into<String>) -> Self {
        Self {
            provider,
            label: label.into(),
        }
    }

    /// Instantiate a named provider (`"anthropic"`, `"gemini"`, `"ollama"`, …)
    /// with the given model via [`ProviderFactory::create_llm_provider`]. The
    /// factory reads the provider's own API-key variable.
    pub fn from_name(provider_name: &str, model: &str) -> Result<Self, PipelineError> {
        let provider = ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
            PipelineError::InvalidConfig(format!(
                "LLM provider '{provider_name}' is not available: {e}"
            ))
        })?;
        Ok(Self::new(provider, provider_name))
    }

    async fn chat(&self, request: &LlmRequest) -> Result<String, PipelineError> {
        let messages = vec![
            ChatMessage::system(&request.system_prompt),
            ChatMessage::user_with_images(&request.user_content, Vec::new()),
        ];
        let options = completion_options(request);

        let response = self
            .provider
            .chat(&messages, Some(&options))
            .await
            .map_err(|e| PipelineError::transport(format!("{}: {e}", self.label), None))?;
        debug!(
            "{}: {} input tokens, {} output tokens",
            self.label, response.prompt_tokens, response.completion_tokens
        );
        if response.content.trim().is_empty() {
            return Err(PipelineError::schema(format!(
                "{} returned an empty completion",
                self.label
            )));
        }
        Ok(response.content)
    }
}

/// Sampling and response-format options for a provider call.
fn completion_options(request: &LlmRequest) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(request.temperature),
        max_tokens: Some(request.max_tokens),
        response_format: request.json_mode.then(|| "json_object".to_string()),
        ..Default::default()
    }
}

impl LlmBackend for ProviderBackend {
    fn complete<'a>(&'a self, request: &'a LlmRequest) -> BoxFuture<'a, Result<String, PipelineError>> {
        Box::pin(self.chat(request))
    }

    fn name(&self) -> &str {
        &self.label
    }
}
