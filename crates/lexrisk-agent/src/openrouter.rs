use std::time::{Duration, Instant};

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use lexrisk_core::{analyzer::ClauseAnalyzer, config::Config, ClauseResult};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::{instruction::build_prompt, reply::parse_analysis};

/// Scores clauses with a chat-completions model served by OpenRouter.
///
/// Every failure on the way (transport error, timeout, non-2xx status,
/// unparseable reply) is folded into an `"Error"`-typed result; `analyze`
/// itself always returns `Ok`.
pub struct OpenRouterAnalyzer {
    client: reqwest::Client,
    pub api_url: String,
    pub api_key: String,
    pub model: String,
    pub temperature: f32,
    pub timeout_secs: u64,
}

impl OpenRouterAnalyzer {
    pub fn new(
        api_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url: api_url.into(),
            api_key: api_key.into(),
            model: model.into(),
            temperature: 0.3,
            timeout_secs: 60,
        }
    }

    /// Builds an analyzer with a keep-alive pool sized to the configured fan-out.
    pub fn from_config(config: &Config) -> Result<Self> {
        if config.openrouter_api_key.trim().is_empty() {
            bail!("OpenRouter API key is not configured");
        }
        let client = reqwest::Client::builder()
            .pool_max_idle_per_host(config.analyzer_max_concurrency)
            .build()
            .context("failed to build HTTP client")?;

        info!(model = %config.openrouter_model, "OpenRouter analyzer initialized");
        Ok(Self {
            client,
            temperature: config.openrouter_temperature,
            timeout_secs: config.analyzer_timeout_s,
            ..Self::new(
                config.openrouter_url.clone(),
                config.openrouter_api_key.clone(),
                config.openrouter_model.clone(),
            )
        })
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    async fn request_analysis(&self, clause: &str) -> Result<ClauseResult> {
        let body = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: build_prompt(clause),
            }],
            temperature: self.temperature,
        };

        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .timeout(Duration::from_secs(self.timeout_secs))
            .json(&body)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            warn!(status = %status, model = %self.model, "OpenRouter returned non-2xx: {}", text);
            bail!("OpenRouter API request failed with status {status}");
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| self.transport_error(e))
            .context("malformed OpenRouter response")?;

        if let Some(usage) = &parsed.usage {
            debug!(
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                total_tokens = usage.total_tokens,
                "OpenRouter usage"
            );
        }

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .context("OpenRouter response contained no message content")?;
        debug!(content = %truncate(&content, 200), "raw model reply");

        parse_analysis(clause, &content).inspect_err(|_| {
            warn!(content = %truncate(&content, 500), "model reply is not a usable JSON object");
        })
    }

    fn transport_error(&self, e: reqwest::Error) -> anyhow::Error {
        if e.is_timeout() {
            anyhow!("OpenRouter API request timed out after {}s", self.timeout_secs)
        } else {
            anyhow!(e).context("OpenRouter API request failed")
        }
    }
}

#[async_trait]
impl ClauseAnalyzer for OpenRouterAnalyzer {
    async fn analyze(&self, clause: &str) -> Result<ClauseResult> {
        let started = Instant::now();
        debug!(model = %self.model, clause = %truncate(clause, 100), "analyzing clause");

        match self.request_analysis(clause).await {
            Ok(result) => {
                debug!(
                    risk_score = result.risk_score,
                    clause_type = %result.clause_type,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "clause analyzed"
                );
                Ok(result)
            }
            Err(e) => {
                warn!(
                    model = %self.model,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "clause analysis failed: {e:#}"
                );
                Ok(ClauseResult::failed(
                    clause,
                    format!("Error analyzing clause: {e:#}"),
                ))
            }
        }
    }

    fn name(&self) -> &str {
        "openrouter"
    }
}

fn truncate(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((i, _)) => &s[..i],
        None => s,
    }
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: String,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
    usage: Option<ChatUsage>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct ChatUsage {
    prompt_tokens: Option<u64>,
    completion_tokens: Option<u64>,
    total_tokens: Option<u64>,
}
