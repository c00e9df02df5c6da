//! Anthropic Messages API-backed `LlmProvider`.
//!
//! Bridges the domain's provider-neutral `CompletionRequest`/
//! `CompletionResponse` to the wire shape of `POST /v1/messages`, reusing
//! the rate limiter and retry policy shared across outbound adapters.

use async_trait::async_trait;
use reqwest::{Client as ReqwestClient, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, instrument, warn};

use crate::domain::ports::{
    ChatRole, CompletionRequest, CompletionResponse, HealthStatus, LlmProvider, LlmProviderError,
    RequestedToolCall, StopReason, TokenUsage,
};
use crate::infrastructure::resilience::{RetryPolicy, TokenBucketRateLimiter, Transient};

pub struct AnthropicProviderConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub rate_limit_rpm: f64,
    pub retry_policy: RetryPolicy,
}

impl Default for AnthropicProviderConfig {
    fn default() -> Self {
        Self {
            api_key: std::env::var("ANTHROPIC_API_KEY").unwrap_or_default(),
            base_url: "https://api.anthropic.com".to_string(),
            model: "claude-3-5-sonnet-20241022".to_string(),
            rate_limit_rpm: 300.0,
            retry_policy: RetryPolicy::default(),
        }
    }
}

pub struct AnthropicProvider {
    http_client: ReqwestClient,
    api_key: String,
    base_url: String,
    model: String,
    rate_limiter: TokenBucketRateLimiter,
    retry_policy: RetryPolicy,
}

impl AnthropicProvider {
    pub fn new(config: AnthropicProviderConfig) -> Result<Self, LlmProviderError> {
        let http_client = ReqwestClient::builder()
            .timeout(Duration::from_secs(120))
            .pool_max_idle_per_host(10)
            .tcp_nodelay(true)
            .build()
            .map_err(|e| LlmProviderError::NotConfigured(e.to_string()))?;

        Ok(Self {
            http_client,
            api_key: config.api_key,
            base_url: config.base_url,
            model: config.model,
            rate_limiter: TokenBucketRateLimiter::new(config.rate_limit_rpm),
            retry_policy: config.retry_policy,
        })
    }

    async fn send(&self, wire_request: &WireRequest) -> Result<WireResponse, AnthropicApiError> {
        let response = self
            .http_client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(wire_request)
            .send()
            .await
            .map_err(|e| AnthropicApiError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AnthropicApiError::from_status(status, body));
        }

        response
            .json::<WireResponse>()
            .await
            .map_err(|e| AnthropicApiError::Network(e.to_string()))
    }
}

#[async_trait]
impl LlmProvider for AnthropicProvider {
    fn provider_id(&self) -> &str {
        "anthropic"
    }

    #[instrument(skip(self, request))]
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmProviderError> {
        let wire_request = WireRequest::from_domain(&self.model, &request);

        self.rate_limiter.acquire().await;

        let started = Instant::now();
        let wire_response = self
            .retry_policy
            .execute(|| self.send(&wire_request))
            .await
            .map_err(LlmProviderError::from)?;

        debug!(elapsed_ms = started.elapsed().as_millis() as u64, "anthropic completion returned");
        Ok(wire_response.into_domain())
    }

    async fn health_check(&self) -> Result<HealthStatus, LlmProviderError> {
        let probe = WireRequest {
            model: self.model.clone(),
            messages: vec![WireMessage { role: "user".to_string(), content: "ping".to_string() }],
            max_tokens: 1,
            system: None,
            tools: None,
        };

        match self.send(&probe).await {
            Ok(_) => Ok(HealthStatus::Healthy),
            Err(err) if err.is_transient() => {
                warn!(%err, "anthropic health check saw a transient failure");
                Ok(HealthStatus::Degraded)
            }
            Err(err) => {
                warn!(%err, "anthropic health check failed permanently");
                Ok(HealthStatus::Unavailable)
            }
        }
    }
}

#[derive(Debug, Serialize)]
struct WireRequest {
    model: String,
    messages: Vec<WireMessage>,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<WireTool>>,
}

impl WireRequest {
    fn from_domain(model: &str, request: &CompletionRequest) -> Self {
        Self {
            model: model.to_string(),
            messages: request.messages.iter().map(WireMessage::from_domain).collect(),
            max_tokens: request.parameters.max_tokens.unwrap_or(4096),
            system: Some(request.system_prompt.clone()),
            tools: if request.tools.is_empty() {
                None
            } else {
                Some(request.tools.iter().map(WireTool::from_domain).collect())
            },
        }
    }
}

#[derive(Debug, Serialize)]
struct WireMessage {
    role: String,
    content: String,
}

impl WireMessage {
    fn from_domain(msg: &crate::domain::ports::ChatMessage) -> Self {
        Self {
            role: match msg.role {
                ChatRole::User => "user".to_string(),
                ChatRole::Assistant => "assistant".to_string(),
            },
            content: msg.content.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
struct WireTool {
    name: String,
    description: String,
    input_schema: serde_json::Value,
}

impl WireTool {
    fn from_domain(tool: &crate::domain::models::ToolDescriptor) -> Self {
        Self {
            name: tool.name.clone(),
            description: tool.description.clone(),
            input_schema: tool.input_schema.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct WireResponse {
    content: Vec<WireContentBlock>,
    stop_reason: Option<String>,
    usage: Option<WireUsage>,
}

impl WireResponse {
    fn into_domain(self) -> CompletionResponse {
        let mut text = String::new();
        let mut tool_calls = Vec::new();

        for block in self.content {
            match block {
                WireContentBlock::Text { text: t } => text.push_str(&t),
                WireContentBlock::ToolUse { id, name, input } => {
                    tool_calls.push(RequestedToolCall { id, tool_name: name, arguments: input });
                }
            }
        }

        let stop_reason = match self.stop_reason.as_deref() {
            Some("tool_use") => StopReason::ToolUse,
            Some("max_tokens") => StopReason::MaxTokens,
            Some("end_turn") | Some("stop_sequence") => StopReason::EndTurn,
            _ => StopReason::EndTurn,
        };

        CompletionResponse {
            content: text,
            tool_calls,
            stop_reason,
            usage: self.usage.map(|u| TokenUsage { input_tokens: u.input_tokens, output_tokens: u.output_tokens }),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WireContentBlock {
    Text { text: String },
    ToolUse { id: String, name: String, input: serde_json::Value },
}

#[derive(Debug, Deserialize)]
struct WireUsage {
    input_tokens: u32,
    output_tokens: u32,
}

#[derive(Debug, thiserror::Error, Clone)]
enum AnthropicApiError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("invalid api key")]
    InvalidApiKey,
    #[error("rate limit exceeded")]
    RateLimitExceeded,
    #[error("server error ({0}): {1}")]
    ServerError(u16, String),
    #[error("network error: {0}")]
    Network(String),
    #[error("unknown error ({0}): {1}")]
    Unknown(u16, String),
}

impl AnthropicApiError {
    fn from_status(status: StatusCode, body: String) -> Self {
        match status.as_u16() {
            400 => Self::InvalidRequest(body),
            401 => Self::InvalidApiKey,
            429 => Self::RateLimitExceeded,
            500 | 502 | 503 | 504 | 529 => Self::ServerError(status.as_u16(), body),
            other => Self::Unknown(other, body),
        }
    }
}

impl Transient for AnthropicApiError {
    fn is_transient(&self) -> bool {
        matches!(self, Self::RateLimitExceeded | Self::ServerError(_, _) | Self::Network(_))
    }
}

impl From<AnthropicApiError> for LlmProviderError {
    fn from(err: AnthropicApiError) -> Self {
        match err {
            AnthropicApiError::InvalidApiKey => LlmProviderError::NotConfigured("invalid API key".to_string()),
            AnthropicApiError::RateLimitExceeded => LlmProviderError::RateLimitExceeded("429 from provider".to_string()),
            AnthropicApiError::Network(e) => LlmProviderError::NetworkError(e),
            AnthropicApiError::InvalidRequest(e) => LlmProviderError::ExecutionFailed(e),
            AnthropicApiError::ServerError(status, body) => {
                LlmProviderError::Unavailable(format!("{status}: {body}"))
            }
            AnthropicApiError::Unknown(status, body) => LlmProviderError::ExecutionFailed(format!("{status}: {body}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_429_and_5xx_as_transient() {
        assert!(AnthropicApiError::from_status(StatusCode::TOO_MANY_REQUESTS, String::new()).is_transient());
        assert!(AnthropicApiError::from_status(StatusCode::BAD_GATEWAY, String::new()).is_transient());
        assert!(!AnthropicApiError::from_status(StatusCode::UNAUTHORIZED, String::new()).is_transient());
        assert!(!AnthropicApiError::from_status(StatusCode::BAD_REQUEST, String::new()).is_transient());
    }

    #[test]
    fn wire_response_splits_text_and_tool_calls() {
        let response = WireResponse {
            content: vec![
                WireContentBlock::Text { text: "Here is the plan".to_string() },
                WireContentBlock::ToolUse {
                    id: "call-1".to_string(),
                    name: "query_assets".to_string(),
                    input: serde_json::json!({"environments": ["staging"]}),
                },
            ],
            stop_reason: Some("tool_use".to_string()),
            usage: Some(WireUsage { input_tokens: 100, output_tokens: 50 }),
        };

        let domain = response.into_domain();
        assert_eq!(domain.content, "Here is the plan");
        assert_eq!(domain.tool_calls.len(), 1);
        assert_eq!(domain.stop_reason, StopReason::ToolUse);
        assert_eq!(domain.usage.unwrap().input_tokens, 100);
    }
}
