//! LLM provider port.
//!
//! Abstracts the Meta-Engine's (C3) classification calls and the Planner
//! Loop's (C4) plan-synthesis calls over whichever LLM backend is
//! configured. Adapted from the substrate abstraction this crate's
//! predecessor used for agent execution, narrowed to the two call shapes
//! this orchestrator actually needs: free-form completion with optional
//! tool calling.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::domain::models::ToolDescriptor;

/// One request to the LLM provider: a system prompt, a conversation so far,
/// and the tools the model may call (empty for pure classification calls).
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub system_prompt: String,
    pub messages: Vec<ChatMessage>,
    pub tools: Vec<ToolDescriptor>,
    pub parameters: CompletionParameters,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatRole {
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
    /// Tool calls the assistant made in this turn, if any — carried so the
    /// planner loop's replay log (SPEC_FULL.md §3.5) can reconstruct the
    /// full conversation including tool-call/tool-result pairs.
    #[serde(default)]
    pub tool_calls: Vec<RequestedToolCall>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestedToolCall {
    pub id: String,
    pub tool_name: String,
    pub arguments: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionParameters {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

impl Default for CompletionParameters {
    fn default() -> Self {
        Self {
            max_tokens: Some(4096),
            temperature: Some(0.2),
            timeout_secs: Some(60),
            extra: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    EndTurn,
    ToolUse,
    MaxTokens,
    Timeout,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

#[derive(Debug, Clone)]
pub struct CompletionResponse {
    pub content: String,
    pub tool_calls: Vec<RequestedToolCall>,
    pub stop_reason: StopReason,
    pub usage: Option<TokenUsage>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unavailable,
}

#[derive(Debug, thiserror::Error)]
pub enum LlmProviderError {
    #[error("provider not configured: {0}")]
    NotConfigured(String),
    #[error("provider unavailable: {0}")]
    Unavailable(String),
    #[error("rate limit exceeded: {0}")]
    RateLimitExceeded(String),
    #[error("execution timeout after {0}s")]
    Timeout(u64),
    #[error("execution failed: {0}")]
    ExecutionFailed(String),
    #[error("network error: {0}")]
    NetworkError(String),
}

/// Port trait for LLM provider implementations (spec §4.3/§4.4's "LLM
/// call" dependency). Implementations must be `Send + Sync` for concurrent
/// use across tokio tasks.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    fn provider_id(&self) -> &str;

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmProviderError>;

    async fn health_check(&self) -> Result<HealthStatus, LlmProviderError>;
}
