//! Deterministic mock `LlmProvider` for tests and local development without
//! an Anthropic API key.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::domain::ports::{CompletionRequest, CompletionResponse, HealthStatus, LlmProvider, LlmProviderError, StopReason};

#[derive(Debug, Clone)]
pub struct MockResponse {
    pub content: String,
    pub tool_calls: Vec<crate::domain::ports::RequestedToolCall>,
    pub stop_reason: StopReason,
}

impl MockResponse {
    pub fn text(content: impl Into<String>) -> Self {
        Self { content: content.into(), tool_calls: Vec::new(), stop_reason: StopReason::EndTurn }
    }

    pub fn tool_call(name: impl Into<String>, arguments: serde_json::Value) -> Self {
        Self {
            content: String::new(),
            tool_calls: vec![crate::domain::ports::RequestedToolCall {
                id: uuid::Uuid::new_v4().to_string(),
                tool_name: name.into(),
                arguments,
            }],
            stop_reason: StopReason::ToolUse,
        }
    }
}

/// Plays back a scripted sequence of responses, one per call to `complete`.
/// Once exhausted, repeats the last response so tests that call it more
/// times than scripted don't panic unexpectedly — callers that need strict
/// call-count assertions should check `call_count()` themselves.
pub struct MockLlmProvider {
    script: Mutex<Vec<MockResponse>>,
    call_count: AtomicUsize,
    health: HealthStatus,
}

impl MockLlmProvider {
    pub fn new(script: Vec<MockResponse>) -> Self {
        Self { script: Mutex::new(script), call_count: AtomicUsize::new(0), health: HealthStatus::Healthy }
    }

    pub fn unavailable() -> Self {
        Self { script: Mutex::new(Vec::new()), call_count: AtomicUsize::new(0), health: HealthStatus::Unavailable }
    }

    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LlmProvider for MockLlmProvider {
    fn provider_id(&self) -> &str {
        "mock"
    }

    async fn complete(&self, _request: CompletionRequest) -> Result<CompletionResponse, LlmProviderError> {
        if self.health == HealthStatus::Unavailable {
            return Err(LlmProviderError::Unavailable("mock provider configured unavailable".to_string()));
        }

        let index = self.call_count.fetch_add(1, Ordering::SeqCst);
        let script = self.script.lock().unwrap();
        let response = script
            .get(index)
            .or_else(|| script.last())
            .cloned()
            .ok_or_else(|| LlmProviderError::ExecutionFailed("mock provider script is empty".to_string()))?;

        Ok(CompletionResponse {
            content: response.content,
            tool_calls: response.tool_calls,
            stop_reason: response.stop_reason,
            usage: Some(crate::domain::ports::TokenUsage { input_tokens: 10, output_tokens: 10 }),
        })
    }

    async fn health_check(&self) -> Result<HealthStatus, LlmProviderError> {
        Ok(self.health)
    }
}
