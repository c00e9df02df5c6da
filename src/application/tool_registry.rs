//! Tool Registry (C1): the catalog of callable tools, their JSON Schema
//! contracts, safety classes, and handlers.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};

use uuid::Uuid;

use crate::domain::errors::OrchestratorError;
use crate::domain::models::{SafetyClass, ToolDescriptor, ToolInvocation};
use crate::domain::ports::{ToolContext, ToolHandler, ToolHandlerError, ToolInvocationRepository};
use crate::infrastructure::resilience::TokenBucketRateLimiter;

#[derive(Debug, thiserror::Error)]
pub enum ToolRegistryError {
    #[error("tool already registered: {0}")]
    AlreadyRegistered(String),
    #[error("tool not registered: {0}")]
    Unknown(String),
}

#[derive(Debug, Clone, Default)]
pub struct ToolListFilter {
    pub safety_class: Option<SafetyClass>,
    pub names: Option<Vec<String>>,
}

struct RegisteredTool {
    descriptor: ToolDescriptor,
    handler: Arc<dyn ToolHandler>,
}

/// Holds the stock tool catalog plus any custom tools registered at boot.
/// Rate limiting is per-org per-tool: a fresh token bucket is created the
/// first time an org calls a given tool, sized off the tool's own
/// `rate_limit_per_minute`.
pub struct ToolRegistry {
    tools: RwLock<HashMap<String, RegisteredTool>>,
    rate_limiters: Mutex<HashMap<(String, String), Arc<TokenBucketRateLimiter>>>,
    invocations: Arc<dyn ToolInvocationRepository>,
}

impl ToolRegistry {
    pub fn new(invocations: Arc<dyn ToolInvocationRepository>) -> Self {
        Self {
            tools: RwLock::new(HashMap::new()),
            rate_limiters: Mutex::new(HashMap::new()),
            invocations,
        }
    }

    pub fn register(&self, descriptor: ToolDescriptor, handler: Arc<dyn ToolHandler>) -> Result<(), ToolRegistryError> {
        let mut tools = self.tools.write().unwrap();
        if tools.contains_key(&descriptor.name) {
            return Err(ToolRegistryError::AlreadyRegistered(descriptor.name));
        }
        tools.insert(descriptor.name.clone(), RegisteredTool { descriptor, handler });
        Ok(())
    }

    pub fn list(&self, filter: ToolListFilter) -> Vec<ToolDescriptor> {
        self.tools
            .read()
            .unwrap()
            .values()
            .map(|t| t.descriptor.clone())
            .filter(|d| filter.safety_class.is_none_or(|sc| d.safety_class == sc))
            .filter(|d| filter.names.as_ref().is_none_or(|names| names.contains(&d.name)))
            .collect()
    }

    fn rate_limiter_for(&self, org_id: &str, descriptor: &ToolDescriptor) -> Arc<TokenBucketRateLimiter> {
        let mut limiters = self.rate_limiters.lock().unwrap();
        limiters
            .entry((org_id.to_string(), descriptor.name.clone()))
            .or_insert_with(|| Arc::new(TokenBucketRateLimiter::new(f64::from(descriptor.rate_limit_per_minute))))
            .clone()
    }

    /// Validate arguments, enforce the rate limit and timeout, invoke the
    /// handler, and record a `ToolInvocation` regardless of outcome.
    pub async fn invoke(
        &self,
        name: &str,
        arguments: serde_json::Value,
        ctx: ToolContext,
        execution_id: Option<Uuid>,
        agent_name: &str,
    ) -> Result<serde_json::Value, OrchestratorError> {
        let (descriptor, handler) = {
            let tools = self.tools.read().unwrap();
            let tool = tools
                .get(name)
                .ok_or_else(|| OrchestratorError::ToolFailed { tool: name.to_string(), message: "tool not registered".to_string() })?;
            (tool.descriptor.clone(), Arc::clone(&tool.handler))
        };

        let mut invocation = ToolInvocation::new(ctx.org_id.clone(), ctx.task_id, agent_name, name, arguments.clone());
        if let Some(execution_id) = execution_id {
            invocation = invocation.with_execution_id(execution_id);
        }

        // Destructive tools never run under dry_run (spec §4.1), enforced
        // once here rather than trusted to each handler.
        if descriptor.safety_class == SafetyClass::Destructive && ctx.dry_run {
            let invocation = invocation.complete_err(ToolHandlerError::DryRunRefused.to_string(), 0);
            self.invocations.record(&invocation).await?;
            return Err(OrchestratorError::ToolFailed {
                tool: name.to_string(),
                message: ToolHandlerError::DryRunRefused.to_string(),
            });
        }

        let validator = jsonschema::validator_for(&descriptor.input_schema)
            .map_err(|e| OrchestratorError::Internal(format!("invalid schema for tool {name}: {e}")))?;
        if !validator.is_valid(&arguments) {
            let invocation = invocation.complete_err("arguments failed schema validation", 0);
            self.invocations.record(&invocation).await?;
            return Err(OrchestratorError::ToolFailed {
                tool: name.to_string(),
                message: "arguments failed schema validation".to_string(),
            });
        }

        self.rate_limiter_for(&ctx.org_id, &descriptor).acquire().await;

        let started = Instant::now();
        let outcome = tokio::time::timeout(
            Duration::from_secs(descriptor.max_duration_secs),
            handler.invoke(arguments, &ctx),
        )
        .await;

        let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        let (result, invocation) = match outcome {
            Ok(Ok(value)) => {
                let invocation = invocation.complete_ok(value.clone(), duration_ms);
                (Ok(value), invocation)
            }
            Ok(Err(err)) => {
                let invocation = invocation.complete_err(err.to_string(), duration_ms);
                (
                    Err(OrchestratorError::ToolFailed { tool: name.to_string(), message: err.to_string() }),
                    invocation,
                )
            }
            Err(_) => {
                let invocation = invocation.complete_err("timeout", duration_ms);
                (
                    Err(OrchestratorError::ToolFailed { tool: name.to_string(), message: "timeout".to_string() }),
                    invocation,
                )
            }
        };

        self.invocations.record(&invocation).await?;

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::{create_migrated_test_pool, SqliteToolInvocationRepository};
    use crate::domain::ports::ToolHandlerError;
    use async_trait::async_trait;

    struct EchoHandler;

    #[async_trait]
    impl ToolHandler for EchoHandler {
        async fn invoke(&self, arguments: serde_json::Value, _ctx: &ToolContext) -> Result<serde_json::Value, ToolHandlerError> {
            Ok(arguments)
        }
    }

    async fn registry() -> ToolRegistry {
        let pool = create_migrated_test_pool().await.unwrap();
        ToolRegistry::new(Arc::new(SqliteToolInvocationRepository::new(pool)))
    }

    fn ctx() -> ToolContext {
        ToolContext { org_id: "org-1".to_string(), task_id: Uuid::new_v4(), dry_run: false, step_id: "s1".to_string() }
    }

    #[tokio::test]
    async fn invoke_records_success() {
        let registry = registry().await;
        registry
            .register(
                ToolDescriptor::new("echo", "echoes input", serde_json::json!({"type": "object"}), SafetyClass::ReadOnly),
                Arc::new(EchoHandler),
            )
            .unwrap();

        let result = registry.invoke("echo", serde_json::json!({"a": 1}), ctx(), None, "tester").await.unwrap();
        assert_eq!(result, serde_json::json!({"a": 1}));
    }

    #[tokio::test]
    async fn invoke_rejects_schema_mismatch() {
        let registry = registry().await;
        registry
            .register(
                ToolDescriptor::new(
                    "strict",
                    "requires foo",
                    serde_json::json!({"type": "object", "required": ["foo"]}),
                    SafetyClass::ReadOnly,
                ),
                Arc::new(EchoHandler),
            )
            .unwrap();

        let err = registry.invoke("strict", serde_json::json!({}), ctx(), None, "tester").await.unwrap_err();
        assert!(matches!(err, OrchestratorError::ToolFailed { .. }));
    }

    #[tokio::test]
    async fn double_registration_fails() {
        let registry = registry().await;
        let descriptor = ToolDescriptor::new("dup", "d", serde_json::json!({"type": "object"}), SafetyClass::ReadOnly);
        registry.register(descriptor.clone(), Arc::new(EchoHandler)).unwrap();
        assert!(registry.register(descriptor, Arc::new(EchoHandler)).is_err());
    }

    #[tokio::test]
    async fn invoke_refuses_destructive_tool_under_dry_run() {
        let registry = registry().await;
        registry
            .register(
                ToolDescriptor::new("wipe", "destroys things", serde_json::json!({"type": "object"}), SafetyClass::Destructive),
                Arc::new(EchoHandler),
            )
            .unwrap();

        let dry_run_ctx = ToolContext { org_id: "org-1".to_string(), task_id: Uuid::new_v4(), dry_run: true, step_id: "s1".to_string() };
        let err = registry.invoke("wipe", serde_json::json!({}), dry_run_ctx, None, "tester").await.unwrap_err();
        assert!(matches!(err, OrchestratorError::ToolFailed { .. }));
    }

    #[tokio::test]
    async fn list_filters_by_safety_class() {
        let registry = registry().await;
        registry
            .register(
                ToolDescriptor::new("ro", "d", serde_json::json!({"type": "object"}), SafetyClass::ReadOnly),
                Arc::new(EchoHandler),
            )
            .unwrap();
        registry
            .register(
                ToolDescriptor::new("destr", "d", serde_json::json!({"type": "object"}), SafetyClass::Destructive),
                Arc::new(EchoHandler),
            )
            .unwrap();

        let readonly = registry.list(ToolListFilter { safety_class: Some(SafetyClass::ReadOnly), names: None });
        assert_eq!(readonly.len(), 1);
        assert_eq!(readonly[0].name, "ro");
    }
}
