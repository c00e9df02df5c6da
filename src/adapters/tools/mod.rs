//! Concrete `ToolHandler` implementations, one per remediation backend, plus
//! the read-only `query_assets` tool the Planner Loop (C4) uses to discover
//! targets before committing to a Plan.

mod asset_inventory;
mod cloud;

pub use asset_inventory::{AssetInventory, AssetRecord, InMemoryAssetInventory, QueryAssetsHandler};
pub use cloud::{
    AzureUpdateManagementHandler, GcpOsConfigHandler, K8sRolloutHandler, ManualStepHandler,
    SsmPatchHandler, VsphereUpdateHandler,
};

use crate::domain::models::{SafetyClass, ToolDescriptor};

/// Builds the descriptor half of the stock tool catalog (spec §4.1). Callers
/// pair each descriptor with the matching handler from this module when
/// registering against the Tool Registry (C1).
pub fn builtin_tool_descriptors() -> Vec<ToolDescriptor> {
    vec![
        ToolDescriptor::new(
            "query_assets",
            "Query the fleet inventory by platform, region, environment, and tag filters.",
            serde_json::json!({
                "type": "object",
                "properties": {
                    "platforms": {"type": "array", "items": {"type": "string"}},
                    "regions": {"type": "array", "items": {"type": "string"}},
                    "environments": {"type": "array", "items": {"type": "string"}},
                    "tags": {"type": "object"},
                    "exclusions": {"type": "array", "items": {"type": "string"}}
                }
            }),
            SafetyClass::ReadOnly,
        )
        .with_max_duration_secs(30)
        .with_rate_limit_per_minute(120),
        ToolDescriptor::new(
            "ssm_patch",
            "Apply a patch baseline to AWS EC2 instances via Systems Manager.",
            serde_json::json!({
                "type": "object",
                "required": ["asset_ids", "baseline_id"],
                "properties": {
                    "asset_ids": {"type": "array", "items": {"type": "string"}},
                    "baseline_id": {"type": "string"}
                }
            }),
            SafetyClass::Mutating,
        )
        .with_max_duration_secs(900),
        ToolDescriptor::new(
            "azure_update_management",
            "Apply an update deployment to Azure VMs via Update Management.",
            serde_json::json!({
                "type": "object",
                "required": ["asset_ids", "update_deployment_id"],
                "properties": {
                    "asset_ids": {"type": "array", "items": {"type": "string"}},
                    "update_deployment_id": {"type": "string"}
                }
            }),
            SafetyClass::Mutating,
        )
        .with_max_duration_secs(900),
        ToolDescriptor::new(
            "gcp_os_config",
            "Apply an OS Config patch job to GCP Compute Engine instances.",
            serde_json::json!({
                "type": "object",
                "required": ["asset_ids", "patch_job_id"],
                "properties": {
                    "asset_ids": {"type": "array", "items": {"type": "string"}},
                    "patch_job_id": {"type": "string"}
                }
            }),
            SafetyClass::Mutating,
        )
        .with_max_duration_secs(900),
        ToolDescriptor::new(
            "k8s_rollout",
            "Trigger a rolling update of a Kubernetes workload to a target image.",
            serde_json::json!({
                "type": "object",
                "required": ["asset_ids", "image"],
                "properties": {
                    "asset_ids": {"type": "array", "items": {"type": "string"}},
                    "image": {"type": "string"}
                }
            }),
            SafetyClass::Mutating,
        )
        .with_max_duration_secs(600),
        ToolDescriptor::new(
            "vsphere_update",
            "Remediate drift on vSphere VMs via a configuration baseline.",
            serde_json::json!({
                "type": "object",
                "required": ["asset_ids", "baseline_id"],
                "properties": {
                    "asset_ids": {"type": "array", "items": {"type": "string"}},
                    "baseline_id": {"type": "string"}
                }
            }),
            SafetyClass::Destructive,
        )
        .with_max_duration_secs(1200),
        ToolDescriptor::new(
            "manual_step",
            "Record that a remediation step requires a human operator to act out of band.",
            serde_json::json!({
                "type": "object",
                "required": ["asset_ids", "instructions"],
                "properties": {
                    "asset_ids": {"type": "array", "items": {"type": "string"}},
                    "instructions": {"type": "string"}
                }
            }),
            SafetyClass::Destructive,
        )
        .with_max_duration_secs(3600)
        .with_rate_limit_per_minute(10),
    ]
}
