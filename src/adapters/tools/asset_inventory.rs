//! `query_assets` — the one read-only tool every agent is allowed to call
//! during planning without tripping HITL (spec §4.1).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;

use crate::domain::ports::{ToolContext, ToolHandler, ToolHandlerError};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AssetRecord {
    pub id: String,
    pub platform: String,
    pub region: String,
    pub environment: String,
    #[serde(default)]
    pub tags: HashMap<String, String>,
}

#[derive(Debug, Deserialize, Default)]
struct QueryAssetsArgs {
    #[serde(default)]
    platforms: Vec<String>,
    #[serde(default)]
    regions: Vec<String>,
    #[serde(default)]
    environments: Vec<String>,
    #[serde(default)]
    tags: HashMap<String, String>,
    #[serde(default)]
    exclusions: Vec<String>,
}

/// Source of truth for fleet membership, queried by `query_assets` and by
/// the Executor (C7) when it resolves a Phase's selector to concrete asset
/// IDs. Separate from the tool handler so other components can share it
/// without going through the tool-invocation path.
pub trait AssetInventory: Send + Sync {
    fn query(
        &self,
        platforms: &[String],
        regions: &[String],
        environments: &[String],
        tags: &HashMap<String, String>,
        exclusions: &[String],
    ) -> Vec<AssetRecord>;
}

/// Fixture-backed inventory. Fleet assets are pushed in via `seed` (tests,
/// or a boot-time sync from an external CMDB not modeled here); there is no
/// live backend behind this orchestrator's own asset catalog, since assets
/// themselves live in each cloud provider, not in this system.
#[derive(Default)]
pub struct InMemoryAssetInventory {
    assets: RwLock<Vec<AssetRecord>>,
}

impl InMemoryAssetInventory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed(&self, assets: Vec<AssetRecord>) {
        *self.assets.write().unwrap() = assets;
    }
}

impl AssetInventory for InMemoryAssetInventory {
    fn query(
        &self,
        platforms: &[String],
        regions: &[String],
        environments: &[String],
        tags: &HashMap<String, String>,
        exclusions: &[String],
    ) -> Vec<AssetRecord> {
        self.assets
            .read()
            .unwrap()
            .iter()
            .filter(|a| platforms.is_empty() || platforms.contains(&a.platform))
            .filter(|a| regions.is_empty() || regions.contains(&a.region))
            .filter(|a| environments.is_empty() || environments.contains(&a.environment))
            .filter(|a| tags.iter().all(|(k, v)| a.tags.get(k) == Some(v)))
            .filter(|a| !exclusions.contains(&a.id))
            .cloned()
            .collect()
    }
}

pub struct QueryAssetsHandler {
    inventory: std::sync::Arc<dyn AssetInventory>,
}

impl QueryAssetsHandler {
    pub fn new(inventory: std::sync::Arc<dyn AssetInventory>) -> Self {
        Self { inventory }
    }
}

#[async_trait]
impl ToolHandler for QueryAssetsHandler {
    async fn invoke(&self, arguments: serde_json::Value, _ctx: &ToolContext) -> Result<serde_json::Value, ToolHandlerError> {
        let args: QueryAssetsArgs =
            serde_json::from_value(arguments).map_err(|e| ToolHandlerError::InvalidArguments(e.to_string()))?;

        let assets = self.inventory.query(
            &args.platforms,
            &args.regions,
            &args.environments,
            &args.tags,
            &args.exclusions,
        );

        Ok(serde_json::json!({ "assets": assets, "count": assets.len() }))
    }
}
