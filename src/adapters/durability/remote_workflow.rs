//! Facade over an external durable-workflow engine, reached over HTTP. Kept
//! generic over the specific engine (Temporal, Cadence, a bespoke service)
//! since SPEC_FULL.md names only the shape of the integration, not a
//! vendor; operators point `remote_endpoint` at whichever engine they run.

use async_trait::async_trait;
use reqwest::Client as ReqwestClient;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use uuid::Uuid;

use crate::domain::ports::{DurabilityAdapter, DurabilityError, WorkflowHandle, WorkflowStatus};
use crate::infrastructure::resilience::{RetryPolicy, Transient};

pub struct RemoteWorkflowConfig {
    pub endpoint: String,
    pub retry_policy: RetryPolicy,
}

pub struct RemoteWorkflowAdapter {
    http_client: ReqwestClient,
    endpoint: String,
    retry_policy: RetryPolicy,
}

impl RemoteWorkflowAdapter {
    pub fn new(config: RemoteWorkflowConfig) -> Result<Self, DurabilityError> {
        let http_client = ReqwestClient::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| DurabilityError::Unavailable(e.to_string()))?;

        Ok(Self { http_client, endpoint: config.endpoint, retry_policy: config.retry_policy })
    }
}

#[derive(Debug, thiserror::Error, Clone)]
enum RemoteError {
    #[error("network error: {0}")]
    Network(String),
    #[error("server error: {0}")]
    Server(String),
    #[error("not found")]
    NotFound,
}

impl Transient for RemoteError {
    fn is_transient(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Server(_))
    }
}

#[derive(Serialize)]
struct StartRequest {
    execution_id: Uuid,
}

#[derive(Deserialize)]
struct StartResponse {
    workflow_id: Uuid,
}

#[async_trait]
impl DurabilityAdapter for RemoteWorkflowAdapter {
    async fn start(&self, execution_id: Uuid) -> Result<WorkflowHandle, DurabilityError> {
        let result = self
            .retry_policy
            .execute(|| async {
                let response = self
                    .http_client
                    .post(format!("{}/workflows", self.endpoint))
                    .json(&StartRequest { execution_id })
                    .send()
                    .await
                    .map_err(|e| RemoteError::Network(e.to_string()))?;

                if !response.status().is_success() {
                    return Err(RemoteError::Server(response.status().to_string()));
                }

                response.json::<StartResponse>().await.map_err(|e| RemoteError::Network(e.to_string()))
            })
            .await
            .map_err(|e| DurabilityError::Unavailable(e.to_string()))?;

        Ok(WorkflowHandle(result.workflow_id))
    }

    async fn checkpoint(&self, handle: WorkflowHandle) -> Result<(), DurabilityError> {
        self.retry_policy
            .execute(|| async {
                let response = self
                    .http_client
                    .post(format!("{}/workflows/{}/checkpoint", self.endpoint, handle.0))
                    .send()
                    .await
                    .map_err(|e| RemoteError::Network(e.to_string()))?;

                match response.status().as_u16() {
                    200..=299 => Ok(()),
                    404 => Err(RemoteError::NotFound),
                    _ => Err(RemoteError::Server(response.status().to_string())),
                }
            })
            .await
            .map_err(|e| match e {
                RemoteError::NotFound => DurabilityError::NotFound(handle.0),
                other => DurabilityError::Unavailable(other.to_string()),
            })
    }

    async fn signal(&self, handle: WorkflowHandle, name: &str, payload: Value) -> Result<(), DurabilityError> {
        #[derive(Serialize)]
        struct SignalRequest<'a> {
            name: &'a str,
            payload: Value,
        }

        self.retry_policy
            .execute(|| async {
                let response = self
                    .http_client
                    .post(format!("{}/workflows/{}/signal", self.endpoint, handle.0))
                    .json(&SignalRequest { name, payload: payload.clone() })
                    .send()
                    .await
                    .map_err(|e| RemoteError::Network(e.to_string()))?;

                match response.status().as_u16() {
                    200..=299 => Ok(()),
                    404 => Err(RemoteError::NotFound),
                    _ => Err(RemoteError::Server(response.status().to_string())),
                }
            })
            .await
            .map_err(|e| match e {
                RemoteError::NotFound => DurabilityError::NotFound(handle.0),
                other => DurabilityError::Unavailable(other.to_string()),
            })
    }

    async fn cancel(&self, handle: WorkflowHandle) -> Result<(), DurabilityError> {
        self.retry_policy
            .execute(|| async {
                let response = self
                    .http_client
                    .delete(format!("{}/workflows/{}", self.endpoint, handle.0))
                    .send()
                    .await
                    .map_err(|e| RemoteError::Network(e.to_string()))?;

                match response.status().as_u16() {
                    200..=299 | 404 => Ok(()),
                    _ => Err(RemoteError::Server(response.status().to_string())),
                }
            })
            .await
            .map_err(|e| DurabilityError::Unavailable(e.to_string()))
    }

    async fn describe(&self, handle: WorkflowHandle) -> Result<WorkflowStatus, DurabilityError> {
        #[derive(Deserialize)]
        struct DescribeResponse {
            status: String,
        }

        let result = self
            .retry_policy
            .execute(|| async {
                let response = self
                    .http_client
                    .get(format!("{}/workflows/{}", self.endpoint, handle.0))
                    .send()
                    .await
                    .map_err(|e| RemoteError::Network(e.to_string()))?;

                match response.status().as_u16() {
                    200..=299 => response.json::<DescribeResponse>().await.map_err(|e| RemoteError::Network(e.to_string())),
                    404 => Err(RemoteError::NotFound),
                    _ => Err(RemoteError::Server(response.status().to_string())),
                }
            })
            .await
            .map_err(|e| match e {
                RemoteError::NotFound => DurabilityError::NotFound(handle.0),
                other => DurabilityError::Unavailable(other.to_string()),
            })?;

        Ok(match result.status.as_str() {
            "running" => WorkflowStatus::Running,
            "paused" => WorkflowStatus::Paused,
            "completed" => WorkflowStatus::Completed,
            "failed" => WorkflowStatus::Failed,
            _ => WorkflowStatus::Unknown,
        })
    }

    async fn recover_in_flight(&self) -> Result<Vec<Uuid>, DurabilityError> {
        #[derive(Deserialize)]
        struct InFlightResponse {
            execution_ids: Vec<Uuid>,
        }

        let result = self
            .retry_policy
            .execute(|| async {
                let response = self
                    .http_client
                    .get(format!("{}/workflows/in-flight", self.endpoint))
                    .send()
                    .await
                    .map_err(|e| RemoteError::Network(e.to_string()))?;

                if !response.status().is_success() {
                    return Err(RemoteError::Server(response.status().to_string()));
                }

                response.json::<InFlightResponse>().await.map_err(|e| RemoteError::Network(e.to_string()))
            })
            .await
            .map_err(|e| DurabilityError::Unavailable(e.to_string()))?;

        Ok(result.execution_ids)
    }
}
