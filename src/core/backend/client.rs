//! HTTP client for the VoiceCare backend.

use reqwest::Client;
use serde_json::Value;
use tracing::{debug, info};

use super::types::{
    FunctionCallRequest, FunctionCallResponse, SessionGrant, SessionRequest, ToolCatalog,
};
use crate::config::ClientConfig;
use crate::errors::{SessionError, SessionResult, ToolExecutionError};

/// Client for the backend's `/tools`, `/session` and `/function-call` endpoints.
#[derive(Debug, Clone)]
pub struct BackendClient {
    http: Client,
    base_url: String,
}

impl BackendClient {
    /// Create a client for the given base URL.
    pub fn new(base_url: impl Into<String>) -> SessionResult<Self> {
        let http = Client::builder()
            .build()
            .map_err(|e| SessionError::InvalidConfiguration(e.to_string()))?;
        Ok(Self::with_http_client(http, base_url))
    }

    /// Create a client reusing an existing HTTP client.
    pub fn with_http_client(http: Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { http, base_url }
    }

    pub fn from_config(config: &ClientConfig) -> SessionResult<Self> {
        Self::new(config.backend_base_url.clone())
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Underlying HTTP client, shared with the signaling exchange.
    pub fn http(&self) -> &Client {
        &self.http
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// `GET /tools`
    pub async fn fetch_tools(&self) -> SessionResult<ToolCatalog> {
        let response = self
            .http
            .get(self.endpoint("tools"))
            .send()
            .await
            .map_err(|e| SessionError::Start(format!("Unable to retrieve tool definitions: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SessionError::Start(format!(
                "Unable to retrieve tool definitions ({})",
                status.as_u16()
            )));
        }

        let catalog: ToolCatalog = response
            .json()
            .await
            .map_err(|e| SessionError::Start(format!("Invalid tool catalog: {e}")))?;

        info!("Loaded {} tool definition(s)", catalog.tools.len());
        debug!("Tools loaded: {}", catalog.tool_names().join(", "));
        Ok(catalog)
    }

    /// `POST /session`
    pub async fn create_session(&self, request: &SessionRequest) -> SessionResult<SessionGrant> {
        let response = self
            .http
            .post(self.endpoint("session"))
            .json(request)
            .send()
            .await
            .map_err(|e| SessionError::Start(format!("Session request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let details = response.text().await.unwrap_or_default();
            return Err(SessionError::Start(format!(
                "Session request failed: {details}"
            )));
        }

        let grant: SessionGrant = response
            .json()
            .await
            .map_err(|e| SessionError::Start(format!("Invalid session response: {e}")))?;

        info!(
            "Created session {} (customer: {})",
            grant.session_id,
            grant.customer_name.as_deref().unwrap_or("anonymous")
        );
        Ok(grant)
    }

    /// `POST /function-call`, returning the call's `output`.
    pub async fn execute_function(
        &self,
        request: &FunctionCallRequest,
    ) -> Result<Value, ToolExecutionError> {
        debug!("Executing {} (call {})", request.name, request.call_id);

        let response = self
            .http
            .post(self.endpoint("function-call"))
            .json(request)
            .send()
            .await
            .map_err(|e| ToolExecutionError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(ToolExecutionError::Http {
                status: status.as_u16(),
                detail,
            });
        }

        let body: FunctionCallResponse = response
            .json()
            .await
            .map_err(|e| ToolExecutionError::InvalidResponse(e.to_string()))?;
        Ok(body.output)
    }
}
