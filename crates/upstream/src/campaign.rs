//! Adapter for the campaign / voice-AI management API.
//!
//! All payloads are returned as raw JSON: the API renames fields between
//! endpoints, so mapping happens in `callsync-core` through synonym chains.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::error::{error_from_response, json_body, GatewayError};

/// Collection endpoint for campaigns.
const CAMPAIGNS_PATH: &str = "/bulk-calls";

/// Global call-log feed.
const CALL_LOGS_PATH: &str = "/call-logs";

/// HTTP method of a write request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitMethod {
    Post,
    Put,
    Delete,
}

impl SubmitMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
        }
    }

    fn as_reqwest(self) -> reqwest::Method {
        match self {
            Self::Post => reqwest::Method::POST,
            Self::Put => reqwest::Method::PUT,
            Self::Delete => reqwest::Method::DELETE,
        }
    }
}

/// Campaign platform access.
///
/// Implementors provide the two transport primitives; the typed endpoint
/// helpers are built on top of them.
#[async_trait]
pub trait CampaignGateway: Send + Sync {
    /// `GET path?params`, parsed as JSON.
    async fn fetch(&self, path: &str, params: &[(&str, String)]) -> Result<Value, GatewayError>;

    /// Write request with an optional JSON body.
    async fn submit(
        &self,
        path: &str,
        payload: Option<&Value>,
        method: SubmitMethod,
    ) -> Result<Value, GatewayError>;

    /// One page of the campaign list. Pages are 1-based.
    async fn list_campaigns(
        &self,
        page: u32,
        page_size: u32,
        status: Option<&str>,
    ) -> Result<Value, GatewayError> {
        let mut params = vec![("pageno", page.to_string()), ("pagesize", page_size.to_string())];
        if let Some(status) = status {
            params.push(("status", status.to_string()));
        }
        self.fetch(CAMPAIGNS_PATH, &params).await
    }

    /// Campaign detail: `{details, contact_list[]}`.
    async fn campaign_details(&self, external_id: &str) -> Result<Value, GatewayError> {
        self.fetch(&campaign_path(external_id), &[]).await
    }

    /// One page of the global call-log feed. Pages are 1-based.
    async fn call_logs(&self, page: u32, page_size: u32) -> Result<Value, GatewayError> {
        self.fetch(
            CALL_LOGS_PATH,
            &[("pageno", page.to_string()), ("pagesize", page_size.to_string())],
        )
        .await
    }

    async fn create_campaign(&self, payload: &Value) -> Result<Value, GatewayError> {
        self.submit(CAMPAIGNS_PATH, Some(payload), SubmitMethod::Post)
            .await
    }

    /// `PUT` a lifecycle action (`pause`, `resume`, `reschedule`).
    async fn campaign_action(
        &self,
        external_id: &str,
        action: &str,
        extra: Option<&Value>,
    ) -> Result<Value, GatewayError> {
        let mut body = json!({ "action": action });
        if let (Some(Value::Object(extra)), Value::Object(fields)) = (extra, &mut body) {
            for (key, value) in extra {
                fields.insert(key.clone(), value.clone());
            }
        }
        self.submit(&campaign_path(external_id), Some(&body), SubmitMethod::Put)
            .await
    }

    async fn cancel_campaign(&self, external_id: &str) -> Result<Value, GatewayError> {
        self.submit(&campaign_path(external_id), None, SubmitMethod::Delete)
            .await
    }
}

fn campaign_path(external_id: &str) -> String {
    format!("{CAMPAIGNS_PATH}/{}", external_id.trim())
}

/// HTTP client for the campaign platform.
pub struct CampaignApi {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
}

impl CampaignApi {
    /// Create a client with a per-request timeout.
    ///
    /// * `api_url` - Base URL, e.g. `https://api.example.com/v1`.
    pub fn new(api_url: String, api_key: String, timeout: Duration) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GatewayError::Network(format!("failed to build HTTP client: {e}")))?;
        Ok(Self::with_client(client, api_url, api_key))
    }

    /// Reuse an existing [`reqwest::Client`] (connection pooling).
    pub fn with_client(client: reqwest::Client, api_url: String, api_key: String) -> Self {
        Self {
            client,
            api_url: api_url.trim_end_matches('/').to_string(),
            api_key,
        }
    }

    async fn send(
        &self,
        request: reqwest::RequestBuilder,
        method: &str,
        path: &str,
    ) -> Result<Value, GatewayError> {
        let started = Instant::now();
        tracing::debug!(method, path, "Campaign API request");

        let response = match request.bearer_auth(&self.api_key).send().await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(method, path, error = %e, "Campaign API request failed");
                return Err(e.into());
            }
        };

        let status = response.status();
        let elapsed_ms = started.elapsed().as_millis() as u64;
        if !status.is_success() {
            let err = error_from_response(response).await;
            tracing::warn!(method, path, status = status.as_u16(), elapsed_ms, error = %err, "Campaign API error");
            return Err(err);
        }

        tracing::debug!(method, path, status = status.as_u16(), elapsed_ms, "Campaign API response");
        json_body(response).await
    }
}

#[async_trait]
impl CampaignGateway for CampaignApi {
    async fn fetch(&self, path: &str, params: &[(&str, String)]) -> Result<Value, GatewayError> {
        let request = self
            .client
            .get(format!("{}{path}", self.api_url))
            .query(params);
        self.send(request, "GET", path).await
    }

    async fn submit(
        &self,
        path: &str,
        payload: Option<&Value>,
        method: SubmitMethod,
    ) -> Result<Value, GatewayError> {
        let mut request = self
            .client
            .request(method.as_reqwest(), format!("{}{path}", self.api_url));
        if let Some(payload) = payload {
            request = request.json(payload);
        }
        self.send(request, method.as_str(), path).await
    }
}
