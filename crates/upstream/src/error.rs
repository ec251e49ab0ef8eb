//! Typed failures of upstream requests.

use std::time::Duration;

/// Errors from either gateway adapter.
#[derive(Debug, Clone, thiserror::Error)]
pub enum GatewayError {
    /// The resource does not exist upstream (HTTP 404).
    #[error("Upstream resource not found")]
    NotFound,

    /// HTTP 429. `retry_after` is taken from the `Retry-After` header when present.
    #[error("Upstream rate limit exceeded")]
    RateLimited { retry_after: Option<Duration> },

    /// HTTP 5xx.
    #[error("Upstream server error ({status}): {body}")]
    ServerError { status: u16, body: String },

    /// HTTP 401/403.
    #[error("Upstream rejected credentials ({status})")]
    AuthError { status: u16 },

    /// Any other non-2xx status.
    #[error("Upstream rejected request ({status}): {body}")]
    Rejected { status: u16, body: String },

    /// Timeout, DNS, TLS or connection failure.
    #[error("Upstream unreachable: {0}")]
    Network(String),

    /// A 2xx response whose body could not be parsed.
    #[error("Upstream response not decodable: {0}")]
    Decode(String),
}

impl GatewayError {
    /// Classify a non-success status code.
    pub fn from_status(status: u16, body: String, retry_after: Option<Duration>) -> Self {
        match status {
            404 => Self::NotFound,
            429 => Self::RateLimited { retry_after },
            401 | 403 => Self::AuthError { status },
            500..=599 => Self::ServerError { status, body },
            _ => Self::Rejected { status, body },
        }
    }

    /// Failures worth retrying after a delay.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::RateLimited { .. } | Self::ServerError { .. } | Self::Network(_)
        )
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            Self::Decode(e.to_string())
        } else {
            Self::Network(e.to_string())
        }
    }
}

/// Body excerpt kept in error values and logs.
const MAX_BODY_EXCERPT: usize = 512;

/// Turn a non-success response into a [`GatewayError`].
pub(crate) async fn error_from_response(response: reqwest::Response) -> GatewayError {
    let status = response.status().as_u16();
    let retry_after = response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs);
    let mut body = response
        .text()
        .await
        .unwrap_or_else(|_| "<unreadable body>".to_string());
    if body.len() > MAX_BODY_EXCERPT {
        let mut end = MAX_BODY_EXCERPT;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        body.truncate(end);
    }
    GatewayError::from_status(status, body, retry_after)
}

/// Parse a successful response body as JSON. An empty body reads as `null`.
pub(crate) async fn json_body(response: reqwest::Response) -> Result<serde_json::Value, GatewayError> {
    let text = response.text().await?;
    if text.trim().is_empty() {
        return Ok(serde_json::Value::Null);
    }
    serde_json::from_str(&text).map_err(|e| GatewayError::Decode(e.to_string()))
}
