//! Single HTTP round trip to the billing provider, no retries.

use std::time::Duration;

use async_trait::async_trait;

/// Raw provider response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    pub status: u16,
    pub retry_after: Option<String>,
    pub body: String,
}

impl TransportResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_rate_limited(&self) -> bool {
        self.status == 429
    }
}

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,
    #[error("transport error: {0}")]
    Io(String),
}

/// One form-encoded POST to the provider endpoint.
#[async_trait]
pub trait BillingTransport: Send + Sync {
    async fn post_form(&self, form: &[(&'static str, String)]) -> Result<TransportResponse, TransportError>;
}

/// `reqwest` transport bound to `{base}/api/pagstream/subscription/get`.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
    endpoint: String,
}

impl ReqwestTransport {
    pub const PATH: &'static str = "/api/pagstream/subscription/get";

    pub fn new(base_url: &str, timeout: Duration, connect_timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(connect_timeout)
            .build()?;
        Ok(Self {
            client,
            endpoint: format!("{}{}", base_url.trim_end_matches('/'), Self::PATH),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl BillingTransport for ReqwestTransport {
    async fn post_form(&self, form: &[(&'static str, String)]) -> Result<TransportResponse, TransportError> {
        let response = self
            .client
            .post(&self.endpoint)
            .form(form)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = response.status().as_u16();
        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.text().await.map_err(map_reqwest_error)?;

        Ok(TransportResponse {
            status,
            retry_after,
            body,
        })
    }
}

fn map_reqwest_error(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout
    } else {
        TransportError::Io(err.to_string())
    }
}
