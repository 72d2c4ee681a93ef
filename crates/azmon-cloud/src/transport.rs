use crate::error::{MonitorError, Result};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;

/// Maximum number of characters of an error body carried into [`MonitorError::Http`].
const MAX_BODY_EXCERPT_CHARS: usize = 200;

/// HTTP seam between the collector and Azure.
///
/// Implementations return the raw response body for 2xx statuses and a
/// [`MonitorError::Http`] (or [`MonitorError::Network`]) otherwise. There
/// are no retries at this layer.
#[async_trait::async_trait]
pub trait ArmTransport: Send + Sync {
    /// `GET url` with a bearer token.
    async fn get(&self, url: &str, bearer: &str) -> Result<String>;

    /// `POST url` with a JSON body and a bearer token.
    async fn post_json(&self, url: &str, bearer: &str, body: &serde_json::Value)
        -> Result<String>;

    /// `POST url` with a form-encoded body and no authorization header.
    async fn post_form(&self, url: &str, form: &[(&str, &str)]) -> Result<String>;
}

/// [`ArmTransport`] over a shared `reqwest` client.
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(request_timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .use_rustls_tls()
            .timeout(request_timeout)
            .build()
            .map_err(|e| MonitorError::Config(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self { client })
    }

    async fn read_body(
        url: &str,
        response: std::result::Result<reqwest::Response, reqwest::Error>,
    ) -> Result<String> {
        let response = response.map_err(|source| MonitorError::Network {
            endpoint: url.to_string(),
            source,
        })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|source| MonitorError::Network {
                endpoint: url.to_string(),
                source,
            })?;

        if !status.is_success() {
            return Err(MonitorError::Http {
                endpoint: url.to_string(),
                status: status.as_u16(),
                body: body_excerpt(&body, MAX_BODY_EXCERPT_CHARS),
            });
        }

        Ok(body)
    }
}

#[async_trait::async_trait]
impl ArmTransport for HttpTransport {
    async fn get(&self, url: &str, bearer: &str) -> Result<String> {
        let response = self.client.get(url).bearer_auth(bearer).send().await;
        Self::read_body(url, response).await
    }

    async fn post_json(
        &self,
        url: &str,
        bearer: &str,
        body: &serde_json::Value,
    ) -> Result<String> {
        let response = self
            .client
            .post(url)
            .bearer_auth(bearer)
            .json(body)
            .send()
            .await;
        Self::read_body(url, response).await
    }

    async fn post_form(&self, url: &str, form: &[(&str, &str)]) -> Result<String> {
        let response = self.client.post(url).form(form).send().await;
        Self::read_body(url, response).await
    }
}

/// Subscription-scoped view of Azure Resource Manager.
///
/// Every discovery, lookup and batch call goes through one of these; it
/// knows the management endpoint and the active subscription and decodes
/// JSON bodies into typed responses.
#[derive(Clone)]
pub struct ArmClient {
    transport: Arc<dyn ArmTransport>,
    resource_manager_url: String,
    subscription_id: String,
}

impl ArmClient {
    pub fn new(
        transport: Arc<dyn ArmTransport>,
        resource_manager_url: &str,
        subscription_id: &str,
    ) -> Self {
        Self {
            transport,
            resource_manager_url: resource_manager_url.trim_end_matches('/').to_string(),
            subscription_id: subscription_id.to_string(),
        }
    }

    pub fn subscription_id(&self) -> &str {
        &self.subscription_id
    }

    pub fn resource_manager_url(&self) -> &str {
        &self.resource_manager_url
    }

    /// `<rm>/subscriptions/<id>`
    pub fn subscription_url(&self) -> String {
        format!(
            "{}/subscriptions/{}",
            self.resource_manager_url, self.subscription_id
        )
    }

    pub(crate) fn transport(&self) -> &Arc<dyn ArmTransport> {
        &self.transport
    }

    pub(crate) async fn get_json<T: DeserializeOwned>(&self, url: &str, token: &str) -> Result<T> {
        let body = self.transport.get(url, token).await?;
        decode(url, &body)
    }

    pub(crate) async fn post_json<T: DeserializeOwned>(
        &self,
        url: &str,
        token: &str,
        payload: &serde_json::Value,
    ) -> Result<T> {
        let body = self.transport.post_json(url, token, payload).await?;
        decode(url, &body)
    }
}

pub(crate) fn decode<T: DeserializeOwned>(endpoint: &str, body: &str) -> Result<T> {
    serde_json::from_str(body).map_err(|source| MonitorError::Decode {
        endpoint: endpoint.to_string(),
        source,
    })
}

/// Truncate `body` to at most `max` bytes on a char boundary, marking the cut.
pub fn body_excerpt(body: &str, max: usize) -> String {
    if body.len() <= max {
        return body.to_string();
    }
    let mut end = max;
    while end > 0 && !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &body[..end])
}
