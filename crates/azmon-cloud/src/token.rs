use crate::error::{MonitorError, Result};
use crate::transport::ArmTransport;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Deserializer};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Refresh this many minutes before the token actually expires.
pub const REFRESH_SKEW_MINUTES: i64 = 10;

/// Service principal credentials used for the client-credentials grant.
#[derive(Debug, Clone)]
pub struct ServicePrincipal {
    pub tenant_id: String,
    pub client_id: String,
    pub client_secret: String,
}

/// A bearer token and the instant it stops being valid.
#[derive(Debug, Clone)]
pub struct Credential {
    pub access_token: String,
    pub expires_on: DateTime<Utc>,
}

impl Credential {
    pub fn needs_refresh(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_on - Duration::minutes(REFRESH_SKEW_MINUTES)
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(deserialize_with = "deserialize_epoch_seconds")]
    expires_on: i64,
}

/// AAD v1 sends `expires_on` as a numeric string; accept a bare number too.
fn deserialize_epoch_seconds<'de, D>(deserializer: D) -> std::result::Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum EpochInput {
        Number(i64),
        Text(String),
    }

    match EpochInput::deserialize(deserializer)? {
        EpochInput::Number(secs) => Ok(secs),
        EpochInput::Text(text) => text
            .trim()
            .parse::<i64>()
            .map_err(|e| serde::de::Error::custom(format!("expires_on '{text}': {e}"))),
    }
}

/// Owns the process-wide [`Credential`] and refreshes it before expiry.
///
/// The credential sits behind an async mutex that is held for the duration
/// of a refresh, so concurrent scrapes wait for one token fetch instead of
/// racing each other.
pub struct TokenProvider {
    transport: Arc<dyn ArmTransport>,
    token_endpoint: String,
    resource: String,
    principal: ServicePrincipal,
    credential: Mutex<Option<Credential>>,
}

impl TokenProvider {
    /// `authority_url` is e.g. `https://login.microsoftonline.com`; `resource`
    /// is the audience, normally the Resource Manager URL.
    pub fn new(
        transport: Arc<dyn ArmTransport>,
        authority_url: &str,
        resource: &str,
        principal: ServicePrincipal,
    ) -> Self {
        let token_endpoint = format!(
            "{}/{}/oauth2/token",
            authority_url.trim_end_matches('/'),
            principal.tenant_id
        );
        Self {
            transport,
            token_endpoint,
            resource: resource.to_string(),
            principal,
            credential: Mutex::new(None),
        }
    }

    /// Exchange the client credentials for a new token. Does not touch the stored credential.
    pub async fn fetch_token(&self) -> Result<Credential> {
        let form = [
            ("grant_type", "client_credentials"),
            ("resource", self.resource.as_str()),
            ("client_id", self.principal.client_id.as_str()),
            ("client_secret", self.principal.client_secret.as_str()),
        ];

        let body = self
            .transport
            .post_form(&self.token_endpoint, &form)
            .await
            .map_err(|e| self.auth_error(e.to_string()))?;

        let parsed: TokenResponse = serde_json::from_str(&body)
            .map_err(|e| self.auth_error(format!("Error unmarshalling token response: {e}")))?;

        let expires_on = DateTime::from_timestamp(parsed.expires_on, 0)
            .ok_or_else(|| self.auth_error(format!("expires_on out of range: {}", parsed.expires_on)))?;

        Ok(Credential {
            access_token: parsed.access_token,
            expires_on,
        })
    }

    /// Return a token that is valid for at least [`REFRESH_SKEW_MINUTES`], refreshing if needed.
    pub async fn ensure_fresh_token(&self) -> Result<String> {
        let mut guard = self.credential.lock().await;
        let now = Utc::now();

        if let Some(credential) = guard.as_ref() {
            if !credential.needs_refresh(now) {
                return Ok(credential.access_token.clone());
            }
            tracing::debug!(expires_on = %credential.expires_on, "Refreshing Azure access token");
        }

        let credential = self.fetch_token().await?;
        tracing::info!(expires_on = %credential.expires_on, "Obtained Azure access token");
        let token = credential.access_token.clone();
        *guard = Some(credential);
        Ok(token)
    }

    fn auth_error(&self, reason: String) -> MonitorError {
        MonitorError::Auth {
            endpoint: self.token_endpoint.clone(),
            reason,
        }
    }
}
