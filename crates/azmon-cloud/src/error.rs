use std::time::Duration;

/// Errors that can occur while collecting metrics from Azure.
///
/// The variants form a closed set so callers can tell a failure that ends
/// the whole collection cycle apart from one that only skips a single
/// resource (see [`MonitorError::is_resource_scoped`]).
///
/// # Examples
///
/// ```rust
/// use azmon_cloud::error::MonitorError;
///
/// let err = MonitorError::ResourceLookup {
///     resource_id: "/resourceGroups/rg/providers/Microsoft.Web/sites/app".to_string(),
///     reason: "no api version found for type Microsoft.Web/sites".to_string(),
/// };
/// assert!(err.is_resource_scoped());
/// assert!(err.to_string().contains("Microsoft.Web/sites"));
/// ```
#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    /// Fetching or refreshing the bearer token failed.
    #[error("Azure AD authentication against {endpoint} failed: {reason}")]
    Auth { endpoint: String, reason: String },

    /// Listing API versions or resources failed.
    #[error("{operation} failed: {source}")]
    Discovery {
        operation: String,
        #[source]
        source: Box<MonitorError>,
    },

    /// Metadata lookup for one resource failed; only that resource is skipped.
    #[error("failed to get resource information for {resource_id}: {reason}")]
    ResourceLookup { resource_id: String, reason: String },

    /// Non-2xx status from an Azure endpoint.
    #[error("Azure API HTTP error: endpoint={endpoint}, status={status}, body={body}")]
    Http {
        endpoint: String,
        status: u16,
        body: String,
    },

    /// Connection, TLS or body-read failure from `reqwest`.
    #[error("Network error calling {endpoint}: {source}")]
    Network {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },

    /// The response body was not the JSON shape we expected.
    #[error("Error unmarshalling response body from {endpoint}: {source}")]
    Decode {
        endpoint: String,
        #[source]
        source: serde_json::Error,
    },

    /// The batch endpoint answered with a different number of items than were sent.
    #[error("batch response carried {actual} items for {expected} requests")]
    BatchMismatch { expected: usize, actual: usize },

    /// The collection cycle did not finish before its deadline.
    #[error("collection cycle timed out after {0:?}")]
    Timeout(Duration),

    /// Target configuration is invalid (for example a bad name pattern).
    #[error("Configuration error: {0}")]
    Config(String),
}

impl MonitorError {
    /// Wraps a transport or decode failure as a discovery failure for `operation`.
    pub fn discovery(operation: impl Into<String>, source: MonitorError) -> Self {
        Self::Discovery {
            operation: operation.into(),
            source: Box::new(source),
        }
    }

    /// `true` when the failure only affects one resource and the cycle may continue.
    pub fn is_resource_scoped(&self) -> bool {
        matches!(self, Self::ResourceLookup { .. })
    }
}

/// Convenience type alias so callers can write `error::Result<T>`.
pub type Result<T> = std::result::Result<T, MonitorError>;
