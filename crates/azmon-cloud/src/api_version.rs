use crate::error::{MonitorError, Result};
use crate::transport::ArmClient;
use chrono::NaiveDate;
use serde::Deserialize;
use std::collections::HashMap;

const PROVIDERS_API_VERSION: &str = "2019-05-10";

#[derive(Debug, Deserialize)]
pub struct ProviderListing {
    #[serde(default)]
    pub value: Vec<ProviderNamespace>,
}

#[derive(Debug, Deserialize)]
pub struct ProviderNamespace {
    pub namespace: String,
    #[serde(default, rename = "resourceTypes")]
    pub resource_types: Vec<ProviderResourceType>,
}

#[derive(Debug, Deserialize)]
pub struct ProviderResourceType {
    #[serde(rename = "resourceType")]
    pub resource_type: String,
    #[serde(default, rename = "apiVersions")]
    pub api_versions: Vec<String>,
}

/// Newest known API version per `namespace/type`, built once per collection cycle.
#[derive(Debug, Clone, Default)]
pub struct ApiVersionMap {
    versions: HashMap<String, String>,
}

impl ApiVersionMap {
    pub fn from_listing(listing: &ProviderListing) -> Self {
        let mut versions = HashMap::new();
        for provider in &listing.value {
            for rt in &provider.resource_types {
                let Some(latest) = latest_version(rt.api_versions.iter().map(String::as_str))
                else {
                    continue;
                };
                versions.insert(
                    format!("{}/{}", provider.namespace, rt.resource_type),
                    latest.to_string(),
                );
            }
        }
        Self { versions }
    }

    /// Exact match on `namespace/type`. `None` is a per-resource soft failure.
    pub fn lookup(&self, resource_type: &str) -> Option<&str> {
        self.versions.get(resource_type).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.versions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }
}

impl FromIterator<(String, String)> for ApiVersionMap {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self {
            versions: iter.into_iter().collect(),
        }
    }
}

/// Pick the candidate with the newest leading `YYYY-MM-DD` date.
///
/// Candidates without a parseable date are logged and skipped. On equal
/// dates the later candidate wins, so `2020-01-01-preview` listed after
/// `2020-01-01` is selected.
pub fn latest_version<'a>(candidates: impl IntoIterator<Item = &'a str>) -> Option<&'a str> {
    let mut latest: Option<(NaiveDate, &'a str)> = None;

    for candidate in candidates {
        let date = match version_date(candidate) {
            Some(date) => date,
            None => {
                tracing::warn!(api_version = candidate, "Ignoring API version without a leading date");
                continue;
            }
        };

        match latest {
            Some((newest, _)) if date < newest => {}
            _ => latest = Some((date, candidate)),
        }
    }

    latest.map(|(_, version)| version)
}

fn version_date(version: &str) -> Option<NaiveDate> {
    let prefix = version.get(..10)?;
    NaiveDate::parse_from_str(prefix, "%Y-%m-%d").ok()
}

/// `namespace/type` of a subscription-relative resource id, taken from the
/// two segments that follow `providers`.
///
/// `/resourceGroups/rg/providers/Microsoft.Sql/servers/db1/databases/d`
/// yields `Microsoft.Sql/servers`.
pub fn resource_type_of(resource_id: &str) -> Option<String> {
    let mut segments = resource_id.split('/').filter(|s| !s.is_empty());
    segments.find(|s| s.eq_ignore_ascii_case("providers"))?;
    let namespace = segments.next()?;
    let resource_type = segments.next()?;
    Some(format!("{namespace}/{resource_type}"))
}

impl ArmClient {
    /// List the registered providers of the subscription and keep the newest version per type.
    pub async fn resolve_api_versions(&self, token: &str) -> Result<ApiVersionMap> {
        let url = format!(
            "{}/providers?api-version={PROVIDERS_API_VERSION}",
            self.subscription_url()
        );

        let listing: ProviderListing = self
            .get_json(&url, token)
            .await
            .map_err(|e| MonitorError::discovery("listing API versions", e))?;

        let versions = ApiVersionMap::from_listing(&listing);
        if versions.is_empty() {
            tracing::warn!("Provider listing returned no API versions");
        } else {
            tracing::debug!(resource_types = versions.len(), "Resolved API versions");
        }
        Ok(versions)
    }
}
