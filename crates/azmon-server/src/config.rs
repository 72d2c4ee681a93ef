use anyhow::{bail, Context};
use azmon_cloud::{
    CollectorSettings, NameFilter, ResourceGroupTarget, ResourceTagTarget, ResourceTarget,
    ServicePrincipal, TargetSet,
};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct ExporterConfig {
    #[serde(default)]
    pub credentials: CredentialsConfig,
    #[serde(default = "default_authority_url")]
    pub active_directory_authority_url: String,
    #[serde(default = "default_resource_manager_url")]
    pub resource_manager_url: String,
    /// Metric queries per batch call.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Timeout of each individual HTTP call to Azure.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Deadline of one whole collection cycle.
    #[serde(default = "default_scrape_timeout_secs")]
    pub scrape_timeout_secs: u64,
    #[serde(default = "default_query_lookback_secs")]
    pub query_lookback_secs: u64,
    #[serde(default)]
    pub targets: Vec<TargetConfig>,
    #[serde(default)]
    pub resource_groups: Vec<ResourceGroupConfig>,
    #[serde(default)]
    pub resource_tags: Vec<ResourceTagConfig>,
}

/// Service principal credentials. Empty fields fall back to the
/// `AZURE_*` environment variables.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CredentialsConfig {
    #[serde(default)]
    pub subscription_id: String,
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
    #[serde(default)]
    pub tenant_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricConfig {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TargetConfig {
    #[serde(default)]
    pub resource: String,
    #[serde(default)]
    pub metrics: Vec<MetricConfig>,
    #[serde(default)]
    pub aggregations: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResourceGroupConfig {
    #[serde(default)]
    pub resource_group: String,
    #[serde(default)]
    pub resource_types: Vec<String>,
    #[serde(default)]
    pub resource_name_include_re: Vec<String>,
    #[serde(default)]
    pub resource_name_exclude_re: Vec<String>,
    #[serde(default)]
    pub metrics: Vec<MetricConfig>,
    #[serde(default)]
    pub aggregations: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResourceTagConfig {
    #[serde(default)]
    pub resource_tag_name: String,
    #[serde(default)]
    pub resource_tag_value: String,
    #[serde(default)]
    pub resource_types: Vec<String>,
    #[serde(default)]
    pub metrics: Vec<MetricConfig>,
    #[serde(default)]
    pub aggregations: Vec<String>,
}

fn default_authority_url() -> String {
    "https://login.microsoftonline.com".to_string()
}

fn default_resource_manager_url() -> String {
    "https://management.azure.com".to_string()
}

fn default_batch_size() -> usize {
    20
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_scrape_timeout_secs() -> u64 {
    60
}

fn default_query_lookback_secs() -> u64 {
    180
}

fn metric_names(metrics: &[MetricConfig]) -> Vec<String> {
    metrics.iter().map(|m| m.name.clone()).collect()
}

impl ExporterConfig {
    /// Read, fill credentials from the environment and validate.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let mut config = Self::from_toml(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        config.apply_env_fallbacks(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(content: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Fill every empty credential field from `lookup("AZURE_...")`.
    pub fn apply_env_fallbacks<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let credentials = &mut self.credentials;
        let fields = [
            (&mut credentials.subscription_id, "AZURE_SUBSCRIPTION_ID"),
            (&mut credentials.client_id, "AZURE_CLIENT_ID"),
            (&mut credentials.client_secret, "AZURE_CLIENT_SECRET"),
            (&mut credentials.tenant_id, "AZURE_TENANT_ID"),
        ];
        for (field, key) in fields {
            if field.is_empty() {
                if let Some(value) = lookup(key).filter(|v| !v.is_empty()) {
                    *field = value;
                }
            }
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        let credentials = &self.credentials;
        for (value, name) in [
            (&credentials.subscription_id, "subscription_id"),
            (&credentials.client_id, "client_id"),
            (&credentials.client_secret, "client_secret"),
            (&credentials.tenant_id, "tenant_id"),
        ] {
            if value.is_empty() {
                bail!("credentials.{name} is required (or set it through the environment)");
            }
        }

        if self.batch_size == 0 {
            bail!("batch_size must be at least 1");
        }
        if self.request_timeout_secs == 0 || self.scrape_timeout_secs == 0 {
            bail!("request_timeout_secs and scrape_timeout_secs must be positive");
        }
        if self.query_lookback_secs == 0 {
            bail!("query_lookback_secs must be positive");
        }
        if self.targets.is_empty() && self.resource_groups.is_empty() && self.resource_tags.is_empty() {
            bail!("at least one of targets, resource_groups or resource_tags must be configured");
        }

        for (i, target) in self.targets.iter().enumerate() {
            if target.resource.is_empty() {
                bail!("targets[{i}]: resource is required");
            }
            if target.metrics.is_empty() {
                bail!("targets[{i}] ({}): at least one metric is required", target.resource);
            }
        }
        for (i, group) in self.resource_groups.iter().enumerate() {
            if group.resource_group.is_empty() {
                bail!("resource_groups[{i}]: resource_group is required");
            }
            if group.metrics.is_empty() {
                bail!(
                    "resource_groups[{i}] ({}): at least one metric is required",
                    group.resource_group
                );
            }
        }
        for (i, tag) in self.resource_tags.iter().enumerate() {
            if tag.resource_tag_name.is_empty() {
                bail!("resource_tags[{i}]: resource_tag_name is required");
            }
            if tag.metrics.is_empty() {
                bail!(
                    "resource_tags[{i}] ({}): at least one metric is required",
                    tag.resource_tag_name
                );
            }
        }

        self.target_set()?;
        Ok(())
    }

    /// Targets with their name patterns compiled.
    pub fn target_set(&self) -> anyhow::Result<TargetSet> {
        let targets = self
            .targets
            .iter()
            .map(|t| ResourceTarget {
                resource: t.resource.clone(),
                metrics: metric_names(&t.metrics),
                aggregations: t.aggregations.clone(),
            })
            .collect();

        let resource_groups = self
            .resource_groups
            .iter()
            .map(|g| {
                let name_filter =
                    NameFilter::new(&g.resource_name_include_re, &g.resource_name_exclude_re)
                        .with_context(|| format!("resource group {}", g.resource_group))?;
                Ok(ResourceGroupTarget {
                    resource_group: g.resource_group.clone(),
                    resource_types: g.resource_types.clone(),
                    name_filter,
                    metrics: metric_names(&g.metrics),
                    aggregations: g.aggregations.clone(),
                })
            })
            .collect::<anyhow::Result<Vec<_>>>()?;

        let resource_tags = self
            .resource_tags
            .iter()
            .map(|t| ResourceTagTarget {
                tag_name: t.resource_tag_name.clone(),
                tag_value: t.resource_tag_value.clone(),
                resource_types: t.resource_types.clone(),
                metrics: metric_names(&t.metrics),
                aggregations: t.aggregations.clone(),
            })
            .collect();

        Ok(TargetSet {
            targets,
            resource_groups,
            resource_tags,
        })
    }

    pub fn service_principal(&self) -> ServicePrincipal {
        ServicePrincipal {
            tenant_id: self.credentials.tenant_id.clone(),
            client_id: self.credentials.client_id.clone(),
            client_secret: self.credentials.client_secret.clone(),
        }
    }

    pub fn collector_settings(&self) -> CollectorSettings {
        CollectorSettings {
            batch_size: self.batch_size,
            query_lookback: Duration::from_secs(self.query_lookback_secs),
            cycle_timeout: Duration::from_secs(self.scrape_timeout_secs),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Parse a listen address; a bare `:port` binds every interface.
pub fn listen_socket_addr(address: &str) -> anyhow::Result<SocketAddr> {
    let full = if address.starts_with(':') {
        format!("0.0.0.0{address}")
    } else {
        address.to_string()
    };
    full.parse()
        .with_context(|| format!("Invalid listen address {address}"))
}
