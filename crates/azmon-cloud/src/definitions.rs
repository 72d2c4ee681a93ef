use crate::batch::LocalizableName;
use crate::error::Result;
use crate::query::METRICS_API_VERSION;
use crate::resource::strip_subscription_prefix;
use crate::transport::ArmClient;
use crate::TargetSet;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct MetricDefinitionListing {
    #[serde(default)]
    value: Vec<MetricDefinition>,
}

/// A metric Azure Monitor offers for a resource.
#[derive(Debug, Clone, Deserialize)]
pub struct MetricDefinition {
    #[serde(default)]
    pub name: LocalizableName,
    #[serde(default)]
    pub unit: String,
    #[serde(default, rename = "primaryAggregationType")]
    pub primary_aggregation_type: String,
}

/// Available metrics of one resource, keyed by its subscription-relative id.
#[derive(Debug, Clone)]
pub struct ResourceMetricDefinitions {
    pub resource_id: String,
    pub definitions: Vec<MetricDefinition>,
}

impl ResourceMetricDefinitions {
    /// Resource name segment of the id, or the whole id when it is too short.
    pub fn resource_name(&self) -> &str {
        self.resource_id.split('/').nth(6).unwrap_or(&self.resource_id)
    }
}

impl ArmClient {
    pub async fn list_metric_definitions(
        &self,
        token: &str,
        resource_id: &str,
    ) -> Result<Vec<MetricDefinition>> {
        let url = format!(
            "{}{}/providers/microsoft.insights/metricDefinitions?api-version={METRICS_API_VERSION}",
            self.subscription_url(),
            resource_id
        );
        let listing: MetricDefinitionListing = self.get_json(&url, token).await?;
        Ok(listing.value)
    }

    /// Metric definitions for every explicit target and every member of each
    /// configured resource group. The first failure aborts the listing.
    pub async fn metric_definitions(
        &self,
        token: &str,
        targets: &TargetSet,
    ) -> Result<Vec<ResourceMetricDefinitions>> {
        let mut results = Vec::new();

        for target in &targets.targets {
            let resource_id = strip_subscription_prefix(&target.resource, self.subscription_id());
            let definitions = self.list_metric_definitions(token, &resource_id).await?;
            results.push(ResourceMetricDefinitions {
                resource_id,
                definitions,
            });
        }

        for group in &targets.resource_groups {
            for member in self.list_resource_group(token, group).await? {
                let definitions = self.list_metric_definitions(token, &member.id).await?;
                results.push(ResourceMetricDefinitions {
                    resource_id: member.id,
                    definitions,
                });
            }
        }
        Ok(results)
    }
}
