use crate::batch::{BatchItemResponse, DataPoint};
use crate::query::{Aggregation, ResolvedQuery};
use crate::resource::ResourceDescriptor;
use std::collections::BTreeMap;

pub const RESOURCE_INFO_METRIC: &str = "azure_resource_info";
const RESOURCE_INFO_HELP: &str = "Azure information available for resource";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleKind {
    Gauge,
    Untyped,
}

/// One exposition sample produced by a collection cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub name: String,
    pub help: String,
    pub kind: SampleKind,
    pub value: f64,
    pub labels: BTreeMap<String, String>,
}

/// Prometheus-safe base name for an Azure metric and its unit.
///
/// `"Bytes Sent/Sec"` with unit `"Count"` becomes `bytes_sent_per_sec_count`.
pub fn sanitize_metric_name(name: &str, unit: &str) -> String {
    let joined = format!("{}_{}", name.replace(' ', "_"), unit).to_lowercase();
    replace_invalid(&joined.replace('/', "_per_"), |c| c.is_ascii_alphanumeric() || c == '_' || c == ':')
}

fn sanitize_label_name(name: &str) -> String {
    replace_invalid(&name.to_lowercase(), |c| c.is_ascii_alphanumeric() || c == '_')
}

fn replace_invalid(input: &str, valid: impl Fn(char) -> bool) -> String {
    input
        .chars()
        .map(|c| if valid(c) { c } else { '_' })
        .collect()
}

/// `resource_group`, `resource_name` and, for nested resources,
/// `sub_resource_name`, read from the positions of a subscription-relative id.
pub fn resource_labels(resource_id: &str) -> BTreeMap<String, String> {
    let segments: Vec<&str> = resource_id.split('/').collect();
    let mut labels = BTreeMap::new();

    if let Some(group) = segments.get(2) {
        labels.insert("resource_group".to_string(), group.to_string());
    }
    if let Some(name) = segments.get(6) {
        labels.insert("resource_name".to_string(), name.to_string());
    }
    if let Some(sub_name) = segments.get(8).filter(|s| !s.is_empty()) {
        labels.insert("sub_resource_name".to_string(), sub_name.to_string());
    }
    labels
}

/// Data labels plus every piece of resource metadata, tags included.
pub fn resource_info_labels(resource: &ResourceDescriptor) -> BTreeMap<String, String> {
    let mut labels = resource_labels(&resource.id);
    labels.insert("id".to_string(), resource.id.clone());
    labels.insert("resource_name".to_string(), resource.name.clone());
    labels.insert("resource_type".to_string(), resource.resource_type.clone());
    labels.insert("azure_location".to_string(), resource.location.clone());
    labels.insert("azure_subscription".to_string(), resource.subscription.clone());
    labels.insert("managed_by".to_string(), resource.managed_by.clone());

    let mut tags: Vec<(&String, &String)> = resource.tags.iter().collect();
    tags.sort();
    for (key, value) in tags {
        labels.insert(format!("tag_{}", sanitize_label_name(key)), value.clone());
    }
    labels
}

fn aggregate_value(point: &DataPoint, aggregation: Aggregation) -> Option<f64> {
    match aggregation {
        Aggregation::Total => point.total,
        Aggregation::Average => point.average,
        Aggregation::Minimum => point.minimum,
        Aggregation::Maximum => point.maximum,
    }
}

/// Turn one sub-response into samples.
///
/// Yields nothing for a non-200 status or an empty payload. Otherwise every
/// metric contributes the requested aggregates of the last point of its first
/// series, followed by a single `azure_resource_info` sample.
pub fn translate(query: &ResolvedQuery, response: &BatchItemResponse) -> Vec<Sample> {
    let resource_id = query.resource_id();
    let content = &response.content;

    if response.http_status_code != 200 {
        let message = content.error.as_ref().map(|e| e.message.as_str()).unwrap_or("");
        tracing::warn!(
            resource = %resource_id,
            status = response.http_status_code,
            error_message = message,
            "Metrics query failed for resource"
        );
        return Vec::new();
    }

    let first_series = content.value.first().and_then(|v| v.timeseries.first());
    let Some(series) = first_series else {
        tracing::warn!(resource = %resource_id, metrics = %query.metrics, "Metric not found at target");
        return Vec::new();
    };
    if series.data.is_empty() {
        tracing::warn!(resource = %resource_id, metrics = %query.metrics, "No metric data returned");
        return Vec::new();
    }

    let labels = resource_labels(resource_id);
    let mut samples = Vec::new();

    for metric in &content.value {
        let Some(point) = metric.timeseries.first().and_then(|s| s.data.last()) else {
            tracing::debug!(
                resource = %resource_id,
                metric = %metric.name.value,
                "Skipping metric without data points"
            );
            continue;
        };
        let base = sanitize_metric_name(&metric.name.value, &metric.unit);

        for aggregation in &query.aggregations {
            let Some(value) = aggregate_value(point, *aggregation) else {
                continue;
            };
            let name = format!("{base}{}", aggregation.suffix());
            samples.push(Sample {
                help: name.clone(),
                name,
                kind: SampleKind::Gauge,
                value,
                labels: labels.clone(),
            });
        }
    }

    samples.push(Sample {
        name: RESOURCE_INFO_METRIC.to_string(),
        help: RESOURCE_INFO_HELP.to_string(),
        kind: SampleKind::Untyped,
        value: 0.0,
        labels: resource_info_labels(&query.resource),
    });

    samples
}
