use crate::resource::ResourceDescriptor;
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use std::collections::BTreeMap;
use std::fmt;

/// API version of the Azure Monitor metrics endpoint.
pub const METRICS_API_VERSION: &str = "2018-01-01";

/// Default lookback of the query time span, in seconds.
pub const DEFAULT_LOOKBACK_SECS: u64 = 180;

/// Statistical summaries the exporter knows how to expose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Aggregation {
    Total,
    Average,
    Minimum,
    Maximum,
}

impl Aggregation {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "Total" => Some(Self::Total),
            "Average" => Some(Self::Average),
            "Minimum" => Some(Self::Minimum),
            "Maximum" => Some(Self::Maximum),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Total => "Total",
            Self::Average => "Average",
            Self::Minimum => "Minimum",
            Self::Maximum => "Maximum",
        }
    }

    /// Suffix appended to the metric name for this aggregation.
    pub fn suffix(&self) -> &'static str {
        match self {
            Self::Total => "_total",
            Self::Average => "_average",
            Self::Minimum => "_min",
            Self::Maximum => "_max",
        }
    }
}

impl fmt::Display for Aggregation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Keep the recognised aggregations in their requested order; anything else
/// is dropped without error.
pub fn filter_aggregations<S: AsRef<str>>(requested: &[S]) -> Vec<Aggregation> {
    requested
        .iter()
        .filter_map(|name| Aggregation::parse(name.as_ref()))
        .collect()
}

/// `[start, end]` of a metrics query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    /// A window of `lookback` ending at `end`.
    pub fn ending_at(end: DateTime<Utc>, lookback: Duration) -> Self {
        Self {
            start: end - lookback,
            end,
        }
    }

    /// `<start>/<end>` in RFC 3339, seconds precision, UTC.
    pub fn timespan(&self) -> String {
        format!(
            "{}/{}",
            self.start.to_rfc3339_opts(SecondsFormat::Secs, true),
            self.end.to_rfc3339_opts(SecondsFormat::Secs, true)
        )
    }
}

/// Relative metrics URL for one resource, suitable for the batch endpoint.
///
/// `resource_id` is subscription-relative (`/resourceGroups/...`).
pub fn metric_query_url(
    subscription_id: &str,
    resource_id: &str,
    metric_names: &str,
    aggregations: &[Aggregation],
    window: &TimeWindow,
) -> String {
    let path = format!(
        "/subscriptions/{subscription_id}{resource_id}/providers/microsoft.insights/metrics"
    );

    let mut params = BTreeMap::new();
    if !metric_names.is_empty() {
        params.insert("metricnames", metric_names.to_string());
    }
    let aggregation = aggregations
        .iter()
        .map(Aggregation::as_str)
        .collect::<Vec<_>>()
        .join(",");
    params.insert("aggregation", aggregation);
    params.insert("timespan", window.timespan());
    params.insert("api-version", METRICS_API_VERSION.to_string());

    let query = params
        .iter()
        .map(|(k, v)| format!("{}={}", k, urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&");

    format!("{path}?{query}")
}

/// One resource's unit of work for a collection cycle.
#[derive(Debug, Clone)]
pub struct ResolvedQuery {
    pub resource_url: String,
    pub metrics: String,
    pub aggregations: Vec<Aggregation>,
    pub resource: ResourceDescriptor,
}

impl ResolvedQuery {
    pub fn new(
        resource: ResourceDescriptor,
        metric_names: &[String],
        requested_aggregations: &[String],
        window: &TimeWindow,
    ) -> Self {
        let metrics = metric_names.join(",");
        let aggregations = filter_aggregations(requested_aggregations);
        let resource_url = metric_query_url(
            &resource.subscription,
            &resource.id,
            &metrics,
            &aggregations,
            window,
        );
        Self {
            resource_url,
            metrics,
            aggregations,
            resource,
        }
    }

    pub fn resource_id(&self) -> &str {
        &self.resource.id
    }
}
