//! Rendering of collected samples in the Prometheus text format.

use azmon_cloud::{Sample, SampleKind};
use prometheus::proto::{Gauge, LabelPair, Metric, MetricFamily, MetricType, Untyped};
use prometheus::{Encoder, TextEncoder};
use std::collections::{BTreeMap, HashSet};

pub const BUILD_INFO_METRIC: &str = "azure_exporter_build_info";

/// Prefix of the 500 body returned when a collection cycle fails.
pub const ERROR_PREFIX: &str = "An error has occurred while serving metrics:\n\n";

pub fn content_type() -> String {
    TextEncoder::new().format_type().to_string()
}

pub fn error_body(err: &dyn std::fmt::Display) -> String {
    format!("{ERROR_PREFIX}{err}")
}

fn build_info_sample() -> Sample {
    Sample {
        name: BUILD_INFO_METRIC.to_string(),
        help: "A metric with a constant '1' value labeled by the exporter version".to_string(),
        kind: SampleKind::Gauge,
        value: 1.0,
        labels: BTreeMap::from([("version".to_string(), env!("CARGO_PKG_VERSION").to_string())]),
    }
}

fn metric_type(kind: SampleKind) -> MetricType {
    match kind {
        SampleKind::Gauge => MetricType::GAUGE,
        SampleKind::Untyped => MetricType::UNTYPED,
    }
}

fn to_metric(sample: &Sample) -> Metric {
    let mut metric = Metric::new();
    for (name, value) in &sample.labels {
        let mut pair = LabelPair::new();
        pair.set_name(name.clone());
        pair.set_value(value.clone());
        metric.mut_label().push(pair);
    }
    match sample.kind {
        SampleKind::Gauge => {
            let mut gauge = Gauge::new();
            gauge.set_value(sample.value);
            metric.set_gauge(gauge);
        }
        SampleKind::Untyped => {
            let mut untyped = Untyped::new();
            untyped.set_value(sample.value);
            metric.set_untyped(untyped);
        }
    }
    metric
}

/// Group samples into one family per name, sorted by name.
///
/// The first sample of a name fixes its help text and type. A repeated
/// name/label combination (a resource matched by two targets) is dropped.
pub fn build_families(samples: &[Sample]) -> Vec<MetricFamily> {
    let mut families: BTreeMap<&str, MetricFamily> = BTreeMap::new();
    let mut seen: HashSet<(&str, &BTreeMap<String, String>)> = HashSet::new();

    for sample in samples {
        if !seen.insert((sample.name.as_str(), &sample.labels)) {
            tracing::debug!(metric = %sample.name, "Dropping duplicate series");
            continue;
        }
        let family = families.entry(sample.name.as_str()).or_insert_with(|| {
            let mut family = MetricFamily::new();
            family.set_name(sample.name.clone());
            family.set_help(sample.help.clone());
            family.set_field_type(metric_type(sample.kind));
            family
        });
        if family.get_field_type() != metric_type(sample.kind) {
            tracing::warn!(metric = %sample.name, "Dropping sample whose type differs from its family");
            continue;
        }
        family.mut_metric().push(to_metric(sample));
    }

    families.into_values().collect()
}

/// Text exposition of `samples` plus the build info sample.
pub fn encode(samples: &[Sample]) -> prometheus::Result<Vec<u8>> {
    let mut all = Vec::with_capacity(samples.len() + 1);
    all.extend_from_slice(samples);
    all.push(build_info_sample());

    let encoder = TextEncoder::new();
    let mut text = String::new();
    for family in build_families(&all) {
        if family.get_field_type() == MetricType::UNTYPED {
            text.push_str(&encode_untyped(&encoder, &family)?);
        } else {
            encoder.encode_utf8(std::slice::from_ref(&family), &mut text)?;
        }
    }
    Ok(text.into_bytes())
}

/// `TextEncoder` cannot write untyped families. Encode the samples as a
/// gauge and restore the `# TYPE` line.
fn encode_untyped(encoder: &TextEncoder, family: &MetricFamily) -> prometheus::Result<String> {
    let mut as_gauge = family.clone();
    as_gauge.set_field_type(MetricType::GAUGE);
    for metric in as_gauge.mut_metric().iter_mut() {
        let mut gauge = Gauge::new();
        gauge.set_value(metric.get_untyped().get_value());
        metric.set_gauge(gauge);
    }

    let text = encoder.encode_to_string(&[as_gauge])?;
    let name = family.get_name();
    Ok(text.replacen(
        &format!("# TYPE {name} gauge\n"),
        &format!("# TYPE {name} untyped\n"),
        1,
    ))
}
