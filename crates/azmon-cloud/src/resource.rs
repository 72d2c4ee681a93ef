use crate::error::{MonitorError, Result};
use regex::Regex;
use serde::Deserialize;
use std::collections::HashMap;

/// Azure resource metadata resolved for one collection cycle.
///
/// `id` is subscription-relative (`/resourceGroups/...`); the subscription
/// travels separately in `subscription`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResourceDescriptor {
    pub id: String,
    pub name: String,
    pub location: String,
    pub resource_type: String,
    pub tags: HashMap<String, String>,
    pub managed_by: String,
    pub subscription: String,
}

/// A resource exactly as ARM returns it from list and get calls.
#[derive(Debug, Clone, Deserialize)]
pub struct ArmResource {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub location: String,
    #[serde(default, rename = "type")]
    pub resource_type: String,
    #[serde(default)]
    pub tags: Option<HashMap<String, String>>,
    #[serde(default, rename = "managedBy")]
    pub managed_by: Option<String>,
}

impl ArmResource {
    pub fn into_descriptor(self, subscription_id: &str) -> ResourceDescriptor {
        ResourceDescriptor {
            id: strip_subscription_prefix(&self.id, subscription_id),
            name: self.name,
            location: self.location,
            resource_type: self.resource_type,
            tags: self.tags.unwrap_or_default(),
            managed_by: self.managed_by.unwrap_or_default(),
            subscription: subscription_id.to_string(),
        }
    }
}

/// One page of a resource listing.
#[derive(Debug, Deserialize)]
pub struct ResourceListPage {
    #[serde(default)]
    pub value: Vec<ArmResource>,
    #[serde(default, rename = "nextLink")]
    pub next_link: Option<String>,
}

/// Remove a leading `/subscriptions/<id>` (case-insensitive) from `resource_id`.
///
/// Ids that do not carry the prefix are returned unchanged.
pub fn strip_subscription_prefix(resource_id: &str, subscription_id: &str) -> String {
    let prefix = format!("/subscriptions/{subscription_id}");
    match resource_id.get(..prefix.len()) {
        Some(head) if head.eq_ignore_ascii_case(&prefix) => {
            let rest = &resource_id[prefix.len()..];
            if rest.is_empty() || rest.starts_with('/') {
                rest.to_string()
            } else {
                resource_id.to_string()
            }
        }
        _ => resource_id.to_string(),
    }
}

/// Include/exclude name patterns, compiled once when configuration loads.
#[derive(Debug, Clone, Default)]
pub struct NameFilter {
    include: Vec<Regex>,
    exclude: Vec<Regex>,
}

impl NameFilter {
    pub fn new<S: AsRef<str>>(include: &[S], exclude: &[S]) -> Result<Self> {
        Ok(Self {
            include: compile_all(include)?,
            exclude: compile_all(exclude)?,
        })
    }

    /// Kept when it matches at least one include pattern (or there are none)
    /// and no exclude pattern.
    pub fn matches(&self, name: &str) -> bool {
        let included = self.include.is_empty() || self.include.iter().any(|re| re.is_match(name));
        included && !self.exclude.iter().any(|re| re.is_match(name))
    }
}

fn compile_all<S: AsRef<str>>(patterns: &[S]) -> Result<Vec<Regex>> {
    patterns
        .iter()
        .map(|p| {
            Regex::new(p.as_ref()).map_err(|e| {
                MonitorError::Config(format!("invalid resource name pattern '{}': {e}", p.as_ref()))
            })
        })
        .collect()
}

/// Escape single quotes for an OData `$filter` string literal.
pub fn escape_filter_value(value: &str) -> String {
    value.replace('\'', "\\'")
}
