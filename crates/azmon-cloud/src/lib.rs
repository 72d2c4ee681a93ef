//! Azure Monitor collection core.
//!
//! A collection cycle authenticates with a service principal, resolves the
//! configured targets into concrete resources, queries their metrics through
//! the Resource Manager batch endpoint and translates the answers into
//! [`translate::Sample`]s. [`collector::MonitorCollector`] drives the cycle;
//! everything that talks HTTP goes through the [`transport::ArmTransport`] seam.

pub mod api_version;
pub mod batch;
pub mod collector;
pub mod definitions;
pub mod error;
pub mod query;
pub mod resolver;
pub mod resource;
pub mod token;
pub mod translate;
pub mod transport;

#[cfg(test)]
mod testing;

pub use collector::{CollectorSettings, MonitorCollector};
pub use error::{MonitorError, Result};
pub use resource::{NameFilter, ResourceDescriptor};
pub use token::{ServicePrincipal, TokenProvider};
pub use translate::{Sample, SampleKind};
pub use transport::{ArmClient, ArmTransport, HttpTransport};

/// A single resource addressed by its subscription-relative id.
#[derive(Debug, Clone)]
pub struct ResourceTarget {
    pub resource: String,
    pub metrics: Vec<String>,
    pub aggregations: Vec<String>,
}

/// Every resource of the listed types in one resource group, filtered by name.
#[derive(Debug, Clone)]
pub struct ResourceGroupTarget {
    pub resource_group: String,
    pub resource_types: Vec<String>,
    pub name_filter: NameFilter,
    pub metrics: Vec<String>,
    pub aggregations: Vec<String>,
}

/// Every resource of the subscription carrying `tag_name = tag_value`.
///
/// An empty `resource_types` keeps resources of any type.
#[derive(Debug, Clone)]
pub struct ResourceTagTarget {
    pub tag_name: String,
    pub tag_value: String,
    pub resource_types: Vec<String>,
    pub metrics: Vec<String>,
    pub aggregations: Vec<String>,
}

/// All targets of a collector, resolved in this order each cycle.
#[derive(Debug, Clone, Default)]
pub struct TargetSet {
    pub targets: Vec<ResourceTarget>,
    pub resource_groups: Vec<ResourceGroupTarget>,
    pub resource_tags: Vec<ResourceTagTarget>,
}
