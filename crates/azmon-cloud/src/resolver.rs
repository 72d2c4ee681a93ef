use crate::api_version::{resource_type_of, ApiVersionMap};
use crate::error::{MonitorError, Result};
use crate::resource::{escape_filter_value, ArmResource, ResourceDescriptor, ResourceListPage};
use crate::transport::ArmClient;
use crate::{ResourceGroupTarget, ResourceTagTarget};
use std::collections::HashSet;

const RESOURCE_GROUP_API_VERSION: &str = "2018-02-01";
const TAG_API_VERSION: &str = "2018-05-01";

/// `resourcetype eq '<a>' or resourcetype eq '<b>'`, or `None` without types.
pub fn resource_type_filter<S: AsRef<str>>(resource_types: &[S]) -> Option<String> {
    if resource_types.is_empty() {
        return None;
    }
    let clauses = resource_types
        .iter()
        .map(|t| format!("resourcetype eq '{}'", escape_filter_value(t.as_ref())))
        .collect::<Vec<_>>();
    Some(clauses.join(" or "))
}

/// `tagName eq '<name>' and tagValue eq '<value>'`
pub fn tag_filter(tag_name: &str, tag_value: &str) -> String {
    format!(
        "tagName eq '{}' and tagValue eq '{}'",
        escape_filter_value(tag_name),
        escape_filter_value(tag_value)
    )
}

impl ArmClient {
    /// Fetch one resource's metadata using the newest API version of its type.
    ///
    /// Every failure is reported as [`MonitorError::ResourceLookup`] so the
    /// caller can skip just this resource.
    pub async fn lookup_resource(
        &self,
        token: &str,
        versions: &ApiVersionMap,
        resource_id: &str,
    ) -> Result<ResourceDescriptor> {
        let lookup_error = |reason: String| MonitorError::ResourceLookup {
            resource_id: resource_id.to_string(),
            reason,
        };

        let resource_type = resource_type_of(resource_id)
            .ok_or_else(|| lookup_error("no resource type found in id".to_string()))?;
        let api_version = versions
            .lookup(&resource_type)
            .ok_or_else(|| lookup_error(format!("no api version found for type {resource_type}")))?;

        let url = format!(
            "{}{}?api-version={}",
            self.subscription_url(),
            resource_id,
            api_version
        );

        let resource: ArmResource = self
            .get_json(&url, token)
            .await
            .map_err(|e| lookup_error(e.to_string()))?;

        Ok(resource.into_descriptor(self.subscription_id()))
    }

    /// All resources of a resource group restricted to the configured types,
    /// then filtered by name.
    pub async fn list_resource_group(
        &self,
        token: &str,
        group: &ResourceGroupTarget,
    ) -> Result<Vec<ResourceDescriptor>> {
        let mut url = format!(
            "{}/resourceGroups/{}/resources?api-version={RESOURCE_GROUP_API_VERSION}",
            self.subscription_url(),
            group.resource_group
        );
        if let Some(filter) = resource_type_filter(&group.resource_types) {
            url.push_str("&$filter=");
            url.push_str(&urlencoding::encode(&filter));
        }

        let resources = self.list_pages(token, url).await.map_err(|e| {
            MonitorError::discovery(
                format!(
                    "listing resource group {} for types {:?}",
                    group.resource_group, group.resource_types
                ),
                e,
            )
        })?;

        let listed = resources.len();
        let kept: Vec<ResourceDescriptor> = resources
            .into_iter()
            .filter(|r| group.name_filter.matches(&r.name))
            .map(|r| r.into_descriptor(self.subscription_id()))
            .collect();

        tracing::debug!(
            resource_group = %group.resource_group,
            listed,
            kept = kept.len(),
            "Expanded resource group"
        );
        Ok(kept)
    }

    /// All resources of the subscription carrying the tag pair, optionally
    /// restricted to exact resource types.
    pub async fn list_by_tag(
        &self,
        token: &str,
        tag: &ResourceTagTarget,
    ) -> Result<Vec<ResourceDescriptor>> {
        let url = format!(
            "{}/resources?api-version={TAG_API_VERSION}&$filter={}",
            self.subscription_url(),
            urlencoding::encode(&tag_filter(&tag.tag_name, &tag.tag_value))
        );

        let resources = self.list_pages(token, url).await.map_err(|e| {
            MonitorError::discovery(
                format!(
                    "listing resources for tag name {}, tag value {}",
                    tag.tag_name, tag.tag_value
                ),
                e,
            )
        })?;

        let allowed: HashSet<&str> = tag.resource_types.iter().map(String::as_str).collect();
        let kept: Vec<ResourceDescriptor> = resources
            .into_iter()
            .filter(|r| allowed.is_empty() || allowed.contains(r.resource_type.as_str()))
            .map(|r| r.into_descriptor(self.subscription_id()))
            .collect();

        tracing::debug!(
            tag_name = %tag.tag_name,
            tag_value = %tag.tag_value,
            kept = kept.len(),
            "Expanded resource tag"
        );
        Ok(kept)
    }

    /// Follow `nextLink` until the listing is exhausted.
    async fn list_pages(&self, token: &str, first_url: String) -> Result<Vec<ArmResource>> {
        let mut resources = Vec::new();
        let mut next = Some(first_url);
        let mut seen = HashSet::new();

        while let Some(url) = next.take() {
            if !seen.insert(url.clone()) {
                tracing::warn!(url = %url, "Listing returned a nextLink that was already visited");
                break;
            }
            let page: ResourceListPage = self.get_json(&url, token).await?;
            resources.extend(page.value);
            next = page.next_link.filter(|link| !link.is_empty());
        }

        Ok(resources)
    }
}
