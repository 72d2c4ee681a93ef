use crate::api_version::ApiVersionMap;
use crate::batch::DEFAULT_BATCH_SIZE;
use crate::definitions::ResourceMetricDefinitions;
use crate::error::{MonitorError, Result};
use crate::query::{ResolvedQuery, TimeWindow, DEFAULT_LOOKBACK_SECS};
use crate::resource::{strip_subscription_prefix, ResourceDescriptor};
use crate::token::{ServicePrincipal, TokenProvider};
use crate::translate::{translate, Sample};
use crate::transport::ArmClient;
use crate::TargetSet;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::time::timeout;

/// Tunables of a collection cycle.
#[derive(Debug, Clone)]
pub struct CollectorSettings {
    pub batch_size: usize,
    pub query_lookback: Duration,
    pub cycle_timeout: Duration,
}

impl Default for CollectorSettings {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            query_lookback: Duration::from_secs(DEFAULT_LOOKBACK_SECS),
            cycle_timeout: Duration::from_secs(60),
        }
    }
}

/// Runs collection cycles against one subscription.
///
/// Cycles are serialized: a scrape that arrives while another cycle is in
/// flight waits for it to finish and then runs its own.
pub struct MonitorCollector {
    tokens: TokenProvider,
    client: ArmClient,
    targets: TargetSet,
    settings: CollectorSettings,
    cycle_lock: Mutex<()>,
}

impl MonitorCollector {
    /// The token audience is the client's Resource Manager URL.
    pub fn new(
        client: ArmClient,
        authority_url: &str,
        principal: ServicePrincipal,
        targets: TargetSet,
        settings: CollectorSettings,
    ) -> Self {
        let tokens = TokenProvider::new(
            client.transport().clone(),
            authority_url,
            client.resource_manager_url(),
            principal,
        );
        Self {
            tokens,
            client,
            targets,
            settings,
            cycle_lock: Mutex::new(()),
        }
    }

    pub fn token_provider(&self) -> &TokenProvider {
        &self.tokens
    }

    /// Run one full collection cycle under the configured deadline.
    ///
    /// The deadline covers waiting for a cycle already in flight.
    pub async fn collect(&self) -> Result<Vec<Sample>> {
        let deadline = self.settings.cycle_timeout;
        match timeout(deadline, self.locked_cycle()).await {
            Ok(result) => result,
            Err(_) => {
                tracing::error!(timeout = ?deadline, "Collection cycle timed out");
                Err(MonitorError::Timeout(deadline))
            }
        }
    }

    async fn locked_cycle(&self) -> Result<Vec<Sample>> {
        let _cycle = self.cycle_lock.lock().await;
        let started = Instant::now();

        let token = self.tokens.ensure_fresh_token().await?;
        let versions = self.client.resolve_api_versions(&token).await?;
        let queries = self.resolve_queries(&token, &versions).await?;

        let mut samples = Vec::new();
        self.client
            .execute_batches(&token, &queries, self.settings.batch_size, |query, response| {
                samples.extend(translate(query, &response));
            })
            .await?;

        tracing::info!(
            resources = queries.len(),
            samples = samples.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Collection cycle finished"
        );
        Ok(samples)
    }

    /// Explicit targets, then resource groups, then tags.
    async fn resolve_queries(
        &self,
        token: &str,
        versions: &ApiVersionMap,
    ) -> Result<Vec<ResolvedQuery>> {
        let lookback = chrono::Duration::from_std(self.settings.query_lookback).map_err(|e| {
            MonitorError::Config(format!(
                "query lookback {:?} out of range: {e}",
                self.settings.query_lookback
            ))
        })?;
        let window = TimeWindow::ending_at(chrono::Utc::now(), lookback);
        let mut queries = Vec::new();

        for target in &self.targets.targets {
            let resource_id = strip_subscription_prefix(&target.resource, self.client.subscription_id());
            let Some(resource) = self.lookup_or_skip(token, versions, &resource_id).await? else {
                continue;
            };
            queries.push(ResolvedQuery::new(
                resource,
                &target.metrics,
                &target.aggregations,
                &window,
            ));
        }

        for group in &self.targets.resource_groups {
            for resource in self.client.list_resource_group(token, group).await? {
                queries.push(ResolvedQuery::new(
                    resource,
                    &group.metrics,
                    &group.aggregations,
                    &window,
                ));
            }
        }

        for tag in &self.targets.resource_tags {
            for listed in self.client.list_by_tag(token, tag).await? {
                let Some(resource) = self.lookup_or_skip(token, versions, &listed.id).await? else {
                    continue;
                };
                queries.push(ResolvedQuery::new(
                    resource,
                    &tag.metrics,
                    &tag.aggregations,
                    &window,
                ));
            }
        }

        tracing::debug!(queries = queries.len(), "Resolved metric queries");
        Ok(queries)
    }

    /// `Ok(None)` when only this resource failed.
    async fn lookup_or_skip(
        &self,
        token: &str,
        versions: &ApiVersionMap,
        resource_id: &str,
    ) -> Result<Option<ResourceDescriptor>> {
        match self.client.lookup_resource(token, versions, resource_id).await {
            Ok(resource) => Ok(Some(resource)),
            Err(e) if e.is_resource_scoped() => {
                tracing::warn!(resource = %resource_id, error = %e, "Skipping resource");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Metric definitions of explicit targets and resource group members.
    pub async fn metric_definitions(&self) -> Result<Vec<ResourceMetricDefinitions>> {
        let token = self.tokens.ensure_fresh_token().await?;
        self.client.metric_definitions(&token, &self.targets).await
    }
}
