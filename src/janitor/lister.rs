//! Enumerates resources of one kind across every registered provider.

use std::sync::Arc;
use std::time::Duration;

use futures::future::try_join_all;
use tracing::{error, info};

use crate::provider::{CloudProvider, ProviderError, ProviderRegistry};
use crate::resource::{CloudResource, ResourceKind};

/// A listed resource together with the client that can destroy it.
#[derive(Clone)]
pub struct TrackedResource {
    /// Client that listed the resource.
    pub provider: Arc<dyn CloudProvider>,
    /// Snapshot returned by the listing.
    pub resource: CloudResource,
}

impl TrackedResource {
    /// Pairs `resource` with its owning client.
    #[must_use]
    pub const fn new(provider: Arc<dyn CloudProvider>, resource: CloudResource) -> Self {
        Self { provider, resource }
    }
}

impl std::fmt::Debug for TrackedResource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrackedResource")
            .field("provider", &self.provider.label())
            .field("resource", &self.resource)
            .finish()
    }
}

/// Lists one resource kind across all providers.
///
/// Providers are queried concurrently and the results are concatenated in
/// registry order. The first failure aborts the whole listing.
#[derive(Clone)]
pub struct ResourceLister {
    registry: ProviderRegistry,
    timeout: Duration,
}

impl ResourceLister {
    /// Creates a lister bounding each provider call by `timeout`.
    #[must_use]
    pub const fn new(registry: ProviderRegistry, timeout: Duration) -> Self {
        Self { registry, timeout }
    }

    /// Lists every resource of `kind`.
    ///
    /// # Errors
    ///
    /// Returns the first [`ProviderError`] raised by any provider, including
    /// [`ProviderError::Timeout`] when a call exceeds the configured bound.
    pub async fn list(&self, kind: ResourceKind) -> Result<Vec<TrackedResource>, ProviderError> {
        let listings = self
            .registry
            .providers()
            .iter()
            .map(|provider| self.list_one(Arc::clone(provider), kind));
        let per_provider = try_join_all(listings).await?;
        let resources = per_provider.into_iter().flatten().collect::<Vec<_>>();
        info!(
            event = "janitor.lister.listed",
            kind = %kind,
            count = resources.len()
        );
        Ok(resources)
    }

    async fn list_one(
        &self,
        provider: Arc<dyn CloudProvider>,
        kind: ResourceKind,
    ) -> Result<Vec<TrackedResource>, ProviderError> {
        let call = match kind {
            ResourceKind::Volume => provider.list_volumes(),
            ResourceKind::Instance => provider.list_nodes(),
        };
        let outcome = tokio::time::timeout(self.timeout, call)
            .await
            .unwrap_or_else(|_| {
                Err(ProviderError::Timeout {
                    provider: provider.label().to_owned(),
                    operation: format!("list {kind}"),
                    seconds: self.timeout.as_secs(),
                })
            });
        let resources = outcome.inspect_err(|err| {
            error!(
                event = "janitor.lister.failed",
                provider = provider.label(),
                kind = %kind,
                error = %err
            );
        })?;
        Ok(resources
            .into_iter()
            .map(|resource| TrackedResource::new(Arc::clone(&provider), resource))
            .collect())
    }
}
