//! Cloud provider client abstraction.
//!
//! Every supported cloud implements [`CloudProvider`], the minimal
//! read/destroy surface the janitor needs: enumerate volumes, enumerate
//! instances, destroy one resource. Implementations normalise their provider
//! specific payloads into [`CloudResource`] snapshots.

mod aws;
mod error;
mod rackspace;
mod registry;
mod scaleway;

use std::future::Future;
use std::pin::Pin;

use chrono::{DateTime, NaiveDateTime, Utc};
use tracing::warn;

use crate::resource::CloudResource;

pub use aws::AwsProvider;
pub use error::ProviderError;
pub use rackspace::RackspaceProvider;
pub use registry::ProviderRegistry;
pub use scaleway::ScalewayProvider;

/// Future returned by provider operations.
pub type ProviderFuture<'a, T> =
    Pin<Box<dyn Future<Output = Result<T, ProviderError>> + Send + 'a>>;

/// Minimal interface implemented by cloud provider clients.
pub trait CloudProvider: Send + Sync {
    /// Label identifying the account and region this client is bound to.
    fn label(&self) -> &str;

    /// Lists every storage volume visible to the account.
    fn list_volumes(&self) -> ProviderFuture<'_, Vec<CloudResource>>;

    /// Lists every compute instance visible to the account.
    fn list_nodes(&self) -> ProviderFuture<'_, Vec<CloudResource>>;

    /// Destroys a resource previously returned by one of the list calls.
    fn destroy<'a>(&'a self, resource: &'a CloudResource) -> ProviderFuture<'a, ()>;
}

/// Parses a provider timestamp.
///
/// RFC 3339 values are used as-is. Values without an offset (Rackspace block
/// storage) are UTC. Anything else is logged and treated as unknown.
pub(crate) fn parse_timestamp(
    provider: &str,
    resource_id: &str,
    raw: &str,
) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(naive.and_utc());
    }
    warn!(
        event = "janitor.provider.timestamp_unparseable",
        provider,
        resource_id,
        raw
    );
    None
}
