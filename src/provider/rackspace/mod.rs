//! Rackspace (OpenStack Nova and Cinder) client using the REST API.
//!
//! Authentication uses Keystone v2.0 API-key credentials once per client; the
//! token and the regional compute/volume endpoints from the service catalogue
//! are cached for the rest of the run.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use reqwest::Client;
use reqwest::header::ACCEPT;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use tokio::sync::OnceCell;
use tracing::debug;

use crate::credentials::RackspaceCredentials;
use crate::resource::{CloudResource, InstanceState, ResourceKind};

use super::{CloudProvider, ProviderError, ProviderFuture, parse_timestamp};

const AUTH_TOKEN_HEADER: &str = "X-Auth-Token";
const COMPUTE_SERVICE: &str = "compute";
const VOLUME_SERVICE: &str = "volume";

/// Rackspace client for one account and region.
pub struct RackspaceProvider {
    label: String,
    credentials: RackspaceCredentials,
    client: Client,
    session: OnceCell<Session>,
}

#[derive(Clone, Debug, Eq, PartialEq)]
struct Session {
    token: String,
    compute_url: String,
    volume_url: String,
}

impl RackspaceProvider {
    /// Creates a client bound to the account described by `credentials`.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::Http`] when the HTTP client cannot be built.
    pub fn new(
        label: impl Into<String>,
        credentials: RackspaceCredentials,
        request_timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|err| http_error("client setup", &err))?;
        Ok(Self {
            label: label.into(),
            credentials,
            client,
            session: OnceCell::new(),
        })
    }

    async fn session(&self) -> Result<&Session, ProviderError> {
        self.session.get_or_try_init(|| self.authenticate()).await
    }

    async fn authenticate(&self) -> Result<Session, ProviderError> {
        debug!(
            event = "janitor.rackspace.authenticating",
            provider = %self.label,
            auth_url = %self.credentials.auth_url
        );
        let body = json!({
            "auth": {
                "RAX-KSKEY:apiKeyCredentials": {
                    "username": self.credentials.username,
                    "apiKey": self.credentials.key,
                }
            }
        });
        let response = self
            .client
            .post(&self.credentials.auth_url)
            .header(ACCEPT, "application/json")
            .json(&body)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|err| http_error("authentication", &err))?;
        let auth: AuthResponse = response
            .json()
            .await
            .map_err(|err| ProviderError::parse("authentication", err))?;
        session_from_auth(auth, &self.credentials.region)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: String,
        operation: &str,
    ) -> Result<T, ProviderError> {
        let session = self.session().await?;
        let response = self
            .client
            .get(url)
            .header(AUTH_TOKEN_HEADER, &session.token)
            .header(ACCEPT, "application/json")
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|err| http_error(operation, &err))?;
        response
            .json()
            .await
            .map_err(|err| ProviderError::parse(operation, err))
    }

    /// Follows `rel=next` links until the listing is exhausted.
    async fn list_all<P: Paged>(
        &self,
        first_page: String,
        operation: &str,
    ) -> Result<Vec<OpenStackResource>, ProviderError> {
        let mut items = Vec::new();
        let mut visited = BTreeSet::new();
        let mut next = Some(first_page);
        while let Some(url) = next {
            if !visited.insert(url.clone()) {
                return Err(ProviderError::parse(
                    operation,
                    format!("pagination loops back to {url}"),
                ));
            }
            let page: P = self.get_json(url, operation).await?;
            let (page_items, next_page) = page.into_page();
            debug!(
                event = "janitor.rackspace.page_listed",
                provider = %self.label,
                operation,
                items = page_items.len(),
                more = next_page.is_some()
            );
            items.extend(page_items);
            next = next_page;
        }
        Ok(items)
    }

    fn to_resource(&self, kind: ResourceKind, item: OpenStackResource) -> CloudResource {
        let mut resource = CloudResource::new(item.id, kind, &self.label)
            .with_region(&self.credentials.region);
        resource.name = item.name.or(item.display_name);
        resource.metadata = item.metadata;
        resource.state = match kind {
            ResourceKind::Instance => item.status.as_deref().map(map_status),
            ResourceKind::Volume => None,
        };
        resource.creation_time = item
            .created
            .or(item.created_at)
            .as_deref()
            .and_then(|raw| parse_timestamp(&self.label, &resource.id, raw));
        resource
    }
}

impl CloudProvider for RackspaceProvider {
    fn label(&self) -> &str {
        &self.label
    }

    fn list_volumes(&self) -> ProviderFuture<'_, Vec<CloudResource>> {
        Box::pin(async move {
            let session = self.session().await?;
            let url = format!("{}/volumes/detail", session.volume_url);
            let volumes = self.list_all::<VolumeListing>(url, "volumes").await?;
            Ok(volumes
                .into_iter()
                .map(|item| self.to_resource(ResourceKind::Volume, item))
                .collect())
        })
    }

    fn list_nodes(&self) -> ProviderFuture<'_, Vec<CloudResource>> {
        Box::pin(async move {
            let session = self.session().await?;
            let url = format!("{}/servers/detail", session.compute_url);
            let servers = self.list_all::<ServerListing>(url, "servers").await?;
            Ok(servers
                .into_iter()
                .map(|item| self.to_resource(ResourceKind::Instance, item))
                .collect())
        })
    }

    fn destroy<'a>(&'a self, resource: &'a CloudResource) -> ProviderFuture<'a, ()> {
        Box::pin(async move {
            let session = self.session().await?;
            let url = match resource.kind {
                ResourceKind::Instance => format!("{}/servers/{}", session.compute_url, resource.id),
                ResourceKind::Volume => format!("{}/volumes/{}", session.volume_url, resource.id),
            };
            self.client
                .delete(url)
                .header(AUTH_TOKEN_HEADER, &session.token)
                .send()
                .await
                .and_then(reqwest::Response::error_for_status)
                .map_err(|err| http_error(&format!("{} delete", resource.kind), &err))?;
            Ok(())
        })
    }
}

fn http_error(operation: &str, err: &reqwest::Error) -> ProviderError {
    ProviderError::Http {
        operation: operation.to_owned(),
        message: err.to_string(),
    }
}

fn session_from_auth(auth: AuthResponse, region: &str) -> Result<Session, ProviderError> {
    let catalog = &auth.access.service_catalog;
    Ok(Session {
        compute_url: select_endpoint(catalog, COMPUTE_SERVICE, region)?,
        volume_url: select_endpoint(catalog, VOLUME_SERVICE, region)?,
        token: auth.access.token.id,
    })
}

fn select_endpoint(
    catalog: &[CatalogEntry],
    service: &str,
    region: &str,
) -> Result<String, ProviderError> {
    catalog
        .iter()
        .filter(|entry| entry.service_type == service)
        .flat_map(|entry| entry.endpoints.iter())
        .find(|endpoint| {
            endpoint
                .region
                .as_deref()
                .is_some_and(|candidate| candidate.eq_ignore_ascii_case(region))
        })
        .map(|endpoint| endpoint.public_url.trim_end_matches('/').to_owned())
        .ok_or_else(|| ProviderError::MissingEndpoint {
            service: service.to_owned(),
            region: region.to_owned(),
        })
}

fn map_status(raw: &str) -> InstanceState {
    match raw {
        "ACTIVE" | "VERIFY_RESIZE" => InstanceState::Running,
        "BUILD" | "REBUILD" | "QUEUE_RESIZE" | "PREP_RESIZE" | "PASSWORD" | "RESCUE"
        | "SHARE_IP" | "SHARE_IP_NO_CONFIG" | "DELETE_IP" => InstanceState::Pending,
        "SHUTOFF" | "STOPPED" | "SUSPENDED" => InstanceState::Stopped,
        "DELETED" | "SOFT_DELETED" => InstanceState::Terminated,
        other => InstanceState::Unknown(other.to_owned()),
    }
}

#[derive(Debug, Deserialize)]
struct AuthResponse {
    access: Access,
}

#[derive(Debug, Deserialize)]
struct Access {
    token: Token,
    #[serde(rename = "serviceCatalog", default)]
    service_catalog: Vec<CatalogEntry>,
}

#[derive(Debug, Deserialize)]
struct Token {
    id: String,
}

#[derive(Debug, Deserialize)]
struct CatalogEntry {
    #[serde(rename = "type")]
    service_type: String,
    #[serde(default)]
    endpoints: Vec<Endpoint>,
}

#[derive(Debug, Deserialize)]
struct Endpoint {
    region: Option<String>,
    #[serde(rename = "publicURL")]
    public_url: String,
}

/// One page of a Nova or Cinder detail listing.
trait Paged: DeserializeOwned {
    /// Splits the page into its items and the `next` link, if any.
    fn into_page(self) -> (Vec<OpenStackResource>, Option<String>);
}

#[derive(Debug, Deserialize)]
struct Link {
    rel: String,
    href: String,
}

fn next_link(links: Vec<Link>) -> Option<String> {
    links
        .into_iter()
        .find(|link| link.rel == "next")
        .map(|link| link.href)
}

#[derive(Debug, Deserialize)]
struct ServerListing {
    #[serde(default)]
    servers: Vec<OpenStackResource>,
    #[serde(default)]
    servers_links: Vec<Link>,
}

impl Paged for ServerListing {
    fn into_page(self) -> (Vec<OpenStackResource>, Option<String>) {
        (self.servers, next_link(self.servers_links))
    }
}

#[derive(Debug, Deserialize)]
struct VolumeListing {
    #[serde(default)]
    volumes: Vec<OpenStackResource>,
    #[serde(default)]
    volumes_links: Vec<Link>,
}

impl Paged for VolumeListing {
    fn into_page(self) -> (Vec<OpenStackResource>, Option<String>) {
        (self.volumes, next_link(self.volumes_links))
    }
}

/// Fields shared by Nova servers and Cinder volumes.
#[derive(Debug, Deserialize)]
struct OpenStackResource {
    id: String,
    name: Option<String>,
    display_name: Option<String>,
    status: Option<String>,
    created: Option<String>,
    created_at: Option<String>,
    #[serde(default)]
    metadata: BTreeMap<String, String>,
}

#[cfg(test)]
mod tests;
