//! Scaleway client driven through the `scw` CLI.
//!
//! Servers and Block Storage volumes are listed for the whole project across
//! the configured zone (`all` by default). Scaleway tags are flat strings;
//! `key=value` tags are split so ownership lookups work the same way as on
//! the other clouds, and bare tags are kept with an empty value.

use std::collections::BTreeMap;
use std::ffi::OsString;

use serde::Deserialize;
use serde::de::DeserializeOwned;

use crate::command::CommandRunner;
use crate::credentials::ScalewayCredentials;
use crate::resource::{CloudResource, InstanceState, ResourceKind};

use super::{CloudProvider, ProviderError, ProviderFuture, parse_timestamp};

const SERVER_COMMAND: &[&str] = &["instance", "server"];
const VOLUME_COMMAND: &[&str] = &["block", "volume"];

/// Scaleway client for one project.
#[derive(Clone, Debug)]
pub struct ScalewayProvider<R: CommandRunner> {
    label: String,
    project_id: String,
    zone: String,
    scw_bin: String,
    envs: Vec<(String, String)>,
    runner: R,
}

impl<R: CommandRunner> ScalewayProvider<R> {
    /// Creates a client bound to the project described by `credentials`.
    #[must_use]
    pub fn new(
        label: impl Into<String>,
        credentials: &ScalewayCredentials,
        scw_bin: impl Into<String>,
        runner: R,
    ) -> Self {
        let mut envs = vec![
            (
                String::from("SCW_SECRET_KEY"),
                credentials.secret_key.clone(),
            ),
            (
                String::from("SCW_DEFAULT_PROJECT_ID"),
                credentials.project_id.clone(),
            ),
        ];
        if let Some(access_key) = &credentials.access_key {
            envs.push((String::from("SCW_ACCESS_KEY"), access_key.clone()));
        }
        Self {
            label: label.into(),
            project_id: credentials.project_id.clone(),
            zone: credentials.zone.clone(),
            scw_bin: scw_bin.into(),
            envs,
            runner,
        }
    }

    /// Builds argument vector for scw list commands.
    fn build_list_args(&self, subcommand_path: &[&str]) -> Vec<OsString> {
        let mut args = subcommand_path
            .iter()
            .map(OsString::from)
            .collect::<Vec<_>>();
        args.push(OsString::from("list"));
        args.push(OsString::from(format!("project-id={}", self.project_id)));
        args.push(OsString::from(format!("zone={}", self.zone)));
        args.push(OsString::from("-o"));
        args.push(OsString::from("json"));
        args
    }

    async fn run_scw(&self, args: &[OsString], resource: &str) -> Result<String, ProviderError> {
        let output = self.runner.run(&self.scw_bin, args, &self.envs).await?;
        if output.is_success() {
            return Ok(output.stdout);
        }
        Err(ProviderError::from_output(&self.scw_bin, resource, &output))
    }

    async fn list_scw_resources<T: DeserializeOwned>(
        &self,
        subcommand_path: &[&str],
        resource_name: &str,
    ) -> Result<Vec<T>, ProviderError> {
        let args = self.build_list_args(subcommand_path);
        let stdout = self.run_scw(&args, resource_name).await?;
        parse_listing(&stdout, resource_name)
    }

    fn to_resource(&self, item: ScwResource, kind: ResourceKind) -> CloudResource {
        let mut resource = CloudResource::new(item.id, kind, &self.label).with_region(item.zone);
        resource.name = item.name;
        resource.tags = split_tags(item.tags);
        resource.state = match kind {
            ResourceKind::Instance => item.state.as_deref().map(map_state),
            ResourceKind::Volume => None,
        };
        resource.creation_time = item
            .creation_date
            .or(item.created_at)
            .as_deref()
            .and_then(|raw| parse_timestamp(&self.label, &resource.id, raw));
        resource
    }

    fn list_kind(&self, kind: ResourceKind) -> ProviderFuture<'_, Vec<CloudResource>> {
        Box::pin(async move {
            let (path, name) = match kind {
                ResourceKind::Instance => (SERVER_COMMAND, "servers"),
                ResourceKind::Volume => (VOLUME_COMMAND, "volumes"),
            };
            let items = self.list_scw_resources::<ScwResource>(path, name).await?;
            Ok(items
                .into_iter()
                .map(|item| self.to_resource(item, kind))
                .collect())
        })
    }
}

impl<R: CommandRunner> CloudProvider for ScalewayProvider<R> {
    fn label(&self) -> &str {
        &self.label
    }

    fn list_volumes(&self) -> ProviderFuture<'_, Vec<CloudResource>> {
        self.list_kind(ResourceKind::Volume)
    }

    fn list_nodes(&self) -> ProviderFuture<'_, Vec<CloudResource>> {
        self.list_kind(ResourceKind::Instance)
    }

    fn destroy<'a>(&'a self, resource: &'a CloudResource) -> ProviderFuture<'a, ()> {
        Box::pin(async move {
            let zone = resource.region.as_deref().unwrap_or(self.zone.as_str());
            let args = match resource.kind {
                ResourceKind::Instance => vec![
                    OsString::from("instance"),
                    OsString::from("server"),
                    OsString::from("delete"),
                    OsString::from(&resource.id),
                    OsString::from(format!("zone={zone}")),
                    OsString::from("with-ip=true"),
                    OsString::from("with-volumes=none"),
                    OsString::from("force-shutdown=true"),
                ],
                ResourceKind::Volume => vec![
                    OsString::from("block"),
                    OsString::from("volume"),
                    OsString::from("delete"),
                    OsString::from(&resource.id),
                    OsString::from(format!("zone={zone}")),
                ],
            };
            self.run_scw(&args, &format!("{} delete", resource.kind))
                .await
                .map(|_| ())
        })
    }
}

/// Accepts both a bare JSON array and the `{"<resource>": [...]}` envelope
/// returned by newer `scw` releases.
fn parse_listing<T: DeserializeOwned>(
    stdout: &str,
    resource: &str,
) -> Result<Vec<T>, ProviderError> {
    let value: serde_json::Value =
        serde_json::from_str(stdout).map_err(|err| ProviderError::parse(resource, err))?;
    let items = match value {
        serde_json::Value::Array(items) => serde_json::Value::Array(items),
        serde_json::Value::Object(mut fields) => fields.remove(resource).ok_or_else(|| {
            ProviderError::parse(resource, format!("missing '{resource}' field"))
        })?,
        _ => return Err(ProviderError::parse(resource, "unexpected JSON shape")),
    };
    serde_json::from_value(items).map_err(|err| ProviderError::parse(resource, err))
}

fn split_tags(tags: Vec<String>) -> BTreeMap<String, String> {
    tags.into_iter()
        .map(|tag| {
            let (key, value) = tag.split_once('=').unwrap_or((tag.as_str(), ""));
            (key.to_owned(), value.to_owned())
        })
        .collect()
}

fn map_state(raw: &str) -> InstanceState {
    match raw {
        "running" => InstanceState::Running,
        "starting" => InstanceState::Pending,
        "stopping" => InstanceState::Stopping,
        "stopped" | "stopped in place" => InstanceState::Stopped,
        other => InstanceState::Unknown(other.to_owned()),
    }
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
struct ScwResource {
    id: String,
    zone: String,
    name: Option<String>,
    state: Option<String>,
    creation_date: Option<String>,
    created_at: Option<String>,
    #[serde(default)]
    tags: Vec<String>,
}
