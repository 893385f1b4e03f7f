//! AWS EC2 client driven through the `aws` CLI.

use std::ffi::OsString;

use serde::Deserialize;
use serde::de::DeserializeOwned;

use crate::command::CommandRunner;
use crate::credentials::AwsCredentials;
use crate::resource::{CloudResource, InstanceState, ResourceKind};

use super::{CloudProvider, ProviderError, ProviderFuture, parse_timestamp};

const NAME_TAG: &str = "Name";

/// EC2 client for one account and region.
#[derive(Clone, Debug)]
pub struct AwsProvider<R: CommandRunner> {
    label: String,
    region: String,
    aws_bin: String,
    envs: Vec<(String, String)>,
    runner: R,
}

impl<R: CommandRunner> AwsProvider<R> {
    /// Creates a client bound to the account described by `credentials`.
    #[must_use]
    pub fn new(
        label: impl Into<String>,
        credentials: &AwsCredentials,
        aws_bin: impl Into<String>,
        runner: R,
    ) -> Self {
        Self {
            label: label.into(),
            region: credentials.region.clone(),
            aws_bin: aws_bin.into(),
            envs: vec![
                (
                    String::from("AWS_ACCESS_KEY_ID"),
                    credentials.access_key.clone(),
                ),
                (
                    String::from("AWS_SECRET_ACCESS_KEY"),
                    credentials.secret_access_token.clone(),
                ),
            ],
            runner,
        }
    }

    fn ec2_args(&self, subcommand: &str, extra: &[&str]) -> Vec<OsString> {
        let mut args = vec![
            OsString::from("ec2"),
            OsString::from(subcommand),
            OsString::from("--region"),
            OsString::from(&self.region),
            OsString::from("--output"),
            OsString::from("json"),
        ];
        args.extend(extra.iter().map(OsString::from));
        args
    }

    async fn run_ec2(&self, args: &[OsString], resource: &str) -> Result<String, ProviderError> {
        let output = self.runner.run(&self.aws_bin, args, &self.envs).await?;
        if output.is_success() {
            return Ok(output.stdout);
        }
        Err(ProviderError::from_output(&self.aws_bin, resource, &output))
    }

    async fn describe<T: DeserializeOwned>(
        &self,
        subcommand: &str,
        resource: &str,
    ) -> Result<T, ProviderError> {
        let args = self.ec2_args(subcommand, &[]);
        let stdout = self.run_ec2(&args, resource).await?;
        serde_json::from_str(&stdout).map_err(|err| ProviderError::parse(resource, err))
    }

    fn volume_resource(&self, volume: Ec2Volume) -> CloudResource {
        let mut resource = CloudResource::new(volume.volume_id, ResourceKind::Volume, &self.label)
            .with_region(&self.region);
        resource.tags = tag_map(volume.tags);
        resource.name = resource.tags.get(NAME_TAG).cloned();
        resource.creation_time = volume
            .create_time
            .as_deref()
            .and_then(|raw| parse_timestamp(&self.label, &resource.id, raw));
        resource
    }

    fn instance_resource(&self, instance: Ec2Instance) -> CloudResource {
        let mut resource =
            CloudResource::new(instance.instance_id, ResourceKind::Instance, &self.label)
                .with_region(&self.region);
        resource.tags = tag_map(instance.tags);
        resource.name = resource.tags.get(NAME_TAG).cloned();
        resource.state = instance.state.map(|state| map_state(&state.name));
        resource.creation_time = instance
            .launch_time
            .as_deref()
            .and_then(|raw| parse_timestamp(&self.label, &resource.id, raw));
        resource
    }
}

impl<R: CommandRunner> CloudProvider for AwsProvider<R> {
    fn label(&self) -> &str {
        &self.label
    }

    fn list_volumes(&self) -> ProviderFuture<'_, Vec<CloudResource>> {
        Box::pin(async move {
            let listing: DescribeVolumes = self.describe("describe-volumes", "volumes").await?;
            Ok(listing
                .volumes
                .into_iter()
                .map(|volume| self.volume_resource(volume))
                .collect())
        })
    }

    fn list_nodes(&self) -> ProviderFuture<'_, Vec<CloudResource>> {
        Box::pin(async move {
            let listing: DescribeInstances =
                self.describe("describe-instances", "instances").await?;
            Ok(listing
                .reservations
                .into_iter()
                .flat_map(|reservation| reservation.instances)
                .map(|instance| self.instance_resource(instance))
                .collect())
        })
    }

    fn destroy<'a>(&'a self, resource: &'a CloudResource) -> ProviderFuture<'a, ()> {
        Box::pin(async move {
            let args = match resource.kind {
                ResourceKind::Volume => {
                    self.ec2_args("delete-volume", &["--volume-id", resource.id.as_str()])
                }
                ResourceKind::Instance => self.ec2_args(
                    "terminate-instances",
                    &["--instance-ids", resource.id.as_str()],
                ),
            };
            self.run_ec2(&args, &format!("{} delete", resource.kind))
                .await
                .map(|_| ())
        })
    }
}

fn map_state(raw: &str) -> InstanceState {
    match raw {
        "running" => InstanceState::Running,
        "pending" => InstanceState::Pending,
        "stopping" | "shutting-down" => InstanceState::Stopping,
        "stopped" => InstanceState::Stopped,
        "terminated" => InstanceState::Terminated,
        other => InstanceState::Unknown(other.to_owned()),
    }
}

fn tag_map(tags: Vec<Ec2Tag>) -> std::collections::BTreeMap<String, String> {
    tags.into_iter().map(|tag| (tag.key, tag.value)).collect()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DescribeVolumes {
    #[serde(default)]
    volumes: Vec<Ec2Volume>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Ec2Volume {
    volume_id: String,
    create_time: Option<String>,
    #[serde(default)]
    tags: Vec<Ec2Tag>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DescribeInstances {
    #[serde(default)]
    reservations: Vec<Ec2Reservation>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Ec2Reservation {
    #[serde(default)]
    instances: Vec<Ec2Instance>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Ec2Instance {
    instance_id: String,
    launch_time: Option<String>,
    state: Option<Ec2State>,
    #[serde(default)]
    tags: Vec<Ec2Tag>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Ec2State {
    name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Ec2Tag {
    key: String,
    value: String,
}
