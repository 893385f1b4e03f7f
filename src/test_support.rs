//! Test support utilities shared across unit tests.

use std::collections::{BTreeSet, VecDeque};
use std::ffi::OsString;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};

use crate::command::{CommandFuture, CommandOutput, CommandRunner, SpawnError};
use crate::provider::{CloudProvider, ProviderError, ProviderFuture};
use crate::resource::{CloudResource, InstanceState, ResourceKind};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Scripted command runner that returns pre-seeded outputs in FIFO order.
///
/// Used to drive deterministic command outcomes without spawning processes.
/// An empty queue behaves like a binary that cannot be spawned.
#[derive(Clone, Debug, Default)]
pub struct ScriptedRunner {
    responses: Arc<Mutex<VecDeque<CommandOutput>>>,
    invocations: Arc<Mutex<Vec<CommandInvocation>>>,
}

/// Records a single invocation made through [`ScriptedRunner`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CommandInvocation {
    /// Program name as passed to the runner.
    pub program: String,
    /// Arguments passed to the program.
    pub args: Vec<OsString>,
    /// Extra environment passed to the program.
    pub envs: Vec<(String, String)>,
}

impl CommandInvocation {
    /// Returns a shell-like command string for assertions. Environment
    /// variables are left out so credentials never show up in assertions.
    #[must_use]
    pub fn command_string(&self) -> String {
        let mut parts = Vec::with_capacity(self.args.len() + 1);
        parts.push(self.program.clone());
        parts.extend(
            self.args
                .iter()
                .map(|arg| arg.to_string_lossy().into_owned()),
        );
        parts.join(" ")
    }
}

impl ScriptedRunner {
    /// Creates a new runner with no queued responses.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of all invocations recorded so far.
    #[must_use]
    pub fn invocations(&self) -> Vec<CommandInvocation> {
        lock(&self.invocations).clone()
    }

    /// Pushes a successful exit status with empty output.
    pub fn push_success(&self) {
        self.push_output(Some(0), "", "");
    }

    /// Pushes a failing exit code with stderr text.
    pub fn push_failure(&self, code: i32) {
        self.push_output(Some(code), "", "simulated failure");
    }

    /// Pushes an explicit command output response.
    pub fn push_output(
        &self,
        code: Option<i32>,
        stdout: impl Into<String>,
        stderr: impl Into<String>,
    ) {
        lock(&self.responses).push_back(CommandOutput {
            code,
            stdout: stdout.into(),
            stderr: stderr.into(),
        });
    }
}

impl CommandRunner for ScriptedRunner {
    fn run<'a>(
        &'a self,
        program: &'a str,
        args: &'a [OsString],
        envs: &'a [(String, String)],
    ) -> CommandFuture<'a> {
        lock(&self.invocations).push(CommandInvocation {
            program: program.to_owned(),
            args: args.to_vec(),
            envs: envs.to_vec(),
        });
        let response = lock(&self.responses).pop_front();
        Box::pin(async move {
            response.ok_or_else(|| SpawnError {
                program: program.to_owned(),
                message: String::from("no scripted response available"),
            })
        })
    }
}

/// In-memory [`CloudProvider`] with injectable failures and latency.
#[derive(Clone, Debug)]
pub struct FakeProvider {
    label: String,
    volumes: Vec<CloudResource>,
    nodes: Vec<CloudResource>,
    listing_error: Option<ProviderError>,
    failing_ids: BTreeSet<String>,
    delay: Option<Duration>,
    destroyed: Arc<Mutex<Vec<String>>>,
    list_calls: Arc<Mutex<usize>>,
}

impl FakeProvider {
    /// Creates a provider with nothing to list.
    #[must_use]
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            volumes: Vec::new(),
            nodes: Vec::new(),
            listing_error: None,
            failing_ids: BTreeSet::new(),
            delay: None,
            destroyed: Arc::new(Mutex::new(Vec::new())),
            list_calls: Arc::new(Mutex::new(0)),
        }
    }

    /// Adds a resource to the matching listing, stamping this provider's
    /// label onto it.
    #[must_use]
    pub fn with_resource(mut self, mut resource: CloudResource) -> Self {
        resource.provider.clone_from(&self.label);
        match resource.kind {
            ResourceKind::Volume => self.volumes.push(resource),
            ResourceKind::Instance => self.nodes.push(resource),
        }
        self
    }

    /// Makes every listing call fail with `error`.
    #[must_use]
    pub fn failing_listings(mut self, error: ProviderError) -> Self {
        self.listing_error = Some(error);
        self
    }

    /// Makes destroying the resource with `id` fail.
    #[must_use]
    pub fn failing_destroy(mut self, id: impl Into<String>) -> Self {
        self.failing_ids.insert(id.into());
        self
    }

    /// Delays every call by `delay`.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Identifiers passed to `destroy`, in call order.
    #[must_use]
    pub fn destroyed(&self) -> Vec<String> {
        lock(&self.destroyed).clone()
    }

    /// Number of listing calls served so far.
    #[must_use]
    pub fn list_calls(&self) -> usize {
        *lock(&self.list_calls)
    }

    async fn pause(&self) {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
    }

    fn listing(&self, resources: &[CloudResource]) -> ProviderFuture<'_, Vec<CloudResource>> {
        *lock(&self.list_calls) += 1;
        let result = self
            .listing_error
            .clone()
            .map_or_else(|| Ok(resources.to_vec()), Err);
        Box::pin(async move {
            self.pause().await;
            result
        })
    }
}

impl CloudProvider for FakeProvider {
    fn label(&self) -> &str {
        &self.label
    }

    fn list_volumes(&self) -> ProviderFuture<'_, Vec<CloudResource>> {
        self.listing(&self.volumes)
    }

    fn list_nodes(&self) -> ProviderFuture<'_, Vec<CloudResource>> {
        self.listing(&self.nodes)
    }

    fn destroy<'a>(&'a self, resource: &'a CloudResource) -> ProviderFuture<'a, ()> {
        Box::pin(async move {
            self.pause().await;
            lock(&self.destroyed).push(resource.id.clone());
            if self.failing_ids.contains(&resource.id) {
                return Err(ProviderError::CommandFailure {
                    program: String::from("fake"),
                    status: Some(1),
                    status_text: String::from("1"),
                    stderr: format!("refusing to destroy {}", resource.id),
                });
            }
            Ok(())
        })
    }
}

/// Builds a volume tagged with `cluster_id` under `flocker-cluster-id`,
/// created `age` before `now`.
#[must_use]
pub fn tagged_volume(
    id: &str,
    cluster_id: &str,
    now: DateTime<Utc>,
    age: TimeDelta,
) -> CloudResource {
    CloudResource::new(id, ResourceKind::Volume, "fake")
        .with_tag("flocker-cluster-id", cluster_id)
        .with_creation_time(now - age)
}

/// Builds an instance named `name` in `state`, created `age` before `now`.
#[must_use]
pub fn named_instance(
    id: &str,
    name: &str,
    state: InstanceState,
    now: DateTime<Utc>,
    age: TimeDelta,
) -> CloudResource {
    CloudResource::new(id, ResourceKind::Instance, "fake")
        .with_name(name)
        .with_state(state)
        .with_creation_time(now - age)
}

/// Returns a hyphenated UUID whose node field is `node`.
#[must_use]
pub fn cluster_uuid(node: u64) -> String {
    format!("8d6c9d1e-1f2a-11e6-8f3b-{node:012x}")
}

/// Fixed reference time used by scenario tests.
#[must_use]
pub fn reference_now() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2016-03-01T12:00:00Z")
        .map(|parsed| parsed.with_timezone(&Utc))
        .unwrap_or_default()
}

fn json_tagged_resources(items: &[(&str, &str, &[&str])], state: Option<&str>) -> String {
    items
        .iter()
        .map(|(id, zone, tags)| {
            let tags_json = tags
                .iter()
                .map(|tag| format!("\"{tag}\""))
                .collect::<Vec<_>>()
                .join(",");
            let state_json = state.map_or_else(String::new, |value| format!(",\"state\":\"{value}\""));
            format!(
                "{{\"id\":\"{id}\",\"name\":\"{id}\",\"zone\":\"{zone}\",\"tags\":[{tags_json}]{state_json}}}"
            )
        })
        .collect::<Vec<_>>()
        .join(",")
}

/// Produces a minimal JSON payload matching `scw instance server list -o json`.
/// Every server is named after its id and reported as running.
#[must_use]
pub fn json_servers(servers: &[(&str, &str, &[&str])]) -> String {
    let items = json_tagged_resources(servers, Some("running"));
    format!(
        "{{\"servers\":[{items}],\"total_count\":{}}}",
        servers.len()
    )
}

/// Produces a minimal JSON payload matching `scw block volume list -o json`.
#[must_use]
pub fn json_volumes(volumes: &[(&str, &str, &[&str])]) -> String {
    let items = json_tagged_resources(volumes, None);
    format!(
        "{{\"volumes\":[{items}],\"total_count\":{}}}",
        volumes.len()
    )
}

fn aws_tags(tags: &[(&str, &str)]) -> serde_json::Value {
    tags.iter()
        .map(|(key, value)| serde_json::json!({ "Key": key, "Value": value }))
        .collect()
}

/// Produces a payload matching `aws ec2 describe-volumes --output json`.
#[must_use]
pub fn aws_volumes_json(volumes: &[(&str, Option<&str>, &[(&str, &str)])]) -> String {
    let items = volumes
        .iter()
        .map(|(id, create_time, tags)| {
            serde_json::json!({
                "VolumeId": id,
                "CreateTime": create_time,
                "State": "available",
                "Tags": aws_tags(tags),
            })
        })
        .collect::<Vec<_>>();
    serde_json::json!({ "Volumes": items }).to_string()
}

/// Produces a payload matching `aws ec2 describe-instances --output json`,
/// with one reservation per instance.
#[must_use]
pub fn aws_instances_json(instances: &[(&str, &str, &str, Option<&str>)]) -> String {
    let reservations = instances
        .iter()
        .map(|(id, name, state, launch_time)| {
            serde_json::json!({
                "Instances": [{
                    "InstanceId": id,
                    "LaunchTime": launch_time,
                    "State": { "Name": state },
                    "Tags": aws_tags(&[("Name", *name)]),
                }]
            })
        })
        .collect::<Vec<_>>();
    serde_json::json!({ "Reservations": reservations }).to_string()
}
