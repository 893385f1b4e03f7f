//! Normalised view of the cloud resources a provider client enumerates.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};

/// Kind of cloud resource the janitor sweeps.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum ResourceKind {
    /// Compute instance (server, node).
    Instance,
    /// Block storage volume.
    Volume,
}

impl ResourceKind {
    /// Plural label used in reports and log events.
    #[must_use]
    pub const fn plural(self) -> &'static str {
        match self {
            Self::Instance => "instances",
            Self::Volume => "volumes",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.plural())
    }
}

/// Provider-independent lifecycle state of an instance.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum InstanceState {
    /// Booted and billed.
    Running,
    /// Being created or rebuilt.
    Pending,
    /// Shutting down.
    Stopping,
    /// Powered off but still allocated.
    Stopped,
    /// Deleted by the provider but still listed.
    Terminated,
    /// Any state the provider mapping does not recognise.
    Unknown(String),
}

impl InstanceState {
    /// Returns `true` for states in which a leaked test instance is still a
    /// cleanup candidate.
    ///
    /// Terminated instances are included: some OpenStack deployments keep
    /// listing them, and while they are not billed they still count towards
    /// quota.
    #[must_use]
    pub const fn is_sweepable(&self) -> bool {
        matches!(self, Self::Running | Self::Terminated)
    }
}

/// Read-only snapshot of a single cloud resource.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CloudResource {
    /// Provider-specific identifier.
    pub id: String,
    /// Whether this is an instance or a volume.
    pub kind: ResourceKind,
    /// Label of the provider client that listed the resource.
    pub provider: String,
    /// Region or zone the resource lives in, when known.
    pub region: Option<String>,
    /// Provider-native display name, when the resource has one.
    pub name: Option<String>,
    /// Creation time, when the provider reports a parseable one.
    pub creation_time: Option<DateTime<Utc>>,
    /// Provider tags (AWS tags, Scaleway `key=value` tags).
    pub tags: BTreeMap<String, String>,
    /// Provider metadata (OpenStack metadata).
    pub metadata: BTreeMap<String, String>,
    /// Lifecycle state; only meaningful for instances.
    pub state: Option<InstanceState>,
}

impl CloudResource {
    /// Creates a resource with no optional attributes set.
    #[must_use]
    pub fn new(id: impl Into<String>, kind: ResourceKind, provider: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind,
            provider: provider.into(),
            region: None,
            name: None,
            creation_time: None,
            tags: BTreeMap::new(),
            metadata: BTreeMap::new(),
            state: None,
        }
    }

    /// Sets the region.
    #[must_use]
    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    /// Sets the display name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Sets the creation time.
    #[must_use]
    pub fn with_creation_time(mut self, created: DateTime<Utc>) -> Self {
        self.creation_time = Some(created);
        self
    }

    /// Adds a tag.
    #[must_use]
    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    /// Adds a metadata entry.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Sets the lifecycle state.
    #[must_use]
    pub fn with_state(mut self, state: InstanceState) -> Self {
        self.state = Some(state);
        self
    }

    /// Looks a key up in the tags first and falls back to the metadata.
    #[must_use]
    pub fn tag_or_metadata(&self, key: &str) -> Option<&str> {
        self.tags
            .get(key)
            .or_else(|| self.metadata.get(key))
            .map(String::as_str)
    }
}
