//! Decides whether a listed resource was created by an automated test run.
//!
//! Volumes carry their cluster's UUID in a tag (or, on OpenStack, in
//! metadata). Test clusters are created with a fixed 48-bit marker in the
//! UUID's node field, so a volume is test-owned when that field matches the
//! configured [`ClusterMarker`]. Instances carry no such tag and are matched
//! by name prefix and lifecycle state instead.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;
use tracing::warn;
use uuid::Uuid;

use crate::resource::{CloudResource, ResourceKind};

/// Name prefixes used by the acceptance and client test suites.
pub const DEFAULT_INSTANCE_NAME_PREFIXES: &[&str] = &["acceptance-test-", "client-test-"];

/// Tag or metadata key holding a volume's cluster UUID.
pub const DEFAULT_CLUSTER_ID_TAG: &str = "flocker-cluster-id";

const NODE_BITS: u32 = 48;
const NODE_MASK: u64 = (1 << NODE_BITS) - 1;

/// Raised when a cluster marker cannot be used.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum MarkerError {
    /// Raised when the text is not a hexadecimal number.
    #[error("cluster marker '{input}' is not hexadecimal")]
    NotHex {
        /// Text supplied by the caller.
        input: String,
    },
    /// Raised when the value does not fit the 48-bit UUID node field.
    #[error("cluster marker {value:#x} is wider than 48 bits")]
    TooWide {
        /// Value supplied by the caller.
        value: u64,
    },
}

/// 48-bit value embedded in the node field of test cluster UUIDs.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct ClusterMarker(u64);

impl ClusterMarker {
    /// Marker used by the acceptance test harness.
    pub const DEFAULT: Self = Self(0xAAAA_AAAA_AAAA);

    /// Wraps a 48-bit value.
    ///
    /// # Errors
    ///
    /// Returns [`MarkerError::TooWide`] when `value` exceeds 48 bits.
    pub const fn new(value: u64) -> Result<Self, MarkerError> {
        if value & !NODE_MASK != 0 {
            return Err(MarkerError::TooWide { value });
        }
        Ok(Self(value))
    }

    /// Returns the raw marker value.
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }

    /// Returns `true` when the node field of `uuid` equals this marker.
    #[must_use]
    pub fn matches(self, uuid: &Uuid) -> bool {
        uuid_node(uuid) == self.0
    }
}

impl Default for ClusterMarker {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl fmt::Display for ClusterMarker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:012x}", self.0)
    }
}

impl FromStr for ClusterMarker {
    type Err = MarkerError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let trimmed = input.trim();
        let digits = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .unwrap_or(trimmed);
        let value = u64::from_str_radix(digits, 16).map_err(|_| MarkerError::NotHex {
            input: input.to_owned(),
        })?;
        Self::new(value)
    }
}

/// Node field of a UUID: its last six bytes read as a big-endian integer.
fn uuid_node(uuid: &Uuid) -> u64 {
    uuid.as_bytes()
        .iter()
        .skip(10)
        .fold(0_u64, |node, byte| (node << 8) | u64::from(*byte))
}

/// Two-state ownership verdict.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Ownership {
    /// Created by an automated test run.
    TestOwned,
    /// Anything else, including resources whose ownership cannot be read.
    NotTestOwned,
}

impl Ownership {
    /// Returns `true` for [`Ownership::TestOwned`].
    #[must_use]
    pub const fn is_test_owned(self) -> bool {
        matches!(self, Self::TestOwned)
    }

    const fn from_bool(owned: bool) -> Self {
        if owned {
            Self::TestOwned
        } else {
            Self::NotTestOwned
        }
    }
}

/// Volume strategy: cluster UUID tag whose node field carries the marker.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct VolumeOwnership {
    marker: ClusterMarker,
    tag_key: String,
}

impl VolumeOwnership {
    /// Creates a strategy reading `tag_key` and comparing against `marker`.
    #[must_use]
    pub fn new(marker: ClusterMarker, tag_key: impl Into<String>) -> Self {
        Self {
            marker,
            tag_key: tag_key.into(),
        }
    }

    /// Classifies one volume. Never fails: a missing or malformed tag means
    /// the volume is kept.
    #[must_use]
    pub fn classify(&self, volume: &CloudResource) -> Ownership {
        let Some(raw) = volume.tag_or_metadata(&self.tag_key) else {
            return Ownership::NotTestOwned;
        };
        match Uuid::parse_str(raw) {
            Ok(uuid) => Ownership::from_bool(self.marker.matches(&uuid)),
            Err(err) => {
                warn!(
                    event = "janitor.ownership.cluster_id_unparseable",
                    provider = %volume.provider,
                    resource_id = %volume.id,
                    raw,
                    error = %err
                );
                Ownership::NotTestOwned
            }
        }
    }
}

/// Instance strategy: name prefix plus a sweepable lifecycle state.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct InstanceOwnership {
    prefixes: Vec<String>,
}

impl InstanceOwnership {
    /// Creates a strategy matching `<prefix><creator>` for every prefix.
    #[must_use]
    pub fn new<I, S>(prefixes: I, creator: &str) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            prefixes: prefixes
                .into_iter()
                .map(|prefix| format!("{}{creator}", prefix.as_ref()))
                .collect(),
        }
    }

    /// Full name prefixes this strategy matches.
    #[must_use]
    pub fn prefixes(&self) -> &[String] {
        &self.prefixes
    }

    /// Classifies one instance. Unnamed or stateless instances are not
    /// test-owned.
    #[must_use]
    pub fn classify(&self, instance: &CloudResource) -> Ownership {
        let named = instance.name.as_deref().is_some_and(|name| {
            self.prefixes
                .iter()
                .any(|prefix| name.starts_with(prefix.as_str()))
        });
        let sweepable = instance
            .state
            .as_ref()
            .is_some_and(crate::resource::InstanceState::is_sweepable);
        Ownership::from_bool(named && sweepable)
    }
}

/// Dispatches to the strategy matching a resource's kind.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct OwnershipClassifier {
    volumes: VolumeOwnership,
    instances: InstanceOwnership,
}

impl OwnershipClassifier {
    /// Combines the two strategies.
    #[must_use]
    pub const fn new(volumes: VolumeOwnership, instances: InstanceOwnership) -> Self {
        Self { volumes, instances }
    }

    /// Classifies `resource` with the strategy for its kind.
    #[must_use]
    pub fn classify(&self, resource: &CloudResource) -> Ownership {
        match resource.kind {
            ResourceKind::Volume => self.volumes.classify(resource),
            ResourceKind::Instance => self.instances.classify(resource),
        }
    }
}
