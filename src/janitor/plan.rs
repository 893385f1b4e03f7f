//! Destroy/keep planning per resource kind.

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{debug, info};

use crate::resource::ResourceKind;

use super::lister::TrackedResource;
use super::ownership::OwnershipClassifier;
use super::retention::{Decision, RetentionPolicy};

/// Errors raised while planning.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum PlanError {
    /// Raised when a test-owned resource has no creation time and its
    /// policy rejects unknown ages.
    #[error("{kind} {id} on {provider} is test-owned but has no creation time")]
    UnknownCreationTime {
        /// Resource kind.
        kind: ResourceKind,
        /// Resource identifier.
        id: String,
        /// Label of the provider that listed it.
        provider: String,
    },
}

/// Partition of one kind's resources into destroy and keep lists.
#[derive(Clone, Debug)]
pub struct ActionPlan {
    /// Kind every resource in the plan shares.
    pub kind: ResourceKind,
    /// Resources to destroy.
    pub destroy: Vec<TrackedResource>,
    /// Resources to keep.
    pub keep: Vec<TrackedResource>,
}

impl ActionPlan {
    /// Creates an empty plan for `kind`.
    #[must_use]
    pub const fn empty(kind: ResourceKind) -> Self {
        Self {
            kind,
            destroy: Vec::new(),
            keep: Vec::new(),
        }
    }

    /// Returns `true` when nothing is scheduled for destruction.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.destroy.is_empty()
    }

    /// Total number of resources in the plan.
    #[must_use]
    pub fn len(&self) -> usize {
        self.destroy.len() + self.keep.len()
    }

    /// Returns `true` when the plan holds no resources at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Combines ownership and retention into per-kind plans.
#[derive(Clone, Debug)]
pub struct ActionPlanner {
    classifier: OwnershipClassifier,
    volume_policy: RetentionPolicy,
    instance_policy: RetentionPolicy,
}

impl ActionPlanner {
    /// Creates a planner from a classifier and the two kind policies.
    #[must_use]
    pub const fn new(
        classifier: OwnershipClassifier,
        volume_policy: RetentionPolicy,
        instance_policy: RetentionPolicy,
    ) -> Self {
        Self {
            classifier,
            volume_policy,
            instance_policy,
        }
    }

    /// Policy applied to resources of `kind`.
    #[must_use]
    pub const fn policy(&self, kind: ResourceKind) -> &RetentionPolicy {
        match kind {
            ResourceKind::Volume => &self.volume_policy,
            ResourceKind::Instance => &self.instance_policy,
        }
    }

    /// Partitions `resources` of `kind` at `now`.
    ///
    /// Every input resource ends up in exactly one of the two lists, in
    /// listing order.
    ///
    /// # Errors
    ///
    /// Returns [`PlanError::UnknownCreationTime`] for the first test-owned
    /// resource whose age cannot be judged under a rejecting policy.
    pub fn plan(
        &self,
        kind: ResourceKind,
        resources: Vec<TrackedResource>,
        now: DateTime<Utc>,
    ) -> Result<ActionPlan, PlanError> {
        let policy = self.policy(kind);
        let mut plan = ActionPlan::empty(kind);
        for tracked in resources {
            let ownership = self.classifier.classify(&tracked.resource);
            let decision = policy.decide(&tracked.resource, ownership, now);
            debug!(
                event = "janitor.plan.decided",
                provider = %tracked.resource.provider,
                resource_id = %tracked.resource.id,
                kind = %kind,
                ownership = ?ownership,
                decision = ?decision
            );
            match decision {
                Decision::Destroy => plan.destroy.push(tracked),
                Decision::Keep => plan.keep.push(tracked),
                Decision::Undecidable => {
                    return Err(PlanError::UnknownCreationTime {
                        kind,
                        id: tracked.resource.id,
                        provider: tracked.resource.provider,
                    });
                }
            }
        }
        info!(
            event = "janitor.plan.built",
            kind = %kind,
            destroy = plan.destroy.len(),
            keep = plan.keep.len()
        );
        Ok(plan)
    }
}
