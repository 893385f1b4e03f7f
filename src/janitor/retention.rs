//! Age thresholds that turn an ownership verdict into a destroy/keep decision.

use chrono::{DateTime, TimeDelta, Utc};

use crate::resource::CloudResource;

use super::ownership::Ownership;

/// Behaviour when a test-owned resource has no known creation time.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum UnknownAge {
    /// Keep the resource.
    Keep,
    /// Refuse to decide; the caller must abort the plan.
    Reject,
}

/// Outcome of applying a [`RetentionPolicy`] to one resource.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Decision {
    /// Old enough and test-owned.
    Destroy,
    /// Not test-owned, too young, or of unknown age under [`UnknownAge::Keep`].
    Keep,
    /// Test-owned with unknown age under [`UnknownAge::Reject`].
    Undecidable,
}

/// Per-kind minimum age before a test-owned resource may be destroyed.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct RetentionPolicy {
    lag: TimeDelta,
    unknown_age: UnknownAge,
}

impl RetentionPolicy {
    /// Creates a policy with the given lag and unknown-age behaviour.
    #[must_use]
    pub const fn new(lag: TimeDelta, unknown_age: UnknownAge) -> Self {
        Self { lag, unknown_age }
    }

    /// Volume policy: unknown ages abort the plan.
    #[must_use]
    pub const fn volumes(lag: TimeDelta) -> Self {
        Self::new(lag, UnknownAge::Reject)
    }

    /// Instance policy: unknown ages are kept.
    #[must_use]
    pub const fn instances(lag: TimeDelta) -> Self {
        Self::new(lag, UnknownAge::Keep)
    }

    /// Configured lag.
    #[must_use]
    pub const fn lag(&self) -> TimeDelta {
        self.lag
    }

    /// Configured unknown-age behaviour.
    #[must_use]
    pub const fn unknown_age(&self) -> UnknownAge {
        self.unknown_age
    }

    /// Decides the fate of `resource` at `now`.
    ///
    /// A resource is destroyed only when it is test-owned and strictly older
    /// than the lag. Resources that are not test-owned are kept without
    /// looking at their age.
    #[must_use]
    pub fn decide(
        &self,
        resource: &CloudResource,
        ownership: Ownership,
        now: DateTime<Utc>,
    ) -> Decision {
        if !ownership.is_test_owned() {
            return Decision::Keep;
        }
        match resource.creation_time {
            Some(created) if created < now - self.lag => Decision::Destroy,
            Some(_) => Decision::Keep,
            None => match self.unknown_age {
                UnknownAge::Keep => Decision::Keep,
                UnknownAge::Reject => Decision::Undecidable,
            },
        }
    }
}
