//! Test-resource janitor.
//!
//! Automated test runs create instances and volumes across several clouds and
//! occasionally leak them. The janitor lists every instance and volume, works
//! out which were created by a test run and have outlived their grace
//! period, and destroys those. Every run reports the full destroy/keep plan
//! so that a scheduled job can alert whenever leaks were found.

mod executor;
mod lister;
mod ownership;
mod plan;
mod report;
mod retention;

use chrono::{DateTime, TimeDelta, Utc};
use thiserror::Error;
use tracing::info;

use crate::provider::{ProviderError, ProviderRegistry};
use crate::resource::ResourceKind;
use crate::settings::JanitorSettings;

pub use executor::{DestroyFailure, ExecutionSummary, Executor};
pub use lister::{ResourceLister, TrackedResource};
pub use ownership::{
    ClusterMarker, DEFAULT_CLUSTER_ID_TAG, DEFAULT_INSTANCE_NAME_PREFIXES, InstanceOwnership,
    MarkerError, Ownership, OwnershipClassifier, VolumeOwnership,
};
pub use plan::{ActionPlan, ActionPlanner, PlanError};
pub use report::{ExitSignal, ReportError, ReportNode, Reporter};
pub use retention::{Decision, RetentionPolicy, UnknownAge};

/// Order in which resource kinds are planned and reported.
pub const PLAN_ORDER: [ResourceKind; 2] = [ResourceKind::Instance, ResourceKind::Volume];

/// Configuration for a janitor run.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct JanitorConfig {
    /// Operator identifier appended to every instance name prefix.
    pub creator: String,
    /// Instance name prefixes, before the creator is appended.
    pub instance_name_prefixes: Vec<String>,
    /// Minimum age before a test-owned volume is destroyed.
    pub volume_lag: TimeDelta,
    /// Minimum age before a test-owned instance is destroyed.
    pub instance_lag: TimeDelta,
    /// Marker identifying test cluster UUIDs.
    pub marker: ClusterMarker,
    /// Tag or metadata key holding a volume's cluster UUID.
    pub cluster_id_tag: String,
    /// Report only, never destroy.
    pub dry_run: bool,
}

impl JanitorConfig {
    /// Constructs a config, trimming whitespace.
    ///
    /// The marker defaults to [`ClusterMarker::DEFAULT`], the cluster id tag
    /// to [`DEFAULT_CLUSTER_ID_TAG`], and dry-run is off.
    ///
    /// # Errors
    ///
    /// Returns [`JanitorError::InvalidConfig`] when the creator is blank, no
    /// non-blank prefix is given, or a lag is negative.
    pub fn new<I, S>(
        creator: impl Into<String>,
        instance_name_prefixes: I,
        volume_lag: TimeDelta,
        instance_lag: TimeDelta,
    ) -> Result<Self, JanitorError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let trimmed_creator = creator.into().trim().to_owned();
        if trimmed_creator.is_empty() {
            return Err(JanitorError::invalid("creator"));
        }
        let prefixes = instance_name_prefixes
            .into_iter()
            .map(|prefix| prefix.into().trim().to_owned())
            .filter(|prefix| !prefix.is_empty())
            .collect::<Vec<_>>();
        if prefixes.is_empty() {
            return Err(JanitorError::invalid("instance_name_prefixes"));
        }
        if volume_lag < TimeDelta::zero() {
            return Err(JanitorError::invalid("volume_lag"));
        }
        if instance_lag < TimeDelta::zero() {
            return Err(JanitorError::invalid("instance_lag"));
        }
        Ok(Self {
            creator: trimmed_creator,
            instance_name_prefixes: prefixes,
            volume_lag,
            instance_lag,
            marker: ClusterMarker::DEFAULT,
            cluster_id_tag: DEFAULT_CLUSTER_ID_TAG.to_owned(),
            dry_run: false,
        })
    }

    /// Overrides the cluster marker.
    #[must_use]
    pub const fn with_marker(mut self, marker: ClusterMarker) -> Self {
        self.marker = marker;
        self
    }

    /// Overrides the cluster id tag key.
    #[must_use]
    pub fn with_cluster_id_tag(mut self, tag: impl Into<String>) -> Self {
        self.cluster_id_tag = tag.into();
        self
    }

    /// Enables or disables dry-run mode.
    #[must_use]
    pub const fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Builds the planner described by this config.
    #[must_use]
    pub fn planner(&self) -> ActionPlanner {
        let classifier = OwnershipClassifier::new(
            VolumeOwnership::new(self.marker, self.cluster_id_tag.clone()),
            InstanceOwnership::new(&self.instance_name_prefixes, &self.creator),
        );
        ActionPlanner::new(
            classifier,
            RetentionPolicy::volumes(self.volume_lag),
            RetentionPolicy::instances(self.instance_lag),
        )
    }
}

/// Errors returned by the janitor.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum JanitorError {
    /// Raised when configuration is missing required values.
    #[error("invalid {field}")]
    InvalidConfig {
        /// Name of the missing or invalid field.
        field: String,
    },
    /// Raised when listing fails on any provider.
    #[error(transparent)]
    Provider(#[from] ProviderError),
    /// Raised when a plan cannot be built.
    #[error(transparent)]
    Plan(#[from] PlanError),
}

impl JanitorError {
    fn invalid(field: &str) -> Self {
        Self::InvalidConfig {
            field: field.to_owned(),
        }
    }
}

/// Result of a full sweep.
#[derive(Clone, Debug)]
pub struct SweepOutcome {
    /// Plans in report order.
    pub plans: Vec<ActionPlan>,
    /// Combined execution summary across kinds.
    pub summary: ExecutionSummary,
}

impl SweepOutcome {
    /// Exit signal derived from the plans.
    #[must_use]
    pub fn exit_signal(&self) -> ExitSignal {
        Reporter::exit_signal(&self.plans)
    }

    /// Renders the plans as the JSON report.
    ///
    /// # Errors
    ///
    /// Returns [`ReportError`] when serialisation fails.
    pub fn report(&self) -> Result<String, ReportError> {
        Reporter::render(&self.plans)
    }
}

/// Lists, plans and destroys leaked test resources.
#[derive(Clone)]
pub struct Janitor {
    config: JanitorConfig,
    lister: ResourceLister,
    planner: ActionPlanner,
    executor: Executor,
}

impl Janitor {
    /// Wires a janitor to `registry` using the ambient `settings`.
    #[must_use]
    pub fn new(config: JanitorConfig, registry: ProviderRegistry, settings: &JanitorSettings) -> Self {
        let timeout = settings.provider_timeout();
        Self {
            lister: ResourceLister::new(registry, timeout),
            planner: config.planner(),
            executor: Executor::new(config.dry_run, settings.destroy_concurrency, timeout),
            config,
        }
    }

    /// Run configuration.
    #[must_use]
    pub const fn config(&self) -> &JanitorConfig {
        &self.config
    }

    /// Lists and plans every kind at `now` without destroying anything.
    ///
    /// # Errors
    ///
    /// Returns [`JanitorError::Provider`] when any listing fails and
    /// [`JanitorError::Plan`] when a plan cannot be decided.
    pub async fn plan(&self, now: DateTime<Utc>) -> Result<Vec<ActionPlan>, JanitorError> {
        let mut plans = Vec::with_capacity(PLAN_ORDER.len());
        for kind in PLAN_ORDER {
            let resources = self.lister.list(kind).await?;
            plans.push(self.planner.plan(kind, resources, now)?);
        }
        Ok(plans)
    }

    /// Plans every kind, then executes the plans.
    ///
    /// Nothing is destroyed unless every kind was listed and planned.
    ///
    /// # Errors
    ///
    /// Returns the same errors as [`Janitor::plan`]. Destroy failures are
    /// logged and reported in [`SweepOutcome::summary`] instead.
    pub async fn sweep(&self, now: DateTime<Utc>) -> Result<SweepOutcome, JanitorError> {
        info!(
            event = "janitor.sweep.started",
            dry_run = self.config.dry_run,
            creator = %self.config.creator,
            marker = %self.config.marker
        );
        let plans = self.plan(now).await?;
        let mut summary = ExecutionSummary::default();
        for plan in &plans {
            summary.absorb(self.executor.execute(plan).await);
        }
        let outcome = SweepOutcome { plans, summary };
        info!(
            event = "janitor.sweep.finished",
            leaks_found = outcome.exit_signal() == ExitSignal::LeaksFound,
            destroyed = outcome.summary.destroyed,
            failed = outcome.summary.failures.len()
        );
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests;
