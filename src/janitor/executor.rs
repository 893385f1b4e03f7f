//! Applies a plan's destroy list.

use std::time::Duration;

use futures::stream::{self, StreamExt};
use tracing::{error, info};

use crate::provider::ProviderError;

use super::lister::TrackedResource;
use super::plan::ActionPlan;

/// Per-resource destroy failure.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DestroyFailure {
    /// Provider label.
    pub provider: String,
    /// Resource identifier.
    pub id: String,
    /// Error returned by the provider.
    pub error: ProviderError,
}

/// What an execution pass did.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ExecutionSummary {
    /// Number of destroy calls issued.
    pub attempted: usize,
    /// Number of destroy calls that succeeded.
    pub destroyed: usize,
    /// Destroy calls that failed or timed out.
    pub failures: Vec<DestroyFailure>,
}

impl ExecutionSummary {
    /// Folds another summary into this one.
    pub fn absorb(&mut self, other: Self) {
        self.attempted += other.attempted;
        self.destroyed += other.destroyed;
        self.failures.extend(other.failures);
    }
}

/// Issues destroy calls, or only logs them in dry-run mode.
///
/// Each resource gets exactly one attempt and failures never stop the
/// remaining destroys.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Executor {
    dry_run: bool,
    concurrency: usize,
    timeout: Duration,
}

impl Executor {
    /// Creates an executor. A `concurrency` of zero is treated as one.
    #[must_use]
    pub fn new(dry_run: bool, concurrency: usize, timeout: Duration) -> Self {
        Self {
            dry_run,
            concurrency: concurrency.max(1),
            timeout,
        }
    }

    /// Returns `true` when no destructive call will be issued.
    #[must_use]
    pub const fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// Executes `plan`'s destroy list.
    pub async fn execute(&self, plan: &ActionPlan) -> ExecutionSummary {
        if self.dry_run {
            for tracked in &plan.destroy {
                info!(
                    event = "janitor.executor.dry_run_skip",
                    provider = %tracked.resource.provider,
                    resource_id = %tracked.resource.id,
                    kind = %plan.kind
                );
            }
            return ExecutionSummary::default();
        }

        let failures = stream::iter(&plan.destroy)
            .map(|tracked| self.destroy_one(tracked))
            .buffer_unordered(self.concurrency)
            .filter_map(|outcome| async move { outcome.err() })
            .collect::<Vec<_>>()
            .await;

        let attempted = plan.destroy.len();
        let summary = ExecutionSummary {
            attempted,
            destroyed: attempted - failures.len(),
            failures,
        };
        info!(
            event = "janitor.executor.finished",
            kind = %plan.kind,
            attempted = summary.attempted,
            destroyed = summary.destroyed,
            failed = summary.failures.len()
        );
        summary
    }

    async fn destroy_one(&self, tracked: &TrackedResource) -> Result<(), DestroyFailure> {
        let resource = &tracked.resource;
        let outcome = tokio::time::timeout(self.timeout, tracked.provider.destroy(resource))
            .await
            .unwrap_or_else(|_| {
                Err(ProviderError::Timeout {
                    provider: resource.provider.clone(),
                    operation: format!("destroy {}", resource.id),
                    seconds: self.timeout.as_secs(),
                })
            });
        match outcome {
            Ok(()) => {
                info!(
                    event = "janitor.executor.destroyed",
                    provider = %resource.provider,
                    resource_id = %resource.id,
                    kind = %resource.kind
                );
                Ok(())
            }
            Err(err) => {
                error!(
                    event = "janitor.executor.destroy_failed",
                    provider = %resource.provider,
                    resource_id = %resource.id,
                    kind = %resource.kind,
                    error = %err
                );
                Err(DestroyFailure {
                    provider: resource.provider.clone(),
                    id: resource.id.clone(),
                    error: err,
                })
            }
        }
    }
}
