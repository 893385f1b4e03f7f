//! Core library for the cloud test-resource janitor.
//!
//! The crate enumerates compute instances and storage volumes across several
//! cloud accounts, decides which ones were leaked by automated test runs, and
//! destroys those that have outlived their grace period. Each run produces a
//! deterministic JSON plan and an exit signal suitable for alerting.

pub mod command;
pub mod credentials;
pub mod janitor;
pub mod logging;
pub mod provider;
pub mod resource;
pub mod settings;
pub mod test_support;

pub use command::{CommandOutput, CommandRunner, ProcessCommandRunner, SpawnError};
pub use credentials::{Account, CredentialsDocument, CredentialsError};
pub use janitor::{
    ActionPlan, ActionPlanner, ClusterMarker, DEFAULT_INSTANCE_NAME_PREFIXES, ExecutionSummary,
    Executor, ExitSignal, Janitor, JanitorConfig, JanitorError, OwnershipClassifier, PlanError,
    ReportError, Reporter, ResourceLister, RetentionPolicy, SweepOutcome, TrackedResource,
};
pub use provider::{CloudProvider, ProviderError, ProviderRegistry};
pub use resource::{CloudResource, InstanceState, ResourceKind};
pub use settings::{JanitorSettings, SettingsError};
