//! Unit tests for the janitor run.

use std::sync::Arc;
use std::time::Duration;

use super::*;
use crate::provider::CloudProvider;
use crate::resource::{CloudResource, InstanceState};
use crate::test_support::{FakeProvider, cluster_uuid, named_instance, reference_now, tagged_volume};
use rstest::{fixture, rstest};

const TEST_MARKER: u64 = 0xABC123;
const OTHER_MARKER: u64 = 0xDEF456;

#[fixture]
fn config() -> JanitorConfig {
    JanitorConfig::new(
        "alice",
        DEFAULT_INSTANCE_NAME_PREFIXES.iter().copied(),
        TimeDelta::minutes(120),
        TimeDelta::minutes(120),
    )
    .expect("valid config")
    .with_marker(ClusterMarker::new(TEST_MARKER).expect("fits"))
}

fn registry(providers: &[FakeProvider]) -> ProviderRegistry {
    ProviderRegistry::from_providers(
        providers
            .iter()
            .cloned()
            .map(|provider| Arc::new(provider) as Arc<dyn CloudProvider>)
            .collect(),
    )
}

fn janitor(config: JanitorConfig, providers: &[FakeProvider]) -> Janitor {
    Janitor::new(config, registry(providers), &JanitorSettings::default())
}

fn ids(resources: &[TrackedResource]) -> Vec<&str> {
    resources
        .iter()
        .map(|tracked| tracked.resource.id.as_str())
        .collect()
}

fn plan_for(plans: &[ActionPlan], kind: ResourceKind) -> &ActionPlan {
    plans
        .iter()
        .find(|plan| plan.kind == kind)
        .expect("plan for kind")
}

#[rstest]
#[case::old_marked_volume(TEST_MARKER, 3, true)]
#[case::young_marked_volume(TEST_MARKER, 1, false)]
#[case::old_foreign_volume(OTHER_MARKER, 3, false)]
#[tokio::test]
async fn volume_scenarios(
    config: JanitorConfig,
    #[case] node: u64,
    #[case] age_hours: i64,
    #[case] destroyed: bool,
) {
    let now = reference_now();
    let provider = FakeProvider::new("aws@us-west-2").with_resource(tagged_volume(
        "vol-1",
        &cluster_uuid(node),
        now,
        TimeDelta::hours(age_hours),
    ));

    let plans = janitor(config, &[provider])
        .plan(now)
        .await
        .expect("plan succeeds");

    let volumes = plan_for(&plans, ResourceKind::Volume);
    let expected = if destroyed { vec!["vol-1"] } else { vec![] };
    assert_eq!(ids(&volumes.destroy), expected);
    assert_eq!(volumes.len(), 1);
}

#[rstest]
#[case::terminated(InstanceState::Terminated, true)]
#[case::running(InstanceState::Running, true)]
#[case::stopped(InstanceState::Stopped, false)]
#[tokio::test]
async fn instance_scenarios(
    config: JanitorConfig,
    #[case] state: InstanceState,
    #[case] destroyed: bool,
) {
    let now = reference_now();
    let provider = FakeProvider::new("rackspace@dfw").with_resource(named_instance(
        "i-1",
        "acceptance-test-alice-worker-1",
        state,
        now,
        TimeDelta::hours(3),
    ));

    let plans = janitor(config, &[provider])
        .plan(now)
        .await
        .expect("plan succeeds");

    let instances = plan_for(&plans, ResourceKind::Instance);
    assert_eq!(instances.is_clean(), !destroyed);
    assert_eq!(instances.len(), 1);
}

#[rstest]
#[tokio::test]
async fn instances_with_missing_fields_are_kept(config: JanitorConfig) {
    let now = reference_now();
    let no_name = CloudResource::new("i-1", ResourceKind::Instance, "x")
        .with_state(InstanceState::Running)
        .with_creation_time(now - TimeDelta::days(10));
    let no_state = CloudResource::new("i-2", ResourceKind::Instance, "x")
        .with_name("acceptance-test-alice-1")
        .with_creation_time(now - TimeDelta::days(10));
    let no_age = CloudResource::new("i-3", ResourceKind::Instance, "x")
        .with_name("acceptance-test-alice-1")
        .with_state(InstanceState::Running);
    let provider = FakeProvider::new("aws@us-west-2")
        .with_resource(no_name)
        .with_resource(no_state)
        .with_resource(no_age);

    let plans = janitor(config, &[provider])
        .plan(now)
        .await
        .expect("plan succeeds");

    let instances = plan_for(&plans, ResourceKind::Instance);
    assert!(instances.is_clean());
    assert_eq!(ids(&instances.keep), vec!["i-1", "i-2", "i-3"]);
}

#[rstest]
#[tokio::test]
async fn test_owned_volume_without_age_aborts_planning(config: JanitorConfig) {
    let mut volume = tagged_volume("vol-1", &cluster_uuid(TEST_MARKER), reference_now(), TimeDelta::zero());
    volume.creation_time = None;
    let provider = FakeProvider::new("aws@us-west-2").with_resource(volume);

    let err = janitor(config, &[provider.clone()])
        .sweep(reference_now())
        .await
        .expect_err("planning fails");

    assert_eq!(
        err,
        JanitorError::Plan(PlanError::UnknownCreationTime {
            kind: ResourceKind::Volume,
            id: String::from("vol-1"),
            provider: String::from("aws@us-west-2"),
        })
    );
    assert!(provider.destroyed().is_empty());
}

#[rstest]
#[tokio::test]
async fn foreign_volume_without_age_is_kept(config: JanitorConfig) {
    let mut volume = tagged_volume("vol-1", &cluster_uuid(OTHER_MARKER), reference_now(), TimeDelta::zero());
    volume.creation_time = None;
    let provider = FakeProvider::new("aws@us-west-2").with_resource(volume);

    let plans = janitor(config, &[provider])
        .plan(reference_now())
        .await
        .expect("plan succeeds");

    assert_eq!(ids(&plan_for(&plans, ResourceKind::Volume).keep), vec!["vol-1"]);
}

fn mixed_providers(now: DateTime<Utc>) -> Vec<FakeProvider> {
    vec![
        FakeProvider::new("rackspace@dfw")
            .with_resource(named_instance(
                "i-old",
                "client-test-alice-1",
                InstanceState::Running,
                now,
                TimeDelta::hours(5),
            ))
            .with_resource(named_instance(
                "i-young",
                "client-test-alice-2",
                InstanceState::Running,
                now,
                TimeDelta::minutes(10),
            ))
            .with_resource(tagged_volume(
                "vol-old",
                &cluster_uuid(TEST_MARKER),
                now,
                TimeDelta::hours(5),
            )),
        FakeProvider::new("aws@us-west-2")
            .with_resource(named_instance(
                "i-web",
                "web-1",
                InstanceState::Running,
                now,
                TimeDelta::days(30),
            ))
            .with_resource(tagged_volume(
                "vol-foreign",
                &cluster_uuid(OTHER_MARKER),
                now,
                TimeDelta::days(30),
            ))
            .with_resource(tagged_volume(
                "vol-garbage",
                "not-a-uuid",
                now,
                TimeDelta::days(30),
            )),
    ]
}

#[rstest]
#[tokio::test]
async fn plans_partition_every_listed_resource(config: JanitorConfig) {
    let now = reference_now();

    let plans = janitor(config, &mixed_providers(now))
        .plan(now)
        .await
        .expect("plan succeeds");

    assert_eq!(
        plans.iter().map(|plan| plan.kind).collect::<Vec<_>>(),
        PLAN_ORDER.to_vec()
    );
    let instances = plan_for(&plans, ResourceKind::Instance);
    assert_eq!(ids(&instances.destroy), vec!["i-old"]);
    assert_eq!(ids(&instances.keep), vec!["i-young", "i-web"]);
    let volumes = plan_for(&plans, ResourceKind::Volume);
    assert_eq!(ids(&volumes.destroy), vec!["vol-old"]);
    assert_eq!(ids(&volumes.keep), vec!["vol-foreign", "vol-garbage"]);

    for plan in &plans {
        let mut all = ids(&plan.destroy);
        all.extend(ids(&plan.keep));
        let unique = all.iter().collect::<std::collections::BTreeSet<_>>();
        assert_eq!(unique.len(), all.len(), "resource listed twice in {}", plan.kind);
        assert!(
            plan.destroy
                .iter()
                .chain(&plan.keep)
                .all(|tracked| tracked.resource.kind == plan.kind)
        );
    }
}

#[rstest]
#[tokio::test]
async fn resources_keep_their_listing_provider(config: JanitorConfig) {
    let now = reference_now();

    let plans = janitor(config, &mixed_providers(now))
        .plan(now)
        .await
        .expect("plan succeeds");

    for plan in &plans {
        for tracked in plan.destroy.iter().chain(&plan.keep) {
            assert_eq!(tracked.provider.label(), tracked.resource.provider);
        }
    }
}

#[rstest]
#[tokio::test]
async fn dry_run_plans_match_live_plans_and_destroy_nothing(config: JanitorConfig) {
    let now = reference_now();
    let dry_providers = mixed_providers(now);
    let live_providers = mixed_providers(now);

    let dry = janitor(config.clone().with_dry_run(true), &dry_providers)
        .sweep(now)
        .await
        .expect("dry sweep succeeds");
    let live = janitor(config, &live_providers)
        .sweep(now)
        .await
        .expect("live sweep succeeds");

    assert_eq!(dry.report(), live.report());
    assert_eq!(dry.exit_signal(), ExitSignal::LeaksFound);
    assert_eq!(dry.summary, ExecutionSummary::default());
    assert!(dry_providers.iter().all(|provider| provider.destroyed().is_empty()));

    let mut destroyed = live_providers
        .iter()
        .flat_map(FakeProvider::destroyed)
        .collect::<Vec<_>>();
    destroyed.sort();
    assert_eq!(destroyed, vec!["i-old", "vol-old"]);
    assert_eq!(live.summary.destroyed, 2);
}

#[rstest]
#[tokio::test]
async fn destroy_failures_do_not_stop_other_destroys(config: JanitorConfig) {
    let now = reference_now();
    let provider = FakeProvider::new("aws@us-west-2")
        .with_resource(tagged_volume("vol-1", &cluster_uuid(TEST_MARKER), now, TimeDelta::hours(3)))
        .with_resource(tagged_volume("vol-2", &cluster_uuid(TEST_MARKER), now, TimeDelta::hours(3)))
        .with_resource(tagged_volume("vol-3", &cluster_uuid(TEST_MARKER), now, TimeDelta::hours(3)))
        .failing_destroy("vol-2");

    let outcome = janitor(config, &[provider.clone()])
        .sweep(now)
        .await
        .expect("sweep succeeds");

    let mut attempted = provider.destroyed();
    attempted.sort();
    assert_eq!(attempted, vec!["vol-1", "vol-2", "vol-3"]);
    assert_eq!(outcome.summary.attempted, 3);
    assert_eq!(outcome.summary.destroyed, 2);
    assert_eq!(
        outcome
            .summary
            .failures
            .iter()
            .map(|failure| failure.id.as_str())
            .collect::<Vec<_>>(),
        vec!["vol-2"]
    );
    assert_eq!(outcome.exit_signal(), ExitSignal::LeaksFound);
}

#[rstest]
#[tokio::test]
async fn listing_failure_aborts_before_any_destroy(config: JanitorConfig) {
    let now = reference_now();
    let healthy = FakeProvider::new("aws@us-west-2").with_resource(tagged_volume(
        "vol-1",
        &cluster_uuid(TEST_MARKER),
        now,
        TimeDelta::hours(3),
    ));
    let broken = FakeProvider::new("rackspace@dfw").failing_listings(ProviderError::Http {
        operation: String::from("list servers"),
        message: String::from("503"),
    });

    let err = janitor(config, &[healthy.clone(), broken])
        .sweep(now)
        .await
        .expect_err("sweep fails");

    assert!(matches!(err, JanitorError::Provider(ProviderError::Http { .. })));
    assert!(healthy.destroyed().is_empty());
}

#[rstest]
#[tokio::test]
async fn slow_listing_times_out() {
    let slow = FakeProvider::new("scaleway@all").with_delay(Duration::from_secs(5));
    let lister = ResourceLister::new(registry(&[slow]), Duration::from_millis(20));

    let err = lister
        .list(ResourceKind::Volume)
        .await
        .expect_err("listing times out");

    assert_eq!(
        err,
        ProviderError::Timeout {
            provider: String::from("scaleway@all"),
            operation: String::from("list volumes"),
            seconds: 0,
        }
    );
}

#[rstest]
#[tokio::test]
async fn lister_concatenates_in_registry_order() {
    let first = FakeProvider::new("a@1")
        .with_delay(Duration::from_millis(30))
        .with_resource(CloudResource::new("v-a", ResourceKind::Volume, "a@1"));
    let second = FakeProvider::new("b@2").with_resource(CloudResource::new(
        "v-b",
        ResourceKind::Volume,
        "b@2",
    ));
    let lister = ResourceLister::new(registry(&[first.clone(), second.clone()]), Duration::from_secs(5));

    let listed = lister.list(ResourceKind::Volume).await.expect("listing succeeds");

    assert_eq!(ids(&listed), vec!["v-a", "v-b"]);
    assert_eq!(first.list_calls() + second.list_calls(), 2);
}

#[rstest]
#[tokio::test]
async fn slow_destroy_is_recorded_as_a_failure() {
    let now = reference_now();
    let slow = FakeProvider::new("aws@us-west-2").with_delay(Duration::from_secs(5));
    let provider: Arc<dyn CloudProvider> = Arc::new(slow);
    let mut plan = ActionPlan::empty(ResourceKind::Volume);
    plan.destroy.push(TrackedResource::new(
        Arc::clone(&provider),
        tagged_volume("vol-1", &cluster_uuid(TEST_MARKER), now, TimeDelta::hours(3)),
    ));

    let summary = Executor::new(false, 2, Duration::from_millis(20))
        .execute(&plan)
        .await;

    assert_eq!(summary.attempted, 1);
    assert_eq!(summary.destroyed, 0);
    assert!(matches!(
        summary.failures.first().map(|failure| &failure.error),
        Some(ProviderError::Timeout { .. })
    ));
}

#[rstest]
#[case::blank_creator(" ", vec!["acceptance-test-"], 30, 120, "creator")]
#[case::no_prefixes("alice", vec![], 30, 120, "instance_name_prefixes")]
#[case::blank_prefixes("alice", vec!["  "], 30, 120, "instance_name_prefixes")]
#[case::negative_volume_lag("alice", vec!["acceptance-test-"], -1, 120, "volume_lag")]
#[case::negative_instance_lag("alice", vec!["acceptance-test-"], 30, -5, "instance_lag")]
fn config_validation_names_the_field(
    #[case] creator: &str,
    #[case] prefixes: Vec<&str>,
    #[case] volume_lag: i64,
    #[case] instance_lag: i64,
    #[case] field: &str,
) {
    let err = JanitorConfig::new(
        creator,
        prefixes,
        TimeDelta::minutes(volume_lag),
        TimeDelta::minutes(instance_lag),
    )
    .expect_err("config is rejected");
    assert_eq!(
        err,
        JanitorError::InvalidConfig {
            field: field.to_owned()
        }
    );
}

#[rstest]
fn config_appends_creator_to_prefixes(config: JanitorConfig) {
    let classifier = InstanceOwnership::new(&config.instance_name_prefixes, &config.creator);
    assert_eq!(
        classifier.prefixes(),
        ["acceptance-test-alice", "client-test-alice"]
    );
}
