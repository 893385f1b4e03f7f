//! End-to-end janitor runs against scripted provider CLIs.

use camino::Utf8Path;
use chrono::{DateTime, TimeDelta, Utc};
use cloud_janitor::test_support::{
    ScriptedRunner, aws_instances_json, aws_volumes_json, cluster_uuid,
};
use cloud_janitor::{
    ClusterMarker, CredentialsDocument, DEFAULT_INSTANCE_NAME_PREFIXES, ExitSignal, Janitor,
    JanitorConfig, JanitorSettings, ProviderRegistry,
};
use rstest::{fixture, rstest};

const CREDENTIALS: &str = r"
metadata:
  creator: alice
aws:
  access_key: AKIAEXAMPLE
  secret_access_token: secret
  region: us-west-2
";

#[fixture]
fn now() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2016-03-01T12:00:00Z")
        .expect("valid timestamp")
        .with_timezone(&Utc)
}

fn janitor(runner: &ScriptedRunner, dry_run: bool) -> Janitor {
    let document = CredentialsDocument::parse(Utf8Path::new("acceptance.yml"), CREDENTIALS)
        .expect("credentials parse");
    let accounts = document.accounts().expect("accounts resolve");
    let settings = JanitorSettings::default();
    let registry = ProviderRegistry::build(&accounts, &settings, runner).expect("registry");
    let config = JanitorConfig::new(
        document.creator().expect("creator"),
        DEFAULT_INSTANCE_NAME_PREFIXES.iter().copied(),
        TimeDelta::minutes(30),
        TimeDelta::minutes(120),
    )
    .expect("config")
    .with_marker(ClusterMarker::new(0xABC123).expect("marker"))
    .with_dry_run(dry_run);
    Janitor::new(config, registry, &settings)
}

fn script_listings(runner: &ScriptedRunner) {
    let test_cluster = cluster_uuid(0xABC123);
    let other_cluster = cluster_uuid(0xDEF456);
    runner.push_output(
        Some(0),
        aws_instances_json(&[
            (
                "i-leaked",
                "acceptance-test-alice-worker-1",
                "terminated",
                Some("2016-03-01T09:00:00Z"),
            ),
            (
                "i-stopped",
                "acceptance-test-alice-worker-2",
                "stopped",
                Some("2016-03-01T09:00:00Z"),
            ),
            ("i-prod", "web-1", "running", Some("2015-01-01T00:00:00Z")),
        ]),
        "",
    );
    runner.push_output(
        Some(0),
        aws_volumes_json(&[
            (
                "vol-leaked",
                Some("2016-03-01T09:00:00.000Z"),
                &[("flocker-cluster-id", test_cluster.as_str())],
            ),
            (
                "vol-fresh",
                Some("2016-03-01T11:45:00.000Z"),
                &[("flocker-cluster-id", test_cluster.as_str())],
            ),
            (
                "vol-other",
                Some("2016-03-01T09:00:00.000Z"),
                &[("flocker-cluster-id", other_cluster.as_str())],
            ),
        ]),
        "",
    );
}

#[rstest]
#[tokio::test]
async fn live_sweep_destroys_only_planned_resources(now: DateTime<Utc>) {
    let runner = ScriptedRunner::new();
    script_listings(&runner);
    runner.push_success();
    runner.push_success();

    let outcome = janitor(&runner, false)
        .sweep(now)
        .await
        .expect("sweep succeeds");

    assert_eq!(outcome.exit_signal(), ExitSignal::LeaksFound);
    assert_eq!(outcome.summary.destroyed, 2);
    let commands = runner
        .invocations()
        .iter()
        .map(cloud_janitor::test_support::CommandInvocation::command_string)
        .collect::<Vec<_>>();
    assert_eq!(
        commands,
        vec![
            "aws ec2 describe-instances --region us-west-2 --output json",
            "aws ec2 describe-volumes --region us-west-2 --output json",
            "aws ec2 terminate-instances --region us-west-2 --output json --instance-ids i-leaked",
            "aws ec2 delete-volume --region us-west-2 --output json --volume-id vol-leaked",
        ]
    );
}

#[rstest]
#[tokio::test]
async fn dry_run_reports_the_same_plan_without_destroying(now: DateTime<Utc>) {
    let runner = ScriptedRunner::new();
    script_listings(&runner);

    let outcome = janitor(&runner, true)
        .sweep(now)
        .await
        .expect("sweep succeeds");

    assert_eq!(runner.invocations().len(), 2);
    let report: serde_json::Value =
        serde_json::from_str(&outcome.report().expect("report renders")).expect("valid JSON");
    assert_eq!(
        report,
        serde_json::json!([
            {
                "destroy": [{
                    "creation_time": "2016-03-01T09:00:00Z",
                    "id": "i-leaked",
                    "name": "acceptance-test-alice-worker-1",
                    "provider": "aws@us-west-2",
                    "region": "us-west-2"
                }],
                "keep": [
                    {
                        "creation_time": "2016-03-01T09:00:00Z",
                        "id": "i-stopped",
                        "name": "acceptance-test-alice-worker-2",
                        "provider": "aws@us-west-2",
                        "region": "us-west-2"
                    },
                    {
                        "creation_time": "2015-01-01T00:00:00Z",
                        "id": "i-prod",
                        "name": "web-1",
                        "provider": "aws@us-west-2",
                        "region": "us-west-2"
                    }
                ],
                "kind": "instances"
            },
            {
                "destroy": [{
                    "creation_time": "2016-03-01T09:00:00Z",
                    "id": "vol-leaked",
                    "name": null,
                    "provider": "aws@us-west-2",
                    "region": "us-west-2"
                }],
                "keep": [
                    {
                        "creation_time": "2016-03-01T11:45:00Z",
                        "id": "vol-fresh",
                        "name": null,
                        "provider": "aws@us-west-2",
                        "region": "us-west-2"
                    },
                    {
                        "creation_time": "2016-03-01T09:00:00Z",
                        "id": "vol-other",
                        "name": null,
                        "provider": "aws@us-west-2",
                        "region": "us-west-2"
                    }
                ],
                "kind": "volumes"
            }
        ])
    );
}

#[rstest]
#[tokio::test]
async fn failed_destroy_keeps_the_leak_signal(now: DateTime<Utc>) {
    let runner = ScriptedRunner::new();
    script_listings(&runner);
    runner.push_failure(255);
    runner.push_success();

    let outcome = janitor(&runner, false)
        .sweep(now)
        .await
        .expect("sweep succeeds despite destroy failure");

    assert_eq!(outcome.exit_signal().code(), 1);
    assert_eq!(outcome.summary.attempted, 2);
    assert_eq!(outcome.summary.failures.len(), 1);
}

#[rstest]
#[tokio::test]
async fn listing_failure_aborts_the_sweep(now: DateTime<Utc>) {
    let runner = ScriptedRunner::new();
    runner.push_output(Some(255), "", "AuthFailure");

    let result = janitor(&runner, false).sweep(now).await;

    assert!(result.is_err());
    assert_eq!(runner.invocations().len(), 1);
}
