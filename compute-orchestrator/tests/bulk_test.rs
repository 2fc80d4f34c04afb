mod common;

use common::*;
use compute_orchestrator::testing::{FakeControlPlane, StaticCredentials};
use compute_orchestrator::{AppStatus, AppType, OrchestratorError, RemoteFailure, RuntimeStatus};
use std::time::Duration;

#[tokio::test]
async fn test_stop_all_continues_past_failures_and_reports_them() {
    let h = harness();
    h.api.add_runtime(runtime("rt-1", ALICE, RuntimeStatus::Running));
    h.api.add_runtime(runtime("rt-2", ALICE, RuntimeStatus::Running));
    h.api.add_runtime(runtime("rt-3", ALICE, RuntimeStatus::Starting));
    h.api.fail(
        "stop_runtime",
        format!("{PROJECT}/rt-2"),
        RemoteFailure::status(409, "runtime is busy"),
    );

    let err = h.client.stop_all_runtimes_for_user(ALICE).await.unwrap_err();

    assert_eq!(h.api.calls_to("stop_runtime").len(), 3);
    match err {
        OrchestratorError::BulkOperation { failed, succeeded } => {
            assert_eq!(failed, vec![format!("{PROJECT}/rt-2")]);
            assert_eq!(succeeded, 2);
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_stop_all_acts_as_the_user_with_one_credential() {
    let h = harness();
    for name in ["rt-1", "rt-2", "rt-3", "rt-4"] {
        h.api.add_runtime(runtime(name, BOB, RuntimeStatus::Running));
    }

    let stopped = h.client.stop_all_runtimes_for_user(BOB).await.unwrap();

    assert_eq!(stopped, 4);
    assert_eq!(h.credentials.impersonations(), 1);
    let stops = h.api.calls_to("stop_runtime");
    assert!(stops.iter().all(|c| c.principal == BOB));

    let lists = h.api.calls_to("list_runtimes");
    assert_eq!(lists.len(), 1);
    assert_eq!(lists[0].principal, h.credentials.service_principal());
}

#[tokio::test]
async fn test_stop_all_skips_runtimes_owned_by_someone_else() {
    let h = harness();
    h.api.add_runtime(runtime("mine", ALICE, RuntimeStatus::Running));
    // Labelled as Alice's but created by Bob.
    let mut mislabelled = runtime("theirs", BOB, RuntimeStatus::Running);
    mislabelled
        .labels
        .insert("created-by".to_string(), ALICE.to_string());
    h.api.add_runtime(mislabelled);

    let stopped = h.client.stop_all_runtimes_for_user(ALICE).await.unwrap();

    assert_eq!(stopped, 1);
    let stops = h.api.calls_to("stop_runtime");
    assert_eq!(stops.len(), 1);
    assert_eq!(stops[0].target, format!("{PROJECT}/mine"));
}

#[tokio::test]
async fn test_stop_all_ignores_runtimes_that_cannot_stop() {
    let h = harness();
    h.api.add_runtime(runtime("stopped", ALICE, RuntimeStatus::Stopped));
    h.api.add_runtime(runtime("creating", ALICE, RuntimeStatus::Creating));
    h.api.add_runtime(runtime("deleted", ALICE, RuntimeStatus::Deleted));

    let stopped = h.client.stop_all_runtimes_for_user(ALICE).await.unwrap();

    assert_eq!(stopped, 0);
    assert!(h.api.calls_to("stop_runtime").is_empty());
    // Nothing to do, so no credential is minted.
    assert_eq!(h.credentials.impersonations(), 0);
}

fn slow_harness() -> Harness {
    harness_from(
        FakeControlPlane::new().with_mutation_latency(Duration::from_millis(20)),
        StaticCredentials::new(ALICE),
    )
}

#[tokio::test]
async fn test_stop_all_overlaps_calls_up_to_the_cap() {
    let h = slow_harness();
    for name in ["rt-1", "rt-2", "rt-3", "rt-4", "rt-5", "rt-6"] {
        h.api.add_runtime(runtime(name, ALICE, RuntimeStatus::Running));
    }
    let client = h.client.clone().with_bulk_concurrency(4);

    assert_eq!(client.stop_all_runtimes_for_user(ALICE).await.unwrap(), 6);
    assert_eq!(h.api.max_in_flight(), 4);
}

#[tokio::test]
async fn test_stop_all_runs_serially_with_cap_of_one() {
    let h = slow_harness();
    let client = h.client.clone().with_bulk_concurrency(0);
    assert_eq!(client.bulk_concurrency(), 1);
    h.api.add_runtime(runtime("rt-1", ALICE, RuntimeStatus::Running));
    h.api.add_runtime(runtime("rt-2", ALICE, RuntimeStatus::Updating));
    h.api.add_runtime(runtime("rt-3", ALICE, RuntimeStatus::Starting));

    assert_eq!(client.stop_all_runtimes_for_user(ALICE).await.unwrap(), 3);
    assert_eq!(h.api.calls_to("stop_runtime").len(), 3);
    assert_eq!(h.api.max_in_flight(), 1);
}

#[tokio::test]
async fn test_delete_user_apps_overlaps_calls() {
    let h = slow_harness();
    for name in ["rs-1", "rs-2", "rs-3"] {
        h.api
            .add_app(app(name, ALICE, AppType::Rstudio, AppStatus::Running));
    }

    let deleted = h.client.delete_user_apps_as_service(ALICE).await.unwrap();

    assert_eq!(deleted, 3);
    assert!(h.api.max_in_flight() > 1);
}

#[tokio::test]
async fn test_stop_all_fails_without_impersonation() {
    let h = harness_with(StaticCredentials::new(ALICE).without_impersonation());
    h.api.add_runtime(runtime("rt-1", ALICE, RuntimeStatus::Running));

    let err = h.client.stop_all_runtimes_for_user(ALICE).await.unwrap_err();

    assert!(matches!(err, OrchestratorError::Credential(_)));
    assert!(h.api.calls_to("stop_runtime").is_empty());
}

#[tokio::test]
async fn test_outcome_reports_each_target() {
    let h = harness();
    h.api.add_runtime(runtime("rt-1", ALICE, RuntimeStatus::Running));
    h.api.add_runtime(runtime("rt-2", ALICE, RuntimeStatus::Running));
    h.api.fail(
        "stop_runtime",
        format!("{PROJECT}/rt-1"),
        RemoteFailure::status(503, "unavailable"),
    );

    let outcome = h
        .client
        .stop_all_runtimes_for_user_outcome(ALICE)
        .await
        .unwrap();

    assert_eq!(outcome.succeeded(), 1);
    assert_eq!(outcome.failed().len(), 1);
    assert_eq!(outcome.failed()[0].name, "rt-1");
    // The 503 was retried before being recorded as a failure.
    assert_eq!(h.api.calls_to("stop_runtime").len(), 4);
}

#[tokio::test]
async fn test_delete_user_apps_skips_cromwell_and_keeps_disks() {
    let h = harness();
    h.api
        .add_app(app("rs", ALICE, AppType::Rstudio, AppStatus::Running));
    h.api
        .add_app(app("cw", ALICE, AppType::Cromwell, AppStatus::Running));
    h.api
        .add_app(app("sas", ALICE, AppType::Sas, AppStatus::Provisioning));

    let deleted = h.client.delete_user_apps_as_service(ALICE).await.unwrap();

    assert_eq!(deleted, 1);
    let deletes = h.api.calls_to("delete_app");
    assert_eq!(deletes.len(), 1);
    assert_eq!(deletes[0].target, format!("{PROJECT}/rs"));
    assert_eq!(deletes[0].principal, h.credentials.service_principal());
}

#[tokio::test]
async fn test_delete_user_apps_leaves_apps_mid_transition() {
    let h = harness();
    h.api
        .add_app(app("rs-upgrading", ALICE, AppType::Rstudio, AppStatus::Updating));
    h.api
        .add_app(app("sas-going", ALICE, AppType::Sas, AppStatus::Predeleting));

    let deleted = h.client.delete_user_apps_as_service(ALICE).await.unwrap();

    assert_eq!(deleted, 0);
    assert!(h.api.calls_to("delete_app").is_empty());
}
