mod common;

use common::*;
use compute_orchestrator::control_plane::KubernetesRuntimeConfig;
use compute_orchestrator::labels;
use compute_orchestrator::model::{PersistentDiskRequest, RuntimeConfig};
use compute_orchestrator::{
    AppStatus, AppType, CreateAppSpec, DiskStatus, OrchestratorError, RemoteFailure,
    RuntimeConfigurationType, RuntimeSpec, RuntimeStatus,
};

fn runtime_spec(name: &str) -> RuntimeSpec {
    RuntimeSpec {
        google_project: PROJECT.to_string(),
        runtime_name: name.to_string(),
        configuration_type: Some(RuntimeConfigurationType::GeneralAnalysis),
        runtime_config: RuntimeConfig::Gce {
            machine_type: "n1-standard-4".to_string(),
            disk_size_gb: 120,
            gpu_config: None,
        },
        autopause_threshold: Some(30),
    }
}

fn app_spec(app_type: AppType, disk_name: Option<&str>) -> CreateAppSpec {
    CreateAppSpec {
        google_project: PROJECT.to_string(),
        owner_id: 42,
        app_type,
        kubernetes_runtime_config: KubernetesRuntimeConfig {
            num_nodes: 1,
            machine_type: "n1-highmem-4".to_string(),
            autoscaling_enabled: false,
        },
        persistent_disk: PersistentDiskRequest {
            name: disk_name.map(str::to_string),
            size_gb: 50,
            ..Default::default()
        },
        autodelete_enabled: false,
        autodelete_threshold: None,
    }
}

#[tokio::test]
async fn test_create_runtime_labels_and_owner() {
    let h = harness();

    h.client
        .create_runtime(&runtime_spec("all-of-us-42"), &workspace())
        .await
        .unwrap();

    let created = h.api.runtimes();
    assert_eq!(created.len(), 1);
    let runtime = &created[0];
    assert_eq!(runtime.audit_info.creator, ALICE);
    assert_eq!(runtime.labels[labels::PLATFORM], "true");
    assert_eq!(runtime.labels[labels::CREATED_BY], ALICE);
    assert_eq!(runtime.labels[labels::WORKSPACE_NAMESPACE], "aou-rw-test-1");
    assert_eq!(runtime.labels[labels::WORKSPACE_NAME], "Heart Study");
    assert_eq!(
        runtime.configuration_type(),
        Some(RuntimeConfigurationType::GeneralAnalysis)
    );
    assert_eq!(runtime.autopause_threshold, Some(30));
}

#[tokio::test]
async fn test_update_runtime_upserts_configuration_label() {
    let h = harness();
    h.api
        .add_runtime(runtime("all-of-us-42", ALICE, RuntimeStatus::Running));

    let mut spec = runtime_spec("all-of-us-42");
    spec.configuration_type = Some(RuntimeConfigurationType::UserOverride);
    h.client.update_runtime(&spec).await.unwrap();

    let updated = h.client.get_runtime(PROJECT, "all-of-us-42").await.unwrap();
    assert_eq!(
        updated.configuration_type(),
        Some(RuntimeConfigurationType::UserOverride)
    );
    assert_eq!(updated.labels[labels::CREATED_BY], ALICE);
}

#[tokio::test]
async fn test_get_missing_runtime_is_not_found_without_retry() {
    let h = harness();

    let err = h.client.get_runtime(PROJECT, "nope").await.unwrap_err();

    assert!(err.is_not_found());
    assert_eq!(h.api.calls_to("get_runtime").len(), 1);
}

#[tokio::test]
async fn test_stop_runtime_refused_locally_when_not_stoppable() {
    let h = harness();
    let stopped = runtime("all-of-us-42", ALICE, RuntimeStatus::Stopped);
    h.api.add_runtime(stopped.clone());

    let err = h.client.stop_runtime(&stopped).await.unwrap_err();

    assert!(matches!(err, OrchestratorError::InvalidState(_)));
    assert!(h.api.calls_to("stop_runtime").is_empty());
}

#[tokio::test]
async fn test_checked_delete_refuses_runtime_still_creating() {
    let h = harness();
    let creating = runtime("all-of-us-42", ALICE, RuntimeStatus::Creating);
    h.api.add_runtime(creating.clone());

    let err = h
        .client
        .delete_runtime_checked(&creating, true)
        .await
        .unwrap_err();

    assert!(matches!(err, OrchestratorError::InvalidState(_)));
    assert!(h.api.calls_to("delete_runtime").is_empty());

    let stopped = runtime("all-of-us-43", ALICE, RuntimeStatus::Stopped);
    h.api.add_runtime(stopped.clone());
    h.client.delete_runtime_checked(&stopped, false).await.unwrap();
    assert_eq!(h.api.calls_to("delete_runtime").len(), 1);
}

#[tokio::test]
async fn test_checked_delete_refuses_apps_and_disks_mid_transition() {
    let h = harness();
    let upgrading = app("rs", ALICE, AppType::Rstudio, AppStatus::Updating);
    let creating = disk("d-1", ALICE, DiskStatus::Creating, None, 1);
    h.api.add_app(upgrading.clone());
    h.api.add_disk(creating.clone());

    let err = h
        .client
        .delete_app_checked(&upgrading, false)
        .await
        .unwrap_err();
    assert!(matches!(err, OrchestratorError::InvalidState(_)));
    let err = h.client.delete_disk_checked(&creating).await.unwrap_err();
    assert!(matches!(err, OrchestratorError::InvalidState(_)));

    assert!(h.api.calls_to("delete_app").is_empty());
    assert!(h.api.calls_to("delete_disk").is_empty());
}

#[tokio::test]
async fn test_delete_runtime_as_service_uses_service_identity() {
    let h = harness();
    h.api
        .add_runtime(runtime("all-of-us-42", ALICE, RuntimeStatus::Error));

    h.client
        .delete_runtime_as_service(PROJECT, "all-of-us-42", true)
        .await
        .unwrap();

    let deletes = h.api.calls_to("delete_runtime");
    assert_eq!(deletes.len(), 1);
    assert_eq!(deletes[0].principal, h.credentials.service_principal());
}

#[tokio::test]
async fn test_create_app_refuses_second_disk_for_same_app_type() {
    let h = harness();
    h.api.add_disk(disk(
        "all-of-us-pd-42-rstudio-ab12",
        ALICE,
        DiskStatus::Ready,
        Some(AppType::Rstudio),
        1,
    ));

    let err = h
        .client
        .create_app(&app_spec(AppType::Rstudio, None), &workspace())
        .await
        .unwrap_err();

    assert!(matches!(err, OrchestratorError::InvalidInput(_)));
    assert!(h.api.calls_to("create_app").is_empty());
}

#[tokio::test]
async fn test_create_app_generates_names_and_labels_disk() {
    let h = harness();
    // Active disks of other slots do not block a new SAS disk.
    h.api.add_disk(disk(
        "rt-disk",
        ALICE,
        DiskStatus::Ready,
        None,
        1,
    ));
    h.api.add_disk(disk(
        "old-sas",
        ALICE,
        DiskStatus::Failed,
        Some(AppType::Sas),
        1,
    ));

    let id = h
        .client
        .create_app(&app_spec(AppType::Sas, None), &workspace())
        .await
        .unwrap();

    assert!(id.name.starts_with("all-of-us-42-sas-"), "{id}");
    let apps = h.api.apps();
    assert_eq!(apps.len(), 1);
    assert_eq!(apps[0].labels[labels::APP_TYPE], "sas");
    assert_eq!(apps[0].labels[labels::WORKSPACE_NAMESPACE], "aou-rw-test-1");

    let disk_name = apps[0].disk_name.clone().unwrap();
    assert!(disk_name.starts_with("all-of-us-pd-42-sas-"), "{disk_name}");
    let new_disk = h
        .api
        .disks()
        .into_iter()
        .find(|d| d.name == disk_name)
        .unwrap();
    assert_eq!(new_disk.app_type(), Some(AppType::Sas));
    assert_eq!(new_disk.labels[labels::WORKSPACE_NAME], "Heart Study");
}

#[tokio::test]
async fn test_create_app_with_existing_disk_skips_conflict_check() {
    let h = harness();
    h.api.add_disk(disk(
        "my-rstudio-disk",
        ALICE,
        DiskStatus::Ready,
        Some(AppType::Rstudio),
        1,
    ));

    h.client
        .create_app(
            &app_spec(AppType::Rstudio, Some("my-rstudio-disk")),
            &workspace(),
        )
        .await
        .unwrap();

    assert!(h.api.calls_to("list_disks_by_project").is_empty());
    assert_eq!(
        h.api.apps()[0].disk_name.as_deref(),
        Some("my-rstudio-disk")
    );
}

#[tokio::test]
async fn test_find_current_disks_end_to_end() {
    let h = harness();
    h.api
        .add_disk(disk("d1", ALICE, DiskStatus::Ready, None, 1));
    h.api
        .add_disk(disk("d2", ALICE, DiskStatus::Ready, None, 2));
    h.api.add_disk(disk(
        "d3",
        ALICE,
        DiskStatus::Failed,
        Some(AppType::Rstudio),
        3,
    ));
    // Someone else's disk in the same project is not the caller's.
    h.api
        .add_disk(disk("bobs", BOB, DiskStatus::Ready, None, 9));

    let result = h.client.find_current_disks(PROJECT).await.unwrap();

    assert_eq!(result.runtime_disk().map(|d| d.name.as_str()), Some("d2"));
    assert!(result.app_disk(AppType::Rstudio).is_none());
    assert_eq!(result.current.len(), 1);
    assert!(result.anomaly.is_none());
}

#[tokio::test]
async fn test_update_disk_size() {
    let h = harness();
    h.api
        .add_disk(disk("d1", ALICE, DiskStatus::Ready, None, 1));

    h.client.update_disk(PROJECT, "d1", 500).await.unwrap();

    assert_eq!(h.client.get_disk(PROJECT, "d1").await.unwrap().size_gb, 500);
}

#[tokio::test]
async fn test_health_reports_true_and_false() {
    let h = harness();
    assert!(h.client.get_control_plane_health().await);

    h.api
        .fail("system_status", "", RemoteFailure::status(500, "db down"));
    assert!(!h.client.get_control_plane_health().await);
}

#[tokio::test]
async fn test_transient_failure_surfaces_as_unavailable() {
    let h = harness();
    h.api.fail(
        "list_runtimes_by_project",
        PROJECT,
        RemoteFailure::Timeout("deadline exceeded".into()),
    );

    let err = h
        .client
        .list_runtimes_by_project(PROJECT, false)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        OrchestratorError::RemoteUnavailable {
            code: 504,
            attempts: 3,
            ..
        }
    ));
}
