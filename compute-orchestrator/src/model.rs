//! Snapshots of control-plane resources as seen by this crate.
//!
//! These are never persisted; each value lives for the duration of one call.

use crate::labels::{self, LabelSet};
use crate::status::{AppStatus, DiskStatus, LifecycleStatus, RuntimeStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A control-plane resource address: billing project plus resource name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceId {
    pub google_project: String,
    pub name: String,
}

impl ResourceId {
    pub fn new(google_project: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            google_project: google_project.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.google_project, self.name)
    }
}

/// Typed app kinds. At most one instance of each may exist per user per
/// billing project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AppType {
    Rstudio,
    Cromwell,
    Sas,
}

impl AppType {
    pub const ALL: &'static [AppType] = &[AppType::Rstudio, AppType::Cromwell, AppType::Sas];

    /// Value stored under the app-type label.
    pub fn label_value(self) -> &'static str {
        match self {
            AppType::Rstudio => "rstudio",
            AppType::Cromwell => "cromwell",
            AppType::Sas => "sas",
        }
    }

    pub fn from_label_value(value: &str) -> Option<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|t| t.label_value().eq_ignore_ascii_case(value))
    }
}

impl fmt::Display for AppType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label_value())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeConfigurationType {
    GeneralAnalysis,
    HailGenomicAnalysis,
    UserOverride,
}

impl RuntimeConfigurationType {
    pub fn label_value(self) -> &'static str {
        match self {
            Self::GeneralAnalysis => "general-analysis",
            Self::HailGenomicAnalysis => "hail-genomic-analysis",
            Self::UserOverride => "user-override",
        }
    }

    pub fn from_label_value(value: &str) -> Option<Self> {
        [
            Self::GeneralAnalysis,
            Self::HailGenomicAnalysis,
            Self::UserOverride,
        ]
        .into_iter()
        .find(|t| t.label_value() == value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DiskType {
    #[default]
    #[serde(rename = "pd-standard")]
    Standard,
    #[serde(rename = "pd-ssd")]
    Ssd,
    #[serde(rename = "pd-balanced")]
    Balanced,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditInfo {
    pub creator: String,
    pub created_date: DateTime<Utc>,
    #[serde(default)]
    pub date_accessed: Option<DateTime<Utc>>,
    #[serde(default)]
    pub destroyed_date: Option<DateTime<Utc>>,
}

impl AuditInfo {
    pub fn new(creator: impl Into<String>, created_date: DateTime<Utc>) -> Self {
        Self {
            creator: creator.into(),
            created_date,
            date_accessed: None,
            destroyed_date: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GpuConfig {
    pub gpu_type: String,
    pub num_of_gpus: u32,
}

/// Machine shape of a runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "cloudService", rename_all = "camelCase")]
pub enum RuntimeConfig {
    #[serde(rename = "GCE", rename_all = "camelCase")]
    Gce {
        machine_type: String,
        disk_size_gb: u32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        gpu_config: Option<GpuConfig>,
    },
    #[serde(rename = "GCE_WITH_PD", rename_all = "camelCase")]
    GceWithPd {
        machine_type: String,
        persistent_disk: PersistentDiskRequest,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        gpu_config: Option<GpuConfig>,
    },
    #[serde(rename = "DATAPROC", rename_all = "camelCase")]
    Dataproc {
        master_machine_type: String,
        master_disk_size_gb: u32,
        #[serde(default)]
        number_of_workers: u32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        worker_machine_type: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        worker_disk_size_gb: Option<u32>,
        #[serde(default)]
        number_of_preemptible_workers: u32,
    },
}

impl RuntimeConfig {
    pub fn is_dataproc(&self) -> bool {
        matches!(self, RuntimeConfig::Dataproc { .. })
    }
}

/// Disk to attach when creating a runtime or app. An empty name asks for a
/// new disk.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistentDiskRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub size_gb: u32,
    #[serde(default)]
    pub disk_type: DiskType,
    #[serde(default)]
    pub labels: LabelSet,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Runtime {
    pub google_project: String,
    pub runtime_name: String,
    pub status: RuntimeStatus,
    pub audit_info: AuditInfo,
    #[serde(default)]
    pub labels: LabelSet,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disk_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime_config: Option<RuntimeConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub autopause_threshold: Option<u32>,
}

impl Runtime {
    pub fn id(&self) -> ResourceId {
        ResourceId::new(&self.google_project, &self.runtime_name)
    }

    pub fn configuration_type(&self) -> Option<RuntimeConfigurationType> {
        self.labels
            .get(labels::CONFIGURATION_TYPE)
            .and_then(|v| RuntimeConfigurationType::from_label_value(v))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct App {
    pub google_project: String,
    pub app_name: String,
    #[serde(default)]
    pub app_type: Option<AppType>,
    pub status: AppStatus,
    pub audit_info: AuditInfo,
    #[serde(default)]
    pub labels: LabelSet,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disk_name: Option<String>,
}

impl App {
    pub fn id(&self) -> ResourceId {
        ResourceId::new(&self.google_project, &self.app_name)
    }

    /// Declared type, falling back to the app-type label.
    pub fn resolved_app_type(&self) -> Option<AppType> {
        self.app_type
            .or_else(|| labels::app_type_from_labels(&self.labels))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistentDisk {
    pub google_project: String,
    pub name: String,
    pub size_gb: u32,
    #[serde(default)]
    pub disk_type: DiskType,
    pub status: DiskStatus,
    pub audit_info: AuditInfo,
    #[serde(default)]
    pub labels: LabelSet,
}

impl PersistentDisk {
    pub fn id(&self) -> ResourceId {
        ResourceId::new(&self.google_project, &self.name)
    }

    pub fn app_type(&self) -> Option<AppType> {
        labels::app_type_from_labels(&self.labels)
    }

    /// Disks without an app-type label belong to the runtime slot.
    pub fn is_runtime_disk(&self) -> bool {
        self.app_type().is_none()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.audit_info.created_date
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Runtime,
    App,
}

/// Either kind of compute resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ComputeResource {
    Runtime(Runtime),
    App(App),
}

impl ComputeResource {
    pub fn kind(&self) -> ResourceKind {
        match self {
            ComputeResource::Runtime(_) => ResourceKind::Runtime,
            ComputeResource::App(_) => ResourceKind::App,
        }
    }

    pub fn id(&self) -> ResourceId {
        match self {
            ComputeResource::Runtime(r) => r.id(),
            ComputeResource::App(a) => a.id(),
        }
    }

    pub fn creator(&self) -> &str {
        &self.audit_info().creator
    }

    /// Whether the last known status permits a delete.
    pub fn can_delete(&self) -> bool {
        match self {
            ComputeResource::Runtime(r) => r.status.can_delete(),
            ComputeResource::App(a) => a.status.can_delete(),
        }
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.audit_info().created_date
    }

    pub fn disk_name(&self) -> Option<&str> {
        match self {
            ComputeResource::Runtime(r) => r.disk_name.as_deref(),
            ComputeResource::App(a) => a.disk_name.as_deref(),
        }
    }

    pub fn labels(&self) -> &LabelSet {
        match self {
            ComputeResource::Runtime(r) => &r.labels,
            ComputeResource::App(a) => &a.labels,
        }
    }

    fn audit_info(&self) -> &AuditInfo {
        match self {
            ComputeResource::Runtime(r) => &r.audit_info,
            ComputeResource::App(a) => &a.audit_info,
        }
    }
}

impl From<Runtime> for ComputeResource {
    fn from(runtime: Runtime) -> Self {
        ComputeResource::Runtime(runtime)
    }
}

impl From<App> for ComputeResource {
    fn from(app: App) -> Self {
        ComputeResource::App(app)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_runtime_deserializes_from_wire_shape() {
        let runtime: Runtime = serde_json::from_value(json!({
            "googleProject": "wb-proj-1",
            "runtimeName": "all-of-us-42",
            "status": "RUNNING",
            "auditInfo": {
                "creator": "alice@example.org",
                "createdDate": "2024-03-01T12:00:00Z"
            },
            "labels": { "configuration-type": "hail-genomic-analysis" },
            "runtimeConfig": {
                "cloudService": "DATAPROC",
                "masterMachineType": "n1-standard-4",
                "masterDiskSizeGb": 150,
                "numberOfWorkers": 2
            }
        }))
        .unwrap();

        assert_eq!(runtime.id().to_string(), "wb-proj-1/all-of-us-42");
        assert_eq!(runtime.status, RuntimeStatus::Running);
        assert_eq!(
            runtime.configuration_type(),
            Some(RuntimeConfigurationType::HailGenomicAnalysis)
        );
        assert!(runtime.runtime_config.unwrap().is_dataproc());
    }

    #[test]
    fn test_disk_slot_follows_app_type_label() {
        let created = DateTime::parse_from_rfc3339("2024-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let mut disk = PersistentDisk {
            google_project: "p".into(),
            name: "d".into(),
            size_gb: 100,
            disk_type: DiskType::Ssd,
            status: DiskStatus::Ready,
            audit_info: AuditInfo::new("alice@example.org", created),
            labels: LabelSet::new(),
        };
        assert!(disk.is_runtime_disk());

        disk.labels
            .insert(labels::APP_TYPE.to_string(), "rstudio".to_string());
        assert_eq!(disk.app_type(), Some(AppType::Rstudio));
        assert!(!disk.is_runtime_disk());
    }

    #[test]
    fn test_compute_resource_exposes_common_attributes() {
        let created = DateTime::parse_from_rfc3339("2024-02-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let app = App {
            google_project: "p".into(),
            app_name: "all-of-us-42-rstudio-ab12".into(),
            app_type: Some(AppType::Rstudio),
            status: AppStatus::Updating,
            audit_info: AuditInfo::new("bob@example.org", created),
            labels: labels::build_labels("bob@example.org", Some(AppType::Rstudio), None),
            disk_name: Some("all-of-us-pd-42-rstudio-cd34".into()),
        };

        let resource = ComputeResource::from(app);
        assert_eq!(resource.kind(), ResourceKind::App);
        assert_eq!(resource.id().to_string(), "p/all-of-us-42-rstudio-ab12");
        assert_eq!(resource.creator(), "bob@example.org");
        assert_eq!(resource.created_at(), created);
        assert_eq!(resource.disk_name(), Some("all-of-us-pd-42-rstudio-cd34"));
        assert_eq!(
            resource.labels().get(labels::APP_TYPE).map(String::as_str),
            Some("rstudio")
        );
        assert!(!resource.can_delete());
    }

    #[test]
    fn test_app_type_label_round_trip() {
        for app_type in AppType::ALL {
            assert_eq!(
                AppType::from_label_value(app_type.label_value()),
                Some(*app_type)
            );
        }
        assert_eq!(AppType::from_label_value("jupyter"), None);
    }

    #[test]
    fn test_disk_type_wire_names() {
        assert_eq!(
            serde_json::to_value(DiskType::Ssd).unwrap(),
            json!("pd-ssd")
        );
    }
}
