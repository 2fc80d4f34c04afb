//! Label keys attached to every resource this crate creates.
//!
//! Labels double as server-side list filters (`key=value`) and as the
//! client-side ownership heuristic for bulk operations.

use crate::model::{AppType, RuntimeConfigurationType};
use std::collections::BTreeMap;

pub type LabelSet = BTreeMap<String, String>;

/// Marks resources created through this platform.
pub const PLATFORM: &str = "workbench";
pub const CREATED_BY: &str = "created-by";
pub const APP_TYPE: &str = "app-type";
pub const CONFIGURATION_TYPE: &str = "configuration-type";
pub const WORKSPACE_NAMESPACE: &str = "workspace-namespace";
pub const WORKSPACE_NAME: &str = "workspace-name";

/// Label keys requested back from app list calls.
pub const APP_LABEL_KEYS: &str = "app-type,created-by,workspace-namespace,workspace-name";
/// Label keys requested back from disk list calls.
pub const DISK_LABEL_KEYS: &str = "app-type,created-by,workspace-namespace,workspace-name";

pub fn build_labels(
    creator_email: &str,
    app_type: Option<AppType>,
    configuration_type: Option<RuntimeConfigurationType>,
) -> LabelSet {
    let mut labels = LabelSet::new();
    labels.insert(PLATFORM.to_string(), "true".to_string());
    labels.insert(CREATED_BY.to_string(), creator_email.to_string());
    if let Some(app_type) = app_type {
        labels.insert(APP_TYPE.to_string(), app_type.label_value().to_string());
    }
    labels.extend(configuration_labels(configuration_type));
    labels
}

/// Labels describing the runtime configuration preset, empty when unset.
pub fn configuration_labels(configuration_type: Option<RuntimeConfigurationType>) -> LabelSet {
    configuration_type
        .map(|t| {
            LabelSet::from([(
                CONFIGURATION_TYPE.to_string(),
                t.label_value().to_string(),
            )])
        })
        .unwrap_or_default()
}

pub fn with_workspace_labels(mut labels: LabelSet, namespace: &str, name: &str) -> LabelSet {
    upsert_label(&mut labels, WORKSPACE_NAMESPACE, namespace);
    upsert_label(&mut labels, WORKSPACE_NAME, name);
    labels
}

pub fn upsert_label(labels: &mut LabelSet, key: &str, value: &str) {
    labels.insert(key.to_string(), value.to_string());
}

/// Server-side filter selecting resources created by `email`.
pub fn created_by_filter(email: &str) -> String {
    format!("{CREATED_BY}={email}")
}

pub fn app_type_from_labels(labels: &LabelSet) -> Option<AppType> {
    labels
        .get(APP_TYPE)
        .and_then(|v| AppType::from_label_value(v))
}
