//! Selection of the current disk for each slot.
//!
//! A user has one runtime slot plus one slot per app type. Old or failed disks
//! can linger next to the current one, so callers reconcile the raw listing
//! before deciding which disk to reuse.

use crate::model::{AppType, PersistentDisk};
use crate::status::LifecycleStatus;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DiskReconciliation {
    /// Runtime slot first (if any), then app slots in `AppType::ALL` order.
    pub current: Vec<PersistentDisk>,
    /// Every active disk, populated only when there are more active disks
    /// than slots.
    pub anomaly: Option<Vec<PersistentDisk>>,
}

impl DiskReconciliation {
    pub fn runtime_disk(&self) -> Option<&PersistentDisk> {
        self.current.iter().find(|d| d.is_runtime_disk())
    }

    pub fn app_disk(&self, app_type: AppType) -> Option<&PersistentDisk> {
        self.current.iter().find(|d| d.app_type() == Some(app_type))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DiskReconciler;

impl DiskReconciler {
    pub fn slot_count() -> usize {
        1 + AppType::ALL.len()
    }

    pub fn find_current_disks(&self, disks: &[PersistentDisk]) -> DiskReconciliation {
        let active: Vec<&PersistentDisk> = disks.iter().filter(|d| d.status.is_active()).collect();

        let anomaly = if active.len() > Self::slot_count() {
            let names: Vec<&str> = active.iter().map(|d| d.name.as_str()).collect();
            warn!(
                active = active.len(),
                slots = Self::slot_count(),
                disks = ?names,
                "found more active disks than slots"
            );
            Some(active.iter().map(|d| (*d).clone()).collect())
        } else {
            None
        };

        let mut current = Vec::with_capacity(Self::slot_count());
        if let Some(disk) = newest(active.iter().copied().filter(|d| d.is_runtime_disk())) {
            current.push(disk.clone());
        }
        for app_type in AppType::ALL {
            let slot = active
                .iter()
                .copied()
                .filter(|d| d.app_type() == Some(*app_type));
            if let Some(disk) = newest(slot) {
                current.push(disk.clone());
            }
        }

        DiskReconciliation { current, anomaly }
    }
}

// Name breaks ties between equal creation times.
fn newest<'a>(disks: impl Iterator<Item = &'a PersistentDisk>) -> Option<&'a PersistentDisk> {
    disks.max_by(|a, b| {
        a.created_at()
            .cmp(&b.created_at())
            .then_with(|| a.name.cmp(&b.name))
    })
}
