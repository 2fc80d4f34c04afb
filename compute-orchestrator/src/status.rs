//! Lifecycle status enums and the eligibility policy applied to them.
//!
//! The control plane enforces which transitions are legal. The tables here only
//! decide which resources this crate will *attempt* to stop or delete, and are
//! kept in sync with the control plane's own definitions of stoppable and
//! deletable states.

use crate::error::{OrchestratorError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Eligibility predicates shared by every resource status enum.
pub trait LifecycleStatus: Copy + fmt::Debug + 'static {
    /// Every variant, in declaration order.
    const ALL: &'static [Self];

    fn can_stop(self) -> bool;
    fn can_delete(self) -> bool;

    /// Not yet terminal or failed.
    fn is_active(self) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RuntimeStatus {
    Creating,
    Running,
    Updating,
    Error,
    Stopping,
    Stopped,
    Starting,
    Deleting,
    Deleted,
    #[serde(other)]
    Unknown,
}

impl LifecycleStatus for RuntimeStatus {
    const ALL: &'static [Self] = &[
        Self::Creating,
        Self::Running,
        Self::Updating,
        Self::Error,
        Self::Stopping,
        Self::Stopped,
        Self::Starting,
        Self::Deleting,
        Self::Deleted,
        Self::Unknown,
    ];

    fn can_stop(self) -> bool {
        match self {
            Self::Running | Self::Starting | Self::Updating | Self::Unknown => true,
            Self::Creating
            | Self::Error
            | Self::Stopping
            | Self::Stopped
            | Self::Deleting
            | Self::Deleted => false,
        }
    }

    fn can_delete(self) -> bool {
        match self {
            Self::Running
            | Self::Starting
            | Self::Updating
            | Self::Error
            | Self::Stopping
            | Self::Stopped
            | Self::Unknown => true,
            Self::Creating | Self::Deleting | Self::Deleted => false,
        }
    }

    fn is_active(self) -> bool {
        match self {
            Self::Creating
            | Self::Running
            | Self::Updating
            | Self::Stopping
            | Self::Stopped
            | Self::Starting => true,
            Self::Error | Self::Deleting | Self::Deleted | Self::Unknown => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AppStatus {
    StatusUnspecified,
    Provisioning,
    Running,
    Error,
    Stopping,
    Stopped,
    Starting,
    Updating,
    Predeleting,
    Deleting,
    Deleted,
    /// Any status this crate does not know. Never acted on.
    #[serde(other)]
    Unrecognized,
}

impl LifecycleStatus for AppStatus {
    const ALL: &'static [Self] = &[
        Self::StatusUnspecified,
        Self::Provisioning,
        Self::Running,
        Self::Error,
        Self::Stopping,
        Self::Stopped,
        Self::Starting,
        Self::Updating,
        Self::Predeleting,
        Self::Deleting,
        Self::Deleted,
        Self::Unrecognized,
    ];

    // Apps cannot be stopped through this client.
    fn can_stop(self) -> bool {
        false
    }

    fn can_delete(self) -> bool {
        match self {
            Self::StatusUnspecified | Self::Running | Self::Error => true,
            Self::Provisioning
            | Self::Stopping
            | Self::Stopped
            | Self::Starting
            | Self::Updating
            | Self::Predeleting
            | Self::Deleting
            | Self::Deleted
            | Self::Unrecognized => false,
        }
    }

    fn is_active(self) -> bool {
        match self {
            Self::Provisioning
            | Self::Running
            | Self::Stopping
            | Self::Stopped
            | Self::Starting
            | Self::Updating => true,
            Self::StatusUnspecified
            | Self::Error
            | Self::Predeleting
            | Self::Deleting
            | Self::Deleted
            | Self::Unrecognized => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DiskStatus {
    Creating,
    Restoring,
    Ready,
    Failed,
    Deleting,
    Deleted,
    #[serde(other)]
    Error,
}

impl LifecycleStatus for DiskStatus {
    const ALL: &'static [Self] = &[
        Self::Creating,
        Self::Restoring,
        Self::Ready,
        Self::Failed,
        Self::Deleting,
        Self::Deleted,
        Self::Error,
    ];

    fn can_stop(self) -> bool {
        false
    }

    fn can_delete(self) -> bool {
        match self {
            Self::Failed | Self::Ready => true,
            Self::Creating | Self::Restoring | Self::Deleting | Self::Deleted | Self::Error => false,
        }
    }

    fn is_active(self) -> bool {
        match self {
            Self::Ready | Self::Creating | Self::Restoring => true,
            Self::Failed | Self::Deleting | Self::Deleted | Self::Error => false,
        }
    }
}

/// Fail with `InvalidState` unless `status` permits a stop.
pub fn ensure_stoppable<S: LifecycleStatus>(resource: &str, status: S) -> Result<()> {
    if status.can_stop() {
        Ok(())
    } else {
        Err(OrchestratorError::InvalidState(format!(
            "{resource} cannot be stopped while {status:?}"
        )))
    }
}

/// Fail with `InvalidState` unless `status` permits a delete.
pub fn ensure_deletable<S: LifecycleStatus>(resource: &str, status: S) -> Result<()> {
    if status.can_delete() {
        Ok(())
    } else {
        Err(OrchestratorError::InvalidState(format!(
            "{resource} cannot be deleted while {status:?}"
        )))
    }
}
