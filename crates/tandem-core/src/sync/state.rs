//! Explicit scheduler state published to UIs.

use std::collections::BTreeMap;

use crate::planner::ItemKey;

/// Where the engine is in its pass lifecycle.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum SyncPhase {
    #[default]
    Idle,
    Planning,
    Executing,
    /// The last pass failed for these items; automatic passes are paused
    /// until a retry or a store change.
    Cooldown(BTreeMap<ItemKey, String>),
}

impl SyncPhase {
    pub const fn is_running(&self) -> bool {
        matches!(self, Self::Planning | Self::Executing)
    }

    pub fn errors(&self) -> Option<&BTreeMap<ItemKey, String>> {
        match self {
            Self::Cooldown(errors) => Some(errors),
            _ => None,
        }
    }
}

/// Coarse sync state for status indicators.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncState {
    Offline,
    Syncing,
    Synced,
    Error,
}

impl SyncState {
    pub fn from_phase(phase: &SyncPhase, remote_loaded: bool) -> Self {
        match phase {
            SyncPhase::Planning | SyncPhase::Executing => Self::Syncing,
            SyncPhase::Cooldown(_) => Self::Error,
            SyncPhase::Idle if remote_loaded => Self::Synced,
            SyncPhase::Idle => Self::Offline,
        }
    }
}
