//! Download run state
//!
//! [`SyncRunState`] is owned by the download orchestrator and mutated only by
//! its coordinating task. Everything else sees clones.

use std::collections::BTreeSet;
use std::fmt::{self, Display, Formatter};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::errors::DomainError;
use super::newtypes::{MediaItemId, RunId};

/// Lifecycle status of a download run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    #[default]
    Idle,
    Running,
    Paused,
    Cancelled,
    Completed,
    /// Run aborted with a human-readable reason
    Error(String),
}

impl RunStatus {
    /// Whether the run has finished and will not change again
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Cancelled | Self::Completed | Self::Error(_))
    }

    /// Whether a run is currently in progress
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Running | Self::Paused)
    }

    /// Whether moving from `self` to `to` is a legal transition
    pub fn can_transition_to(&self, to: &RunStatus) -> bool {
        use RunStatus::*;
        match (self, to) {
            (Idle, Running) | (Idle, Error(_)) => true,
            (Running, Paused) | (Running, Completed) | (Running, Cancelled) | (Running, Error(_)) => {
                true
            }
            (Paused, Running) | (Paused, Cancelled) | (Paused, Error(_)) => true,
            _ => false,
        }
    }
}

impl Display for RunStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Running => write!(f, "running"),
            Self::Paused => write!(f, "paused"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::Completed => write!(f, "completed"),
            Self::Error(msg) => write!(f, "error: {}", msg),
        }
    }
}

/// Progress and status of the current (or last) download run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncRunState {
    pub run_id: Option<RunId>,
    pub status: RunStatus,
    pub total_items: usize,
    pub processed_items: usize,
    pub active_item_ids: BTreeSet<MediaItemId>,
    pub downloaded: usize,
    pub skipped: usize,
    pub failed: usize,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl SyncRunState {
    /// State of a freshly started run over `total_items` items
    pub fn begin(total_items: usize) -> Self {
        Self {
            run_id: Some(RunId::new()),
            status: RunStatus::Running,
            total_items,
            started_at: Some(Utc::now()),
            ..Self::default()
        }
    }

    /// Move to `to`, stamping `finished_at` on terminal states.
    ///
    /// # Errors
    /// Returns [`DomainError::InvalidState`] for an illegal transition; the
    /// state is left untouched.
    pub fn transition(&mut self, to: RunStatus) -> Result<(), DomainError> {
        if !self.status.can_transition_to(&to) {
            return Err(DomainError::InvalidState {
                from: self.status.to_string(),
                to: to.to_string(),
            });
        }
        if to.is_terminal() {
            self.finished_at = Some(Utc::now());
            self.active_item_ids.clear();
        }
        self.status = to;
        Ok(())
    }

    /// Rewrite a run left active by a crashed process as failed.
    ///
    /// Returns true if the state changed.
    pub fn mark_interrupted(&mut self) -> bool {
        if !self.status.is_active() {
            return false;
        }
        self.status = RunStatus::Error("interrupted".to_string());
        self.finished_at = Some(Utc::now());
        self.active_item_ids.clear();
        true
    }

    /// Items not yet processed
    pub fn remaining(&self) -> usize {
        self.total_items.saturating_sub(self.processed_items)
    }
}
