//! # Data Movement Pipeline Seam
//!
//! The balancer never copies bytes itself. It starts and aborts movements
//! through [`DataMover`] and learns about progress from [`PipelineEvent`]s
//! the pipeline sends through a [`PipelineReporter`].

use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::debug;

use crate::error::{BalancerError, BalancerResult};
use crate::models::{MovementId, MovementRecord, PipelineTelemetry};
use crate::state_machine::MovementEvent;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PipelineError {
    #[error("Pipeline rejected movement {movement_id}: {reason}")]
    Rejected {
        movement_id: MovementId,
        reason: String,
    },
    #[error("Pipeline has no movement {0}")]
    UnknownMovement(MovementId),
    #[error("Pipeline unavailable: {0}")]
    Unavailable(String),
}

/// Progress report from the pipeline for one movement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PipelineEvent {
    Started {
        movement_id: MovementId,
    },
    CaughtUp {
        movement_id: MovementId,
        switch_version: u64,
    },
    SwitchStarted {
        movement_id: MovementId,
    },
    Switched {
        movement_id: MovementId,
    },
    Failed {
        movement_id: MovementId,
        reason: String,
    },
}

impl PipelineEvent {
    pub fn movement_id(&self) -> MovementId {
        match self {
            Self::Started { movement_id }
            | Self::CaughtUp { movement_id, .. }
            | Self::SwitchStarted { movement_id }
            | Self::Switched { movement_id }
            | Self::Failed { movement_id, .. } => *movement_id,
        }
    }

    /// State-machine event this report translates to
    pub fn to_movement_event(&self) -> MovementEvent {
        match self {
            Self::Started { .. } => MovementEvent::Start,
            Self::CaughtUp { switch_version, .. } => MovementEvent::ReadyForSwitch {
                switch_version: *switch_version,
            },
            Self::SwitchStarted { .. } => MovementEvent::BeginSwitch,
            Self::Switched { .. } => MovementEvent::Complete,
            Self::Failed { reason, .. } => MovementEvent::fail_with_error(reason.clone()),
        }
    }
}

#[async_trait]
pub trait DataMover: Send + Sync {
    /// Begin copying the tenant described by `record` to its destination
    async fn start_movement(&self, record: &MovementRecord) -> Result<(), PipelineError>;

    /// Stop the movement and discard anything written to the destination
    async fn abort_movement(&self, movement_id: MovementId) -> Result<(), PipelineError>;

    /// Current lag measurements; `None` when nothing has been measured yet
    async fn telemetry(
        &self,
        movement_id: MovementId,
    ) -> Result<Option<PipelineTelemetry>, PipelineError>;
}

/// Sending half of the pipeline progress channel
#[derive(Debug, Clone)]
pub struct PipelineReporter {
    sender: mpsc::Sender<PipelineEvent>,
}

impl PipelineReporter {
    pub fn new(sender: mpsc::Sender<PipelineEvent>) -> Self {
        Self { sender }
    }

    pub async fn report(&self, event: PipelineEvent) -> BalancerResult<()> {
        debug!(
            movement_id = %event.movement_id(),
            event = ?event,
            "Reporting pipeline progress"
        );
        self.sender.send(event).await.map_err(|_| {
            BalancerError::ServiceUnavailable("pipeline event channel closed".to_string())
        })
    }
}

/// Pipeline stand-in that records calls and serves injected telemetry.
/// Progress is reported by whoever drives it through a [`PipelineReporter`].
#[derive(Debug, Default)]
pub struct InMemoryDataMover {
    started: DashMap<MovementId, String>,
    aborted: DashSet<MovementId>,
    telemetry: DashMap<MovementId, PipelineTelemetry>,
    fail_starts: AtomicBool,
    fail_aborts: AtomicBool,
    fail_telemetry: AtomicBool,
}

impl InMemoryDataMover {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_telemetry(&self, movement_id: MovementId, telemetry: PipelineTelemetry) {
        self.telemetry.insert(movement_id, telemetry);
    }

    pub fn set_fail_starts(&self, fail: bool) {
        self.fail_starts.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_aborts(&self, fail: bool) {
        self.fail_aborts.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_telemetry(&self, fail: bool) {
        self.fail_telemetry.store(fail, Ordering::SeqCst);
    }

    pub fn is_started(&self, movement_id: MovementId) -> bool {
        self.started.contains_key(&movement_id)
    }

    pub fn is_aborted(&self, movement_id: MovementId) -> bool {
        self.aborted.contains(&movement_id)
    }

    pub fn started_count(&self) -> usize {
        self.started.len()
    }
}

#[async_trait]
impl DataMover for InMemoryDataMover {
    async fn start_movement(&self, record: &MovementRecord) -> Result<(), PipelineError> {
        if self.fail_starts.load(Ordering::SeqCst) {
            return Err(PipelineError::Rejected {
                movement_id: record.id,
                reason: format!("cluster {} refused the movement", record.destination_cluster),
            });
        }
        self.started
            .insert(record.id, record.destination_cluster.clone());
        Ok(())
    }

    async fn abort_movement(&self, movement_id: MovementId) -> Result<(), PipelineError> {
        if self.fail_aborts.load(Ordering::SeqCst) {
            return Err(PipelineError::Unavailable(
                "abort could not reach the destination".to_string(),
            ));
        }
        if !self.started.contains_key(&movement_id) {
            return Err(PipelineError::UnknownMovement(movement_id));
        }
        self.aborted.insert(movement_id);
        self.telemetry.remove(&movement_id);
        Ok(())
    }

    async fn telemetry(
        &self,
        movement_id: MovementId,
    ) -> Result<Option<PipelineTelemetry>, PipelineError> {
        if self.fail_telemetry.load(Ordering::SeqCst) {
            return Err(PipelineError::Unavailable("telemetry timed out".to_string()));
        }
        Ok(self.telemetry.get(&movement_id).map(|entry| *entry.value()))
    }
}
