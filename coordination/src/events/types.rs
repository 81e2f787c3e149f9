//! Ensemble-side event payloads
//!
//! Everything a training job reports travels as one of these events. The
//! progress checkpoints ("loading data", "training <name> (i/total)",
//! completion or failure) match what the board-facing UI renders in its log
//! panel.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::bus::BusEvent;
use crate::ensemble::dataset::Profile;

/// Events published by the ensemble coordinator
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EnsembleEvent {
    /// A retrain was requested for a new active profile.
    TrainingStarted {
        profile: Profile,
        generation: u64,
        timestamp: DateTime<Utc>,
    },

    /// A human-readable progress checkpoint from a running training job.
    TrainingProgress {
        profile: Profile,
        generation: u64,
        stage: String,
        timestamp: DateTime<Utc>,
    },

    /// A training job finished and its predictor set was installed.
    TrainingCompleted {
        profile: Profile,
        generation: u64,
        slots_trained: usize,
        slots_failed: usize,
        timestamp: DateTime<Utc>,
    },

    /// A training job could not produce any predictors.
    TrainingFailed {
        profile: Profile,
        generation: u64,
        reason: String,
        timestamp: DateTime<Utc>,
    },

    /// A finished job was discarded because a newer profile switch won.
    TrainingSuperseded {
        profile: Profile,
        generation: u64,
        latest_generation: u64,
        timestamp: DateTime<Utc>,
    },
}

impl EnsembleEvent {
    /// Timestamp the event was produced at
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::TrainingStarted { timestamp, .. }
            | Self::TrainingProgress { timestamp, .. }
            | Self::TrainingCompleted { timestamp, .. }
            | Self::TrainingFailed { timestamp, .. }
            | Self::TrainingSuperseded { timestamp, .. } => *timestamp,
        }
    }

    /// Generation of the training job the event belongs to
    pub fn generation(&self) -> u64 {
        match self {
            Self::TrainingStarted { generation, .. }
            | Self::TrainingProgress { generation, .. }
            | Self::TrainingCompleted { generation, .. }
            | Self::TrainingFailed { generation, .. }
            | Self::TrainingSuperseded { generation, .. } => *generation,
        }
    }
}

impl BusEvent for EnsembleEvent {
    fn event_type(&self) -> &'static str {
        match self {
            Self::TrainingStarted { .. } => "training_started",
            Self::TrainingProgress { .. } => "training_progress",
            Self::TrainingCompleted { .. } => "training_completed",
            Self::TrainingFailed { .. } => "training_failed",
            Self::TrainingSuperseded { .. } => "training_superseded",
        }
    }
}
