//! Ensemble of comfort predictors
//!
//! A fixed set of named predictor slots trained against the active profile's
//! labeled dataset, plus the majority vote that reduces their independent
//! predictions to one decision.
//!
//! # Components
//!
//! - **Coordinator**: profile switching and generation-guarded background
//!   retraining; serves predictions from an atomically swapped slot map
//! - **Voting**: deterministic majority vote with explicit no-decision
//! - **Predictor**: the opaque train/predict capability and its registry
//! - **Dataset**: profiles and labeled dataset loading
//! - **Baseline**: small built-in classifiers so a host runs out of the box

pub mod baseline;
pub mod coordinator;
pub mod dataset;
pub mod predictor;
pub mod voting;

pub use baseline::default_registry;
pub use coordinator::{EnsembleCoordinator, SharedEnsembleCoordinator};
pub use dataset::{CsvDatasetSource, Dataset, DatasetError, DatasetResult, DatasetSource, Profile};
pub use predictor::{
    Observation, Predictor, PredictorError, PredictorRegistry, PredictorResult, SlotPrediction,
};
pub use voting::{vote, VoteResult, NO_DECISION};
