//! Coordination layer for the comfort host
//!
//! Owns everything on the far side of the link: the event bus background
//! tasks publish on, the ensemble of comfort predictors with its background
//! retraining, and the majority-vote decision aggregator.

pub mod ensemble;
pub mod events;

pub use ensemble::{
    default_registry, vote, CsvDatasetSource, DatasetSource, EnsembleCoordinator, Observation,
    Predictor, PredictorRegistry, Profile, SharedEnsembleCoordinator, SlotPrediction, VoteResult,
};
pub use events::{BusEvent, EnsembleBus, EnsembleEvent, EventBus, SharedEnsembleBus};
