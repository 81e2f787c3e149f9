//! Predictor capability interface
//!
//! Each algorithm family is an opaque capability behind the [`Predictor`]
//! trait; the coordinator never sees its internals. Slots are named, and the
//! registry maps names to factories so every retrain starts from freshly
//! built, untrained instances.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::ensemble::dataset::Dataset;

/// One observation handed to a predictor: temperature (°C) and relative
/// humidity (%).
pub type Observation = [f64; 2];

/// Error type for predictor operations
#[derive(Debug, thiserror::Error)]
pub enum PredictorError {
    #[error("predictor has not been trained")]
    NotTrained,

    #[error("training set is empty")]
    EmptyTrainingSet,

    #[error("training failed: {0}")]
    Training(String),

    #[error("inference failed: {0}")]
    Inference(String),
}

/// Result type for predictor operations
pub type PredictorResult<T> = Result<T, PredictorError>;

/// A trainable comfort classifier.
///
/// `train` fits the instance against a labeled dataset; `predict` maps one
/// observation to a comfort label (`"hot"`, `"comfortable"`, `"cold"`).
pub trait Predictor: Send + Sync {
    /// Fit the predictor against a labeled dataset
    fn train(&mut self, data: &Dataset) -> PredictorResult<()>;

    /// Classify a single observation
    fn predict(&self, observation: Observation) -> PredictorResult<String>;
}

/// Factory producing a fresh, untrained predictor instance
pub type PredictorFactory = Arc<dyn Fn() -> Box<dyn Predictor> + Send + Sync>;

/// Outcome of asking one slot for a prediction.
///
/// Stands in for the `"N/A"` / `"Error"` sentinels of the wire-facing UI:
/// `NotAvailable` means the slot has no trained predictor yet, `Failed`
/// means its predictor errored during inference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotPrediction {
    Label(String),
    NotAvailable,
    Failed,
}

impl SlotPrediction {
    /// The label, if the slot produced one
    pub fn label(&self) -> Option<&str> {
        match self {
            Self::Label(label) => Some(label),
            _ => None,
        }
    }
}

impl fmt::Display for SlotPrediction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Label(label) => write!(f, "{label}"),
            Self::NotAvailable => write!(f, "N/A"),
            Self::Failed => write!(f, "Error"),
        }
    }
}

/// Named registry of predictor factories.
///
/// Name order is the registry's iteration order (sorted), which keeps every
/// downstream report and vote deterministic.
#[derive(Clone, Default)]
pub struct PredictorRegistry {
    factories: BTreeMap<String, PredictorFactory>,
}

impl PredictorRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory under `name`, replacing any previous entry
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn() -> Box<dyn Predictor> + Send + Sync + 'static,
    {
        self.factories.insert(name.into(), Arc::new(factory));
    }

    /// Registered slot names, in sorted order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    /// Iterate `(name, factory)` pairs in sorted name order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &PredictorFactory)> {
        self.factories.iter().map(|(n, f)| (n.as_str(), f))
    }

    /// Number of registered slots
    pub fn len(&self) -> usize {
        self.factories.len()
    }

    /// Whether the registry has no slots
    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

impl fmt::Debug for PredictorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PredictorRegistry")
            .field("names", &self.factories.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Stub;

    impl Predictor for Stub {
        fn train(&mut self, _data: &Dataset) -> PredictorResult<()> {
            Ok(())
        }

        fn predict(&self, _observation: Observation) -> PredictorResult<String> {
            Ok("comfortable".to_string())
        }
    }

    #[test]
    fn test_registry_names_are_sorted() {
        let mut registry = PredictorRegistry::new();
        registry.register("zeta", || Box::new(Stub));
        registry.register("alpha", || Box::new(Stub));
        registry.register("mid", || Box::new(Stub));

        let names: Vec<_> = registry.names().collect();
        assert_eq!(names, vec!["alpha", "mid", "zeta"]);
    }

    #[test]
    fn test_slot_prediction_display() {
        assert_eq!(SlotPrediction::Label("hot".into()).to_string(), "hot");
        assert_eq!(SlotPrediction::NotAvailable.to_string(), "N/A");
        assert_eq!(SlotPrediction::Failed.to_string(), "Error");
    }
}
