//! Ensemble coordinator - profile switching and background retraining
//!
//! The coordinator owns the live set of trained predictor slots and retrains
//! the whole ensemble whenever the active profile changes. Training runs on
//! a blocking task so the link read loop never stalls behind it, and every
//! job carries a generation number: a job only installs its result if no
//! newer profile switch has been requested since it started, so the live
//! slot map is always one full generation, never a mix of two.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use chrono::Utc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::events::{EnsembleEvent, SharedEnsembleBus};

use super::dataset::{DatasetSource, Profile};
use super::predictor::{Observation, Predictor, PredictorRegistry, SlotPrediction};

/// Live predictor slots, swapped whole on a successful retrain
type SlotMap = BTreeMap<String, Box<dyn Predictor>>;

/// Shared reference to EnsembleCoordinator
pub type SharedEnsembleCoordinator = Arc<EnsembleCoordinator>;

/// State shared between the coordinator handle and its training jobs
struct TrainingState {
    active_profile: Mutex<Option<Profile>>,
    latest_generation: AtomicU64,
    slots: RwLock<Arc<SlotMap>>,
}

/// Coordinates a named ensemble of predictors and its background retraining
pub struct EnsembleCoordinator {
    registry: PredictorRegistry,
    datasets: Arc<dyn DatasetSource>,
    events: SharedEnsembleBus,
    state: Arc<TrainingState>,
}

impl EnsembleCoordinator {
    /// Create a coordinator over `registry`, loading datasets from `datasets`
    pub fn new(
        registry: PredictorRegistry,
        datasets: Arc<dyn DatasetSource>,
        events: SharedEnsembleBus,
    ) -> Self {
        Self {
            registry,
            datasets,
            events,
            state: Arc::new(TrainingState {
                active_profile: Mutex::new(None),
                latest_generation: AtomicU64::new(0),
                slots: RwLock::new(Arc::new(SlotMap::new())),
            }),
        }
    }

    /// Create a shared reference to this coordinator
    pub fn shared(self) -> SharedEnsembleCoordinator {
        Arc::new(self)
    }

    /// The profile most recently requested, if any
    pub fn active_profile(&self) -> Option<Profile> {
        *self
            .state
            .active_profile
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether any trained predictor set has been installed yet
    pub fn is_trained(&self) -> bool {
        !self.live_slots().is_empty()
    }

    fn live_slots(&self) -> Arc<SlotMap> {
        self.state
            .slots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Ask every registered slot to classify `observation`.
    ///
    /// Slots without a trained predictor answer
    /// [`SlotPrediction::NotAvailable`]; a predictor failing during inference
    /// yields [`SlotPrediction::Failed`] for that slot only. Never errors.
    pub fn predict_all(&self, observation: Observation) -> BTreeMap<String, SlotPrediction> {
        let slots = self.live_slots();

        self.registry
            .names()
            .map(|name| {
                let prediction = match slots.get(name) {
                    None => SlotPrediction::NotAvailable,
                    Some(predictor) => match predictor.predict(observation) {
                        Ok(label) => SlotPrediction::Label(label),
                        Err(e) => {
                            warn!(slot = name, error = %e, "Predictor failed during inference");
                            SlotPrediction::Failed
                        }
                    },
                };
                (name.to_string(), prediction)
            })
            .collect()
    }

    /// Switch the active profile and retrain the ensemble in the background.
    ///
    /// A no-op when `profile` is already active. Returns the handle of the
    /// spawned training job so callers can await it when they need to;
    /// dropping the handle leaves the job running. While the job is in
    /// flight, [`Self::predict_all`] keeps serving the previous slot map.
    pub fn switch_profile(&self, profile: Profile) -> Option<JoinHandle<()>> {
        {
            let mut active = self
                .state
                .active_profile
                .lock()
                .unwrap_or_else(PoisonError::into_inner);

            if *active == Some(profile) {
                debug!(%profile, "Profile unchanged; skipping retrain");
                return None;
            }
            *active = Some(profile);
        }

        let generation = self.state.latest_generation.fetch_add(1, Ordering::SeqCst) + 1;
        info!(%profile, generation, "Profile switched; retraining ensemble");

        self.events.publish(EnsembleEvent::TrainingStarted {
            profile,
            generation,
            timestamp: Utc::now(),
        });

        if self.registry.is_empty() {
            self.events.publish(EnsembleEvent::TrainingFailed {
                profile,
                generation,
                reason: "no predictors registered".to_string(),
                timestamp: Utc::now(),
            });
            return None;
        }

        let job = TrainingJob {
            registry: self.registry.clone(),
            datasets: self.datasets.clone(),
            events: self.events.clone(),
            state: self.state.clone(),
            profile,
            generation,
        };

        Some(tokio::task::spawn_blocking(move || job.run()))
    }
}

/// One in-flight retrain of the whole ensemble
struct TrainingJob {
    registry: PredictorRegistry,
    datasets: Arc<dyn DatasetSource>,
    events: SharedEnsembleBus,
    state: Arc<TrainingState>,
    profile: Profile,
    generation: u64,
}

impl TrainingJob {
    fn run(self) {
        self.progress(format!("Loading {} data", self.profile));

        let dataset = match self.datasets.load(self.profile) {
            Ok(dataset) => dataset,
            Err(e) => {
                warn!(profile = %self.profile, error = %e, "Training aborted: dataset load failed");
                self.events.publish(EnsembleEvent::TrainingFailed {
                    profile: self.profile,
                    generation: self.generation,
                    reason: e.to_string(),
                    timestamp: Utc::now(),
                });
                return;
            }
        };

        let total = self.registry.len();
        let mut trained = SlotMap::new();
        let mut failed = 0usize;

        for (index, (name, factory)) in self.registry.iter().enumerate() {
            self.progress(format!("Training {name} ({}/{total})", index + 1));

            let mut predictor = factory();
            match predictor.train(&dataset) {
                Ok(()) => {
                    trained.insert(name.to_string(), predictor);
                }
                Err(e) => {
                    // One failing slot never aborts training of its siblings.
                    warn!(slot = name, profile = %self.profile, error = %e, "Slot failed to train");
                    failed += 1;
                }
            }
        }

        if trained.is_empty() {
            self.events.publish(EnsembleEvent::TrainingFailed {
                profile: self.profile,
                generation: self.generation,
                reason: "every slot failed to train".to_string(),
                timestamp: Utc::now(),
            });
            return;
        }

        let slots_trained = trained.len();

        // Install under the write lock, re-checking the generation there so
        // a superseded job can never overwrite a newer job's result.
        {
            let mut slots = self
                .state
                .slots
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            let latest = self.state.latest_generation.load(Ordering::SeqCst);

            if latest != self.generation {
                info!(
                    profile = %self.profile,
                    generation = self.generation,
                    latest,
                    "Discarding superseded training result"
                );
                self.events.publish(EnsembleEvent::TrainingSuperseded {
                    profile: self.profile,
                    generation: self.generation,
                    latest_generation: latest,
                    timestamp: Utc::now(),
                });
                return;
            }

            *slots = Arc::new(trained);
        }

        info!(
            profile = %self.profile,
            generation = self.generation,
            slots_trained,
            slots_failed = failed,
            "Ensemble training complete"
        );
        self.events.publish(EnsembleEvent::TrainingCompleted {
            profile: self.profile,
            generation: self.generation,
            slots_trained,
            slots_failed: failed,
            timestamp: Utc::now(),
        });
    }

    fn progress(&self, stage: String) {
        self.events.publish(EnsembleEvent::TrainingProgress {
            profile: self.profile,
            generation: self.generation,
            stage,
            timestamp: Utc::now(),
        });
    }
}
