//! Baseline predictor capabilities
//!
//! Small self-contained classifiers so a host runs end-to-end without any
//! external ML stack. They stand in for the heavier algorithm families the
//! system was designed around; the coordinator treats them exactly like any
//! other [`Predictor`].

use std::collections::HashMap;

use super::dataset::Dataset;
use super::predictor::{Observation, Predictor, PredictorError, PredictorRegistry, PredictorResult};

/// Registry with the built-in baseline predictors
pub fn default_registry() -> PredictorRegistry {
    let mut registry = PredictorRegistry::new();
    registry.register("nearest_centroid", || Box::<NearestCentroid>::default());
    registry.register("knn", || Box::new(KNearest::new(5)));
    registry.register("decision_stump", || Box::<DecisionStump>::default());
    registry
}

fn squared_distance(a: Observation, b: Observation) -> f64 {
    let dt = a[0] - b[0];
    let dh = a[1] - b[1];
    dt * dt + dh * dh
}

/// Majority label; earlier entries win ties.
fn majority<'a>(labels: impl Iterator<Item = &'a str>) -> Option<String> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    let mut best: Option<&str> = None;
    let mut best_count = 0;

    for label in labels {
        let count = counts.entry(label).or_insert(0);
        *count += 1;
        if *count > best_count {
            best = Some(label);
            best_count = *count;
        }
    }

    best.map(str::to_string)
}

/// Classifies to the label whose per-class mean observation is closest.
#[derive(Debug, Default)]
pub struct NearestCentroid {
    centroids: Vec<(String, Observation)>,
}

impl Predictor for NearestCentroid {
    fn train(&mut self, data: &Dataset) -> PredictorResult<()> {
        if data.is_empty() {
            return Err(PredictorError::EmptyTrainingSet);
        }

        let mut sums: HashMap<&str, (f64, f64, usize)> = HashMap::new();
        for (observation, label) in data.observations.iter().zip(&data.labels) {
            let entry = sums.entry(label).or_insert((0.0, 0.0, 0));
            entry.0 += observation[0];
            entry.1 += observation[1];
            entry.2 += 1;
        }

        self.centroids = sums
            .into_iter()
            .map(|(label, (t, h, n))| (label.to_string(), [t / n as f64, h / n as f64]))
            .collect();
        self.centroids.sort_by(|a, b| a.0.cmp(&b.0));

        Ok(())
    }

    fn predict(&self, observation: Observation) -> PredictorResult<String> {
        self.centroids
            .iter()
            .min_by(|a, b| {
                squared_distance(observation, a.1).total_cmp(&squared_distance(observation, b.1))
            })
            .map(|(label, _)| label.clone())
            .ok_or(PredictorError::NotTrained)
    }
}

/// k-nearest-neighbour classifier over the raw training set.
#[derive(Debug)]
pub struct KNearest {
    k: usize,
    samples: Vec<(Observation, String)>,
}

impl KNearest {
    /// Create a classifier voting over the `k` nearest samples (minimum 1)
    pub fn new(k: usize) -> Self {
        Self {
            k: k.max(1),
            samples: Vec::new(),
        }
    }
}

impl Predictor for KNearest {
    fn train(&mut self, data: &Dataset) -> PredictorResult<()> {
        if data.is_empty() {
            return Err(PredictorError::EmptyTrainingSet);
        }

        self.samples = data
            .observations
            .iter()
            .zip(&data.labels)
            .map(|(observation, label)| (*observation, label.clone()))
            .collect();

        Ok(())
    }

    fn predict(&self, observation: Observation) -> PredictorResult<String> {
        if self.samples.is_empty() {
            return Err(PredictorError::NotTrained);
        }

        let mut by_distance: Vec<&(Observation, String)> = self.samples.iter().collect();
        by_distance.sort_by(|a, b| {
            squared_distance(observation, a.0).total_cmp(&squared_distance(observation, b.0))
        });

        // Ties resolve toward the nearest neighbours.
        majority(
            by_distance
                .iter()
                .take(self.k)
                .map(|(_, label)| label.as_str()),
        )
        .ok_or(PredictorError::NotTrained)
    }
}

#[derive(Debug, Clone)]
struct Stump {
    feature: usize,
    threshold: f64,
    below: String,
    above: String,
}

/// Single-feature threshold classifier.
///
/// Picks the feature/threshold pair with the fewest training
/// misclassifications, labeling each side with its majority label.
#[derive(Debug, Default)]
pub struct DecisionStump {
    stump: Option<Stump>,
}

impl DecisionStump {
    fn candidate(data: &Dataset, feature: usize, threshold: f64) -> Option<(Stump, usize)> {
        let side_labels = |below: bool| {
            data.observations
                .iter()
                .zip(&data.labels)
                .filter(move |(observation, _)| (observation[feature] <= threshold) == below)
                .map(|(_, label)| label.as_str())
        };

        let below = majority(side_labels(true))?;
        let above = majority(side_labels(false)).unwrap_or_else(|| below.clone());

        let correct = data
            .observations
            .iter()
            .zip(&data.labels)
            .filter(|(observation, label)| {
                let predicted = if observation[feature] <= threshold {
                    &below
                } else {
                    &above
                };
                *label == predicted
            })
            .count();

        Some((
            Stump {
                feature,
                threshold,
                below,
                above,
            },
            correct,
        ))
    }
}

impl Predictor for DecisionStump {
    fn train(&mut self, data: &Dataset) -> PredictorResult<()> {
        if data.is_empty() {
            return Err(PredictorError::EmptyTrainingSet);
        }

        let mut best: Option<(Stump, usize)> = None;

        for feature in 0..2 {
            let mut values: Vec<f64> = data.observations.iter().map(|o| o[feature]).collect();
            values.sort_by(f64::total_cmp);
            values.dedup();

            // Midpoints between adjacent distinct values, plus one threshold
            // below everything so single-valued features still split.
            let mut thresholds: Vec<f64> =
                values.windows(2).map(|w| (w[0] + w[1]) / 2.0).collect();
            thresholds.push(values[0] - 1.0);

            for threshold in thresholds {
                if let Some((stump, correct)) = Self::candidate(data, feature, threshold) {
                    if best.as_ref().is_none_or(|(_, c)| correct > *c) {
                        best = Some((stump, correct));
                    }
                }
            }
        }

        match best {
            Some((stump, _)) => {
                self.stump = Some(stump);
                Ok(())
            }
            None => Err(PredictorError::Training(
                "no usable split found".to_string(),
            )),
        }
    }

    fn predict(&self, observation: Observation) -> PredictorResult<String> {
        let stump = self.stump.as_ref().ok_or(PredictorError::NotTrained)?;

        if observation[stump.feature] <= stump.threshold {
            Ok(stump.below.clone())
        } else {
            Ok(stump.above.clone())
        }
    }
}
