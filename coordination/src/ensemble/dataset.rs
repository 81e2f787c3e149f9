//! Profiles and labeled dataset loading
//!
//! A profile names the comfort-sensitivity persona whose labeled dataset the
//! ensemble trains against. The provided source reads the per-profile CSV
//! files (`temperature,humidity,comfort_label`) from a data directory;
//! anything else (databases, synthetic data) can implement [`DatasetSource`].

use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::Serialize;
use tracing::warn;

use crate::ensemble::predictor::Observation;

/// Comfort-sensitivity persona selecting a training dataset.
///
/// Exactly one profile is active at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Profile {
    Normal,
    Hot,
    Cold,
}

impl Profile {
    /// All known profiles
    pub const ALL: [Profile; 3] = [Profile::Normal, Profile::Hot, Profile::Cold];

    /// File name of this profile's training dataset
    pub fn data_file(&self) -> &'static str {
        match self {
            Profile::Normal => "normal_person_data.csv",
            Profile::Hot => "hot_person_data.csv",
            Profile::Cold => "cold_person_data.csv",
        }
    }
}

impl fmt::Display for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Profile::Normal => write!(f, "Normal Person"),
            Profile::Hot => write!(f, "Hot Person"),
            Profile::Cold => write!(f, "Cold Person"),
        }
    }
}

impl FromStr for Profile {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "normal" => Ok(Profile::Normal),
            "hot" => Ok(Profile::Hot),
            "cold" => Ok(Profile::Cold),
            other => Err(format!(
                "unknown profile {other:?} (expected normal, hot or cold)"
            )),
        }
    }
}

/// A labeled training set: one comfort label per observation
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    pub observations: Vec<Observation>,
    pub labels: Vec<String>,
}

impl Dataset {
    /// Append one labeled observation
    pub fn push(&mut self, observation: Observation, label: impl Into<String>) {
        self.observations.push(observation);
        self.labels.push(label.into());
    }

    /// Number of labeled observations
    pub fn len(&self) -> usize {
        self.observations.len()
    }

    /// Whether the dataset holds no observations
    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }
}

/// Error type for dataset loading
#[derive(Debug, thiserror::Error)]
pub enum DatasetError {
    #[error("dataset file not found: {0}")]
    NotFound(PathBuf),

    #[error("failed to read dataset: {0}")]
    Io(#[from] std::io::Error),

    #[error("dataset for {profile} has no usable rows")]
    Empty { profile: Profile },
}

/// Result type for dataset loading
pub type DatasetResult<T> = Result<T, DatasetError>;

/// Capability that yields the labeled dataset for a profile
pub trait DatasetSource: Send + Sync {
    fn load(&self, profile: Profile) -> DatasetResult<Dataset>;
}

/// Dataset source reading per-profile CSV files from a directory.
///
/// Rows are `temperature,humidity,comfort_label`; a header row and malformed
/// rows are skipped with a warning rather than failing the whole load.
#[derive(Debug, Clone)]
pub struct CsvDatasetSource {
    data_dir: PathBuf,
}

impl CsvDatasetSource {
    /// Create a source rooted at `data_dir`
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        Self {
            data_dir: data_dir.as_ref().to_path_buf(),
        }
    }

    fn parse_row(line: &str) -> Option<(Observation, &str)> {
        let mut fields = line.split(',');
        let temperature: f64 = fields.next()?.trim().parse().ok()?;
        let humidity: f64 = fields.next()?.trim().parse().ok()?;
        let label = fields.next()?.trim();

        if label.is_empty() || fields.next().is_some() {
            return None;
        }

        Some(([temperature, humidity], label))
    }
}

impl DatasetSource for CsvDatasetSource {
    fn load(&self, profile: Profile) -> DatasetResult<Dataset> {
        let path = self.data_dir.join(profile.data_file());

        if !path.exists() {
            return Err(DatasetError::NotFound(path));
        }

        let reader = BufReader::new(File::open(&path)?);
        let mut dataset = Dataset::default();

        for (index, line) in reader.lines().enumerate() {
            let line = line?;
            let trimmed = line.trim();

            if trimmed.is_empty() {
                continue;
            }

            // The first row is usually the header; treat any unparsable row
            // the same way so one bad line never aborts a retrain.
            match Self::parse_row(trimmed) {
                Some((observation, label)) => dataset.push(observation, label),
                None if index == 0 => {}
                None => {
                    warn!(path = %path.display(), row = index + 1, "Skipping malformed dataset row");
                }
            }
        }

        if dataset.is_empty() {
            return Err(DatasetError::Empty { profile });
        }

        Ok(dataset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    fn write_dataset(dir: &Path, profile: Profile, content: &str) {
        let mut file = File::create(dir.join(profile.data_file())).unwrap();
        file.write_all(content.as_bytes()).unwrap();
    }

    #[test]
    fn test_load_csv_dataset() {
        let dir = tempdir().unwrap();
        write_dataset(
            dir.path(),
            Profile::Normal,
            "temperature,humidity,comfort_label\n21.0,45.0,comfortable\n30.5,70.0,hot\n",
        );

        let source = CsvDatasetSource::new(dir.path());
        let dataset = source.load(Profile::Normal).unwrap();

        assert_eq!(dataset.len(), 2);
        assert_eq!(dataset.observations[1], [30.5, 70.0]);
        assert_eq!(dataset.labels, vec!["comfortable", "hot"]);
    }

    #[test]
    fn test_malformed_rows_are_skipped() {
        let dir = tempdir().unwrap();
        write_dataset(
            dir.path(),
            Profile::Hot,
            "temperature,humidity,comfort_label\nnot,a,row\n25.0,50.0,hot\n19.0,40.0\n",
        );

        let source = CsvDatasetSource::new(dir.path());
        let dataset = source.load(Profile::Hot).unwrap();

        assert_eq!(dataset.len(), 1);
        assert_eq!(dataset.labels, vec!["hot"]);
    }

    #[test]
    fn test_missing_file_is_not_found() {
        let dir = tempdir().unwrap();
        let source = CsvDatasetSource::new(dir.path());

        assert!(matches!(
            source.load(Profile::Cold),
            Err(DatasetError::NotFound(_))
        ));
    }

    #[test]
    fn test_profile_round_trip() {
        for profile in Profile::ALL {
            let parsed: Profile = match profile {
                Profile::Normal => "normal".parse().unwrap(),
                Profile::Hot => "HOT".parse().unwrap(),
                Profile::Cold => "cold".parse().unwrap(),
            };
            assert_eq!(parsed, profile);
        }
        assert!("tepid".parse::<Profile>().is_err());
    }
}
