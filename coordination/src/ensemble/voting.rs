//! Majority-vote decision aggregation
//!
//! Pure policy: unavailable and failed slots are discarded, the remaining
//! labels are counted, and the first label to reach the maximum count wins.
//! Predictions arrive in sorted slot-name order, so the tie-break is
//! deterministic across runs without any tie detection.

use std::collections::BTreeMap;
use std::collections::HashMap;

use tracing::debug;

use super::predictor::SlotPrediction;

/// Label returned when no slot produced a usable prediction
pub const NO_DECISION: &str = "N/A";

/// Outcome of one voting round
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoteResult {
    /// Winning label, or [`NO_DECISION`]
    pub label: String,
    /// Whether any usable predictions backed the label
    pub decisive: bool,
}

impl VoteResult {
    fn no_decision() -> Self {
        Self {
            label: NO_DECISION.to_string(),
            decisive: false,
        }
    }
}

/// Aggregate per-slot predictions into one decision.
///
/// Slots reporting [`SlotPrediction::NotAvailable`] or
/// [`SlotPrediction::Failed`] do not vote. With zero usable votes the result
/// is `{ "N/A", decisive: false }`.
pub fn vote(predictions: &BTreeMap<String, SlotPrediction>) -> VoteResult {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    let mut winner: Option<&str> = None;
    let mut winner_count = 0;

    for (slot, prediction) in predictions {
        let Some(label) = prediction.label() else {
            debug!(slot, prediction = %prediction, "Slot abstained from vote");
            continue;
        };

        let count = counts.entry(label).or_insert(0);
        *count += 1;

        if *count > winner_count {
            winner = Some(label);
            winner_count = *count;
        }
    }

    match winner {
        Some(label) => VoteResult {
            label: label.to_string(),
            decisive: true,
        },
        None => VoteResult::no_decision(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn predictions(entries: &[(&str, SlotPrediction)]) -> BTreeMap<String, SlotPrediction> {
        entries
            .iter()
            .map(|(name, p)| (name.to_string(), p.clone()))
            .collect()
    }

    fn label(text: &str) -> SlotPrediction {
        SlotPrediction::Label(text.to_string())
    }

    #[test]
    fn test_simple_majority() {
        let result = vote(&predictions(&[
            ("a", label("hot")),
            ("b", label("hot")),
            ("c", label("cold")),
        ]));

        assert_eq!(result.label, "hot");
        assert!(result.decisive);
    }

    #[test]
    fn test_all_abstaining_is_no_decision() {
        let result = vote(&predictions(&[
            ("a", SlotPrediction::NotAvailable),
            ("b", SlotPrediction::Failed),
        ]));

        assert_eq!(result.label, NO_DECISION);
        assert!(!result.decisive);
    }

    #[test]
    fn test_empty_is_no_decision() {
        let result = vote(&BTreeMap::new());
        assert_eq!(result.label, NO_DECISION);
        assert!(!result.decisive);
    }

    #[test]
    fn test_abstainers_do_not_dilute_majority() {
        let result = vote(&predictions(&[
            ("a", SlotPrediction::Failed),
            ("b", label("comfortable")),
            ("c", SlotPrediction::NotAvailable),
        ]));

        assert_eq!(result.label, "comfortable");
        assert!(result.decisive);
    }

    #[test]
    fn test_tie_break_is_first_to_max_in_name_order() {
        // Two labels at count 1 each; "b"'s label reached 1 first because
        // slots iterate in sorted name order.
        let result = vote(&predictions(&[
            ("c", label("cold")),
            ("b", label("hot")),
        ]));
        assert_eq!(result.label, "hot");

        // Same entries, different slot names: the other label wins.
        let result = vote(&predictions(&[
            ("a", label("cold")),
            ("b", label("hot")),
        ]));
        assert_eq!(result.label, "cold");
    }
}
