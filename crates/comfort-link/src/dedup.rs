//! Change-only notification filter
//!
//! The board repeats its status and action lines every cycle, and the host
//! re-sends the same decision on every sensor frame. Observers only care
//! when a value changes, so each category remembers the last text it let
//! through. State lives for the life of the session; comparison is exact.

use std::collections::HashMap;

/// Notification categories with independent last-seen state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    /// Inbound `Status:` frames
    Status,
    /// Inbound `Action:` frames
    Action,
    /// Outbound command notifications
    Command,
}

/// Per-category "did this value change since last emission" gate
#[derive(Debug, Default)]
pub struct DedupGate {
    last_seen: HashMap<Category, String>,
}

impl DedupGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `text` differs from the last emitted text in `category`.
    ///
    /// Returns `true` (and remembers `text`) on any change, including a
    /// return to an earlier value.
    pub fn should_emit(&mut self, category: Category, text: &str) -> bool {
        if self.last_seen.get(&category).is_some_and(|last| last == text) {
            return false;
        }

        self.last_seen.insert(category, text.to_string());
        true
    }
}
