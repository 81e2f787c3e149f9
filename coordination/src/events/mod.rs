//! Event bus and event payloads
//!
//! The bus is the only channel background tasks use to reach presentation
//! code; no task ever mutates shared UI state directly.

pub mod bus;
pub mod types;

pub use bus::{BusEvent, EventBus, SharedEventBus};
pub use types::EnsembleEvent;

/// Bus carrying training-side events
pub type EnsembleBus = EventBus<EnsembleEvent>;

/// Shared reference to the training-side bus
pub type SharedEnsembleBus = SharedEventBus<EnsembleEvent>;
