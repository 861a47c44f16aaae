//! Periodic firing.

use super::GeneratorError;
use eventpass_types::CellGroupId;

/// Every cell group fires once per `firing_interval` steps, generating
/// `events_per_step` events stamped with the firing step. Groups are phase
/// shifted by their index so firings spread across the interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Uniform {
    pub firing_interval: u64,
    pub events_per_step: u32,
}

impl Uniform {
    pub fn new(firing_interval: u64, events_per_step: u32) -> Self {
        Self {
            firing_interval,
            events_per_step,
        }
    }

    pub(super) fn validate(&self) -> Result<(), GeneratorError> {
        if self.firing_interval == 0 {
            return Err(GeneratorError::InvalidInterval);
        }
        Ok(())
    }

    /// Whether `source` fires during step `now`.
    pub fn fires(&self, source: CellGroupId, now: u64) -> bool {
        (now + source.0 as u64) % self.firing_interval == 0
    }
}
