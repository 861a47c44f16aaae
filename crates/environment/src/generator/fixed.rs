//! Fixed number of events per step.

use rand::Rng;

/// Each cell group generates exactly `events_per_step` events every step.
///
/// For runs longer than ten steps, event times are drawn uniformly from
/// `[now, now + simtime / 10)`. Shorter runs schedule every event one step
/// ahead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedProbability {
    pub events_per_step: u32,
    horizon: Option<u64>,
}

impl FixedProbability {
    pub fn new(events_per_step: u32, simtime: u64) -> Self {
        let horizon = (simtime > 10).then_some(simtime / 10);
        Self {
            events_per_step,
            horizon,
        }
    }

    /// Width of the future window event times are drawn from.
    pub fn horizon(&self) -> Option<u64> {
        self.horizon
    }

    pub(super) fn event_time(&self, rng: &mut impl Rng, now: u64) -> f64 {
        let diff = match self.horizon {
            Some(horizon) => rng.gen_range(0..horizon),
            None => 1,
        };
        (now + diff) as f64
    }
}
