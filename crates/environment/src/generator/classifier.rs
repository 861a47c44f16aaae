//! Delivery-path classification of generated events.

use super::GeneratorError;
use eventpass_types::{CellGroupId, EventKind, Gid};
use rand::Rng;
use std::sync::Arc;

/// Classifies events against `percent_spike` / `percent_ite` thresholds.
///
/// A uniform percentage `p` in `[0, 100)` is drawn per event:
///
/// - `p < percent_spike`: a spike to a random output gid of this rank
/// - `p < percent_spike + percent_ite`: an inter-thread event to a random
///   other cell group
/// - otherwise: a local event back to the generating cell group
#[derive(Debug, Clone, PartialEq)]
pub struct EventClassifier {
    percent_spike: u32,
    percent_ite: u32,
    cell_groups: u32,
    outputs: Arc<[Gid]>,
}

impl EventClassifier {
    pub fn new(
        percent_spike: u32,
        percent_ite: u32,
        cell_groups: u32,
        outputs: Arc<[Gid]>,
    ) -> Result<Self, GeneratorError> {
        if percent_spike as u64 + percent_ite as u64 > 100 {
            return Err(GeneratorError::PercentOverflow {
                spike: percent_spike,
                ite: percent_ite,
            });
        }
        if cell_groups == 0 {
            return Err(GeneratorError::NoCellGroups);
        }
        if percent_spike > 0 && outputs.is_empty() {
            return Err(GeneratorError::NoOutputs);
        }
        Ok(Self {
            percent_spike,
            percent_ite,
            cell_groups,
            outputs,
        })
    }

    pub fn cell_groups(&self) -> u32 {
        self.cell_groups
    }

    pub fn percent_spike(&self) -> u32 {
        self.percent_spike
    }

    pub fn percent_ite(&self) -> u32 {
        self.percent_ite
    }

    /// Pick the delivery path and target for an event from `source`.
    ///
    /// With a single cell group there is no other thread to send to, so
    /// inter-thread draws fall back to local delivery.
    pub fn classify(&self, source: CellGroupId, rng: &mut impl Rng) -> (EventKind, u32) {
        let percent = rng.gen_range(0..100u32);

        if percent < self.percent_spike {
            let gid = self.outputs[rng.gen_range(0..self.outputs.len())];
            (EventKind::Spike, gid.0)
        } else if percent < self.percent_spike + self.percent_ite && self.cell_groups > 1 {
            // Uniform over the other groups: draw from n-1 slots and skip self.
            let mut dst = rng.gen_range(0..self.cell_groups - 1);
            if dst >= source.0 {
                dst += 1;
            }
            (EventKind::InterThread, dst)
        } else {
            (EventKind::Local, source.0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn outputs() -> Arc<[Gid]> {
        (8..12).map(Gid).collect()
    }

    fn classify_many(classifier: &EventClassifier, source: u32, n: usize) -> Vec<(EventKind, u32)> {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        (0..n)
            .map(|_| classifier.classify(CellGroupId(source), &mut rng))
            .collect()
    }

    #[test]
    fn test_zero_ite_is_all_local() {
        let classifier = EventClassifier::new(0, 0, 6, outputs()).unwrap();
        for (kind, target) in classify_many(&classifier, 2, 1_000) {
            assert_eq!(kind, EventKind::Local);
            assert_eq!(target, 2);
        }
    }

    #[test]
    fn test_full_ite_never_targets_source() {
        let classifier = EventClassifier::new(0, 100, 6, outputs()).unwrap();
        let results = classify_many(&classifier, 3, 1_000);
        for (kind, target) in &results {
            assert_eq!(*kind, EventKind::InterThread);
            assert_ne!(*target, 3);
            assert!(*target < 6);
        }
        // Every other group is reachable.
        for g in [0, 1, 2, 4, 5] {
            assert!(results.iter().any(|(_, t)| *t == g));
        }
    }

    #[test]
    fn test_full_spike_targets_outputs() {
        let classifier = EventClassifier::new(100, 0, 2, outputs()).unwrap();
        for (kind, target) in classify_many(&classifier, 0, 500) {
            assert_eq!(kind, EventKind::Spike);
            assert!((8..12).contains(&target));
        }
    }

    #[test]
    fn test_single_group_ite_falls_back_to_local() {
        let classifier = EventClassifier::new(0, 100, 1, outputs()).unwrap();
        for (kind, target) in classify_many(&classifier, 0, 100) {
            assert_eq!((kind, target), (EventKind::Local, 0));
        }
    }

    #[test]
    fn test_mixed_thresholds_roughly_split() {
        let classifier = EventClassifier::new(25, 25, 4, outputs()).unwrap();
        let results = classify_many(&classifier, 0, 10_000);
        let spikes = results.iter().filter(|(k, _)| *k == EventKind::Spike).count();
        let ites = results.iter().filter(|(k, _)| *k == EventKind::InterThread).count();
        assert!((2_000..3_000).contains(&spikes), "spikes = {spikes}");
        assert!((2_000..3_000).contains(&ites), "ites = {ites}");
    }

    #[test]
    fn test_configuration_errors() {
        assert_eq!(
            EventClassifier::new(60, 41, 2, outputs()),
            Err(GeneratorError::PercentOverflow { spike: 60, ite: 41 })
        );
        assert_eq!(
            EventClassifier::new(10, 0, 2, Arc::from(Vec::new())),
            Err(GeneratorError::NoOutputs)
        );
        assert_eq!(
            EventClassifier::new(0, 0, 0, outputs()),
            Err(GeneratorError::NoCellGroups)
        );
        assert_eq!(
            EventClassifier::new(1, u32::MAX, 2, outputs()),
            Err(GeneratorError::PercentOverflow {
                spike: 1,
                ite: u32::MAX
            })
        );
        assert!(EventClassifier::new(0, 50, 2, Arc::from(Vec::new())).is_ok());
    }
}
