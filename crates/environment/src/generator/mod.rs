//! Event generation strategies.
//!
//! A strategy decides *when* a cell group generates events; the shared
//! [`EventClassifier`] decides *where* each one goes. Every cell group draws
//! from its own [`EventStream`], so streams can advance on different worker
//! threads without coordination.

mod classifier;
mod fixed;
mod poisson;
mod uniform;

pub use classifier::EventClassifier;
pub use fixed::FixedProbability;
pub use poisson::Poisson;
pub use uniform::Uniform;

use crate::seeded_rng;
use eventpass_types::{CellGroupId, GeneratedEvent};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Generator configuration errors.
#[derive(Debug, Error, PartialEq)]
pub enum GeneratorError {
    #[error("percent_spike ({spike}) + percent_ite ({ite}) exceeds 100")]
    PercentOverflow { spike: u32, ite: u32 },

    #[error("Spike events requested but this rank owns no output gids")]
    NoOutputs,

    #[error("At least one cell group is required")]
    NoCellGroups,

    #[error("Poisson rate must be in (0, {max}] events per step, got {0}", max = Poisson::MAX_RATE)]
    InvalidRate(f64),

    #[error("Firing interval must be at least one step")]
    InvalidInterval,
}

/// Strategy selector, as exposed to configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GeneratorKind {
    /// A fixed number of events per step with random future times.
    #[default]
    FixedProbability,
    /// Exponential inter-arrival times.
    Poisson,
    /// Periodic firing.
    Uniform,
}

impl fmt::Display for GeneratorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GeneratorKind::FixedProbability => write!(f, "fixed"),
            GeneratorKind::Poisson => write!(f, "poisson"),
            GeneratorKind::Uniform => write!(f, "uniform"),
        }
    }
}

/// The closed set of event-generation strategies.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EventGenerator {
    FixedProbability(FixedProbability),
    Poisson(Poisson),
    Uniform(Uniform),
}

impl EventGenerator {
    pub fn kind(&self) -> GeneratorKind {
        match self {
            EventGenerator::FixedProbability(_) => GeneratorKind::FixedProbability,
            EventGenerator::Poisson(_) => GeneratorKind::Poisson,
            EventGenerator::Uniform(_) => GeneratorKind::Uniform,
        }
    }

    /// Check the strategy parameters.
    pub fn validate(&self) -> Result<(), GeneratorError> {
        match self {
            EventGenerator::FixedProbability(_) => Ok(()),
            EventGenerator::Poisson(p) => p.validate(),
            EventGenerator::Uniform(u) => u.validate(),
        }
    }

    fn initial_state(&self, rng: &mut ChaCha8Rng) -> StreamState {
        match self {
            EventGenerator::FixedProbability(_) | EventGenerator::Uniform(_) => {
                StreamState::Stepped {
                    step: None,
                    emitted: 0,
                }
            }
            EventGenerator::Poisson(p) => StreamState::Arrival {
                next: p.first_arrival(rng),
            },
        }
    }

    /// Time of the next event generated during step `now`, if any remain.
    fn next_time(
        &self,
        state: &mut StreamState,
        rng: &mut ChaCha8Rng,
        source: CellGroupId,
        now: u64,
    ) -> Option<f64> {
        match (self, state) {
            (EventGenerator::FixedProbability(f), StreamState::Stepped { step, emitted }) => {
                if *step != Some(now) {
                    *step = Some(now);
                    *emitted = 0;
                }
                if *emitted >= f.events_per_step {
                    return None;
                }
                *emitted += 1;
                Some(f.event_time(rng, now))
            }
            (EventGenerator::Poisson(p), StreamState::Arrival { next }) => {
                p.next_in_step(rng, next, now)
            }
            (EventGenerator::Uniform(u), StreamState::Stepped { step, emitted }) => {
                if *step != Some(now) {
                    *step = Some(now);
                    *emitted = 0;
                }
                if !u.fires(source, now) || *emitted >= u.events_per_step {
                    return None;
                }
                *emitted += 1;
                Some(now as f64)
            }
            _ => unreachable!("stream state does not match its generator"),
        }
    }
}

/// Per-stream bookkeeping, shaped by the strategy that owns it.
#[derive(Debug, Clone, Copy)]
enum StreamState {
    /// Events counted per step.
    Stepped { step: Option<u64>, emitted: u32 },
    /// Time of the next pending arrival.
    Arrival { next: f64 },
}

/// A deterministic, restartable event sequence for one cell group.
#[derive(Debug, Clone)]
pub struct EventStream {
    source: CellGroupId,
    generator: EventGenerator,
    classifier: EventClassifier,
    state: StreamState,
    rng: ChaCha8Rng,
}

impl EventStream {
    fn new(
        generator: EventGenerator,
        classifier: EventClassifier,
        seed: u64,
        rank: u32,
        source: CellGroupId,
    ) -> Self {
        let mut rng = seeded_rng(seed, rank, source.0 as u64);
        let state = generator.initial_state(&mut rng);
        Self {
            source,
            generator,
            classifier,
            state,
            rng,
        }
    }

    pub fn source(&self) -> CellGroupId {
        self.source
    }

    /// Next event this cell group generates during step `now`.
    ///
    /// Returns `None` once the step is exhausted; callers loop until then.
    /// Steps must be visited in non-decreasing order.
    pub fn next_event(&mut self, now: u64) -> Option<GeneratedEvent> {
        let time = self
            .generator
            .next_time(&mut self.state, &mut self.rng, self.source, now)?;
        let (kind, target) = self.classifier.classify(self.source, &mut self.rng);
        Some(GeneratedEvent {
            source: self.source,
            target,
            time,
            kind,
        })
    }
}

/// A generator bound to a rank: hands out one stream per cell group.
#[derive(Debug, Clone)]
pub struct EventSource {
    generator: EventGenerator,
    classifier: EventClassifier,
    seed: u64,
    rank: u32,
    streams: Vec<EventStream>,
}

impl EventSource {
    pub fn new(
        generator: EventGenerator,
        classifier: EventClassifier,
        seed: u64,
        rank: u32,
    ) -> Result<Self, GeneratorError> {
        generator.validate()?;
        let mut source = Self {
            generator,
            classifier,
            seed,
            rank,
            streams: Vec::new(),
        };
        source.restart();
        Ok(source)
    }

    pub fn generator(&self) -> &EventGenerator {
        &self.generator
    }

    pub fn classifier(&self) -> &EventClassifier {
        &self.classifier
    }

    /// Fresh stream for `cell_group`, starting from the beginning.
    pub fn stream(&self, cell_group: CellGroupId) -> EventStream {
        EventStream::new(
            self.generator,
            self.classifier.clone(),
            self.seed,
            self.rank,
            cell_group,
        )
    }

    /// Reset every held stream to its beginning.
    pub fn restart(&mut self) {
        self.streams = (0..self.classifier.cell_groups())
            .map(|g| self.stream(CellGroupId(g)))
            .collect();
    }

    /// Next event for `cell_group` during step `now`.
    pub fn next_for(&mut self, cell_group: CellGroupId, now: u64) -> Option<GeneratedEvent> {
        self.streams.get_mut(cell_group.index())?.next_event(now)
    }

    /// Hand the per-group streams to their worker threads.
    pub fn into_streams(self) -> Vec<EventStream> {
        self.streams
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use eventpass_types::{EventKind, Gid};
    use std::sync::Arc;

    fn outputs() -> Arc<[Gid]> {
        (100..104).map(Gid).collect()
    }

    fn step_events(source: &mut EventSource, group: u32, now: u64) -> Vec<GeneratedEvent> {
        std::iter::from_fn(|| source.next_for(CellGroupId(group), now)).collect()
    }

    #[test]
    fn test_fixed_yields_events_per_step() {
        let classifier = EventClassifier::new(20, 30, 4, outputs()).unwrap();
        let generator = EventGenerator::FixedProbability(FixedProbability::new(5, 100));
        let mut source = EventSource::new(generator, classifier, 1, 0).unwrap();

        for now in 0..10 {
            for group in 0..4 {
                let events = step_events(&mut source, group, now);
                assert_eq!(events.len(), 5);
                assert!(events.iter().all(|e| e.time >= now as f64));
                assert!(events.iter().all(|e| e.source == CellGroupId(group)));
            }
        }
    }

    #[test]
    fn test_restart_replays_identically() {
        let classifier = EventClassifier::new(10, 40, 3, outputs()).unwrap();
        let generator = EventGenerator::Poisson(Poisson::new(2.5));
        let mut source = EventSource::new(generator, classifier, 77, 2).unwrap();

        let first: Vec<_> = (0..20).flat_map(|t| step_events(&mut source, 1, t)).collect();
        source.restart();
        let second: Vec<_> = (0..20).flat_map(|t| step_events(&mut source, 1, t)).collect();
        assert!(!first.is_empty());
        assert_eq!(first, second);

        let mut fresh = source.stream(CellGroupId(1));
        let mut third = Vec::new();
        for t in 0..20 {
            while let Some(e) = fresh.next_event(t) {
                third.push(e);
            }
        }
        assert_eq!(first, third);
    }

    #[test]
    fn test_streams_differ_between_groups() {
        let classifier = EventClassifier::new(0, 0, 2, outputs()).unwrap();
        let generator = EventGenerator::FixedProbability(FixedProbability::new(8, 1_000));
        let mut source = EventSource::new(generator, classifier, 5, 0).unwrap();
        let a: Vec<f64> = step_events(&mut source, 0, 0).iter().map(|e| e.time).collect();
        let b: Vec<f64> = step_events(&mut source, 1, 0).iter().map(|e| e.time).collect();
        assert_ne!(a, b);
    }

    #[test]
    fn test_invalid_strategy_rejected() {
        let classifier = EventClassifier::new(0, 0, 1, outputs()).unwrap();
        let err = EventSource::new(
            EventGenerator::Poisson(Poisson::new(0.0)),
            classifier.clone(),
            1,
            0,
        )
        .unwrap_err();
        assert_eq!(err, GeneratorError::InvalidRate(0.0));

        let err = EventSource::new(
            EventGenerator::Uniform(Uniform::new(0, 1)),
            classifier,
            1,
            0,
        )
        .unwrap_err();
        assert_eq!(err, GeneratorError::InvalidInterval);
    }

    #[test]
    fn test_unknown_group_yields_nothing() {
        let classifier = EventClassifier::new(0, 0, 1, outputs()).unwrap();
        let generator = EventGenerator::FixedProbability(FixedProbability::new(1, 10));
        let mut source = EventSource::new(generator, classifier, 1, 0).unwrap();
        assert!(source.next_for(CellGroupId(5), 0).is_none());
        assert_eq!(
            source.next_for(CellGroupId(0), 0).map(|e| e.kind),
            Some(EventKind::Local)
        );
    }
}
