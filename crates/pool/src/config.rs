//! Configuration types for a pool run.

use eventpass_environment::{
    ConnectivityBuilder, ConnectivityError, EventGenerator, FixedProbability, GeneratorError,
    GeneratorKind, Poisson, Uniform,
};
use eventpass_queueing::MailboxStrategy;
use eventpass_spike::{ExchangeMode, ProtocolKind};
use serde::Serialize;
use thiserror::Error;

/// Errors detected before the simulation loop starts.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("At least one cell group per rank is required")]
    NoCellGroups,

    #[error("min_delay must be at least one step")]
    ZeroMinDelay,

    #[error(transparent)]
    Connectivity(#[from] ConnectivityError),

    #[error(transparent)]
    Generator(#[from] GeneratorError),
}

/// Configuration for one rank's pool. Every rank of a run must use the same
/// configuration, since window boundaries are collective.
#[derive(Clone, Debug, Serialize)]
pub struct PoolConfig {
    /// Cell groups (worker threads) per rank.
    pub cell_groups: u32,

    /// Last simulated step. Steps `0..=simtime` are run.
    pub simtime: u64,

    /// Steps per exchange window.
    pub min_delay: u64,

    /// Events each cell group generates per step (fixed and uniform generators).
    pub events_per_step: u32,

    /// Percentage of events sent to another cell group.
    pub percent_ite: u32,

    /// Percentage of events sent as spikes to other ranks.
    pub percent_spike: u32,

    /// Output gids per rank.
    pub num_out: u32,

    /// Input gids per rank.
    pub num_in: u32,

    /// Cell groups each input gid feeds.
    pub netcons_per_input: u32,

    pub protocol: ProtocolKind,

    pub mode: ExchangeMode,

    pub mailbox: MailboxStrategy,

    pub generator: GeneratorKind,

    /// Poisson arrivals per cell group per step.
    pub poisson_lambda: f64,

    /// Steps between firings of the uniform generator.
    pub firing_interval: u64,

    /// Run a per-step compute kernel on every cell group.
    pub update_phase: bool,

    /// Random seed for deterministic runs.
    pub seed: u64,
}

impl PoolConfig {
    pub fn new(cell_groups: u32, simtime: u64) -> Self {
        Self {
            cell_groups,
            simtime,
            min_delay: 5,
            events_per_step: 10,
            percent_ite: 30,
            percent_spike: 30,
            num_out: 4,
            num_in: 12,
            netcons_per_input: 5,
            protocol: ProtocolKind::default(),
            mode: ExchangeMode::default(),
            mailbox: MailboxStrategy::default(),
            generator: GeneratorKind::default(),
            poisson_lambda: 1.0,
            firing_interval: 10,
            update_phase: false,
            seed: 12345,
        }
    }

    pub fn with_min_delay(mut self, min_delay: u64) -> Self {
        self.min_delay = min_delay;
        self
    }

    pub fn with_events_per_step(mut self, events: u32) -> Self {
        self.events_per_step = events;
        self
    }

    /// Set the inter-thread and spike percentages.
    pub fn with_percentages(mut self, percent_ite: u32, percent_spike: u32) -> Self {
        self.percent_ite = percent_ite;
        self.percent_spike = percent_spike;
        self
    }

    /// Set the connectivity shape.
    pub fn with_connectivity(mut self, num_out: u32, num_in: u32, netcons_per_input: u32) -> Self {
        self.num_out = num_out;
        self.num_in = num_in;
        self.netcons_per_input = netcons_per_input;
        self
    }

    pub fn with_protocol(mut self, protocol: ProtocolKind) -> Self {
        self.protocol = protocol;
        self
    }

    pub fn with_mode(mut self, mode: ExchangeMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_mailbox(mut self, mailbox: MailboxStrategy) -> Self {
        self.mailbox = mailbox;
        self
    }

    pub fn with_generator(mut self, generator: GeneratorKind) -> Self {
        self.generator = generator;
        self
    }

    pub fn with_poisson_lambda(mut self, lambda: f64) -> Self {
        self.poisson_lambda = lambda;
        self
    }

    pub fn with_firing_interval(mut self, interval: u64) -> Self {
        self.firing_interval = interval;
        self
    }

    pub fn with_update_phase(mut self, enabled: bool) -> Self {
        self.update_phase = enabled;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Steps simulated by a full run.
    pub fn total_steps(&self) -> u64 {
        self.simtime + 1
    }

    /// Exchange windows in a full run.
    pub fn total_windows(&self) -> u64 {
        self.total_steps().div_ceil(self.min_delay.max(1))
    }

    pub fn connectivity(&self) -> ConnectivityBuilder {
        ConnectivityBuilder::new(self.num_out, self.num_in, self.netcons_per_input)
            .with_seed(self.seed)
    }

    pub fn event_generator(&self) -> EventGenerator {
        match self.generator {
            GeneratorKind::FixedProbability => EventGenerator::FixedProbability(
                FixedProbability::new(self.events_per_step, self.simtime),
            ),
            GeneratorKind::Poisson => EventGenerator::Poisson(Poisson::new(self.poisson_lambda)),
            GeneratorKind::Uniform => EventGenerator::Uniform(Uniform::new(
                self.firing_interval,
                self.events_per_step,
            )),
        }
    }

    /// Check the configuration for a run of `num_ranks` ranks.
    pub fn validate(&self, num_ranks: u32) -> Result<(), ConfigError> {
        if self.cell_groups == 0 {
            return Err(ConfigError::NoCellGroups);
        }
        if self.min_delay == 0 {
            return Err(ConfigError::ZeroMinDelay);
        }
        if self.percent_spike as u64 + self.percent_ite as u64 > 100 {
            return Err(GeneratorError::PercentOverflow {
                spike: self.percent_spike,
                ite: self.percent_ite,
            }
            .into());
        }
        if self.percent_spike > 0 && self.num_out == 0 {
            return Err(GeneratorError::NoOutputs.into());
        }
        self.event_generator().validate()?;
        self.connectivity().validate(num_ranks)?;
        Ok(())
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self::new(8, 100)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid_for_four_ranks() {
        assert_eq!(PoolConfig::default().validate(4), Ok(()));
    }

    #[test]
    fn test_windows_cover_every_step() {
        let config = PoolConfig::new(2, 10).with_min_delay(5);
        assert_eq!(config.total_steps(), 11);
        assert_eq!(config.total_windows(), 3);

        let config = PoolConfig::new(2, 9).with_min_delay(5);
        assert_eq!(config.total_windows(), 2);
    }

    #[test]
    fn test_rejections() {
        assert_eq!(
            PoolConfig::new(0, 10).validate(1),
            Err(ConfigError::NoCellGroups)
        );
        assert_eq!(
            PoolConfig::new(2, 10).with_min_delay(0).validate(1),
            Err(ConfigError::ZeroMinDelay)
        );
        assert_eq!(
            PoolConfig::new(2, 10).with_percentages(70, 40).validate(4),
            Err(ConfigError::Generator(GeneratorError::PercentOverflow {
                spike: 40,
                ite: 70
            }))
        );
        assert_eq!(
            PoolConfig::new(2, 10)
                .with_connectivity(0, 0, 1)
                .validate(2),
            Err(ConfigError::Generator(GeneratorError::NoOutputs))
        );
        assert!(matches!(
            PoolConfig::new(2, 10)
                .with_connectivity(4, 13, 1)
                .validate(4),
            Err(ConfigError::Connectivity(
                ConnectivityError::NotEnoughInputs { .. }
            ))
        ));
        assert_eq!(
            PoolConfig::new(2, 10)
                .with_generator(GeneratorKind::Poisson)
                .with_poisson_lambda(-1.0)
                .validate(4),
            Err(ConfigError::Generator(GeneratorError::InvalidRate(-1.0)))
        );
    }

    #[test]
    fn test_percentages_near_u32_max_rejected() {
        let config = PoolConfig::new(2, 10)
            .with_connectivity(4, 0, 1)
            .with_percentages(u32::MAX, 1);
        assert_eq!(
            config.validate(1),
            Err(ConfigError::Generator(GeneratorError::PercentOverflow {
                spike: 1,
                ite: u32::MAX
            }))
        );
        assert!(PoolConfig::new(2, 10)
            .with_connectivity(4, 0, 1)
            .with_percentages(1, u32::MAX)
            .validate(1)
            .is_err());
    }

    #[test]
    fn test_single_rank_needs_no_inputs() {
        let config = PoolConfig::new(2, 10).with_connectivity(4, 0, 1);
        assert_eq!(config.validate(1), Ok(()));
        assert!(PoolConfig::new(2, 10).validate(1).is_err());
    }
}
