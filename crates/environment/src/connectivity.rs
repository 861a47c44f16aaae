//! Presynaptic connectivity assignment.
//!
//! Every rank owns `num_out` contiguous output gids: rank `r` owns
//! `[r * num_out, (r + 1) * num_out)`. Each rank then samples `num_in` input
//! gids without replacement from the outputs of all other ranks, and wires
//! each input to `netcons_per_input` distinct local cell groups.
//!
//! The assignment fixes the fan-in/fan-out topology for the whole run.

use crate::{seeded_rng, CONNECTIVITY_STREAM};
use eventpass_types::{CellGroupId, Gid, Rank};
use rand::seq::index::sample;
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;
use tracing::{debug, info};

/// Connectivity configuration errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConnectivityError {
    #[error("At least one rank is required")]
    NoRanks,

    #[error("At least one cell group per rank is required")]
    NoCellGroups,

    #[error("Rank {rank} out of range for {num_ranks} ranks")]
    RankOutOfRange { rank: u32, num_ranks: u32 },

    #[error(
        "Requested {requested} input gids but only {available} are owned by other ranks \
         ((ranks - 1) * num_out)"
    )]
    NotEnoughInputs { requested: u32, available: u64 },

    #[error("{num_ranks} ranks with {num_out} outputs each exceed the u32 gid space")]
    GidSpaceExhausted { num_ranks: u32, num_out: u32 },
}

/// Parameters for building a rank's [`Connectivity`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectivityBuilder {
    /// Output gids owned by each rank.
    pub num_out: u32,
    /// Input gids sampled by each rank.
    pub num_in: u32,
    /// Cell groups each input gid connects to.
    pub netcons_per_input: u32,
    /// Run seed.
    pub seed: u64,
}

impl ConnectivityBuilder {
    pub fn new(num_out: u32, num_in: u32, netcons_per_input: u32) -> Self {
        Self {
            num_out,
            num_in,
            netcons_per_input,
            seed: 12345,
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Check the assignment is satisfiable for `num_ranks`.
    pub fn validate(&self, num_ranks: u32) -> Result<(), ConnectivityError> {
        if num_ranks == 0 {
            return Err(ConnectivityError::NoRanks);
        }
        if num_ranks as u64 * self.num_out as u64 > u32::MAX as u64 {
            return Err(ConnectivityError::GidSpaceExhausted {
                num_ranks,
                num_out: self.num_out,
            });
        }
        let available = (num_ranks as u64 - 1) * self.num_out as u64;
        if self.num_in as u64 > available {
            return Err(ConnectivityError::NotEnoughInputs {
                requested: self.num_in,
                available,
            });
        }
        Ok(())
    }

    /// Build the connectivity of `rank`.
    pub fn build(
        &self,
        num_ranks: u32,
        cell_groups: u32,
        rank: Rank,
    ) -> Result<Connectivity, ConnectivityError> {
        self.validate(num_ranks)?;
        if cell_groups == 0 {
            return Err(ConnectivityError::NoCellGroups);
        }
        if rank.0 >= num_ranks {
            return Err(ConnectivityError::RankOutOfRange {
                rank: rank.0,
                num_ranks,
            });
        }

        let first = rank.0 * self.num_out;
        let outputs: BTreeSet<Gid> = (first..first + self.num_out).map(Gid).collect();

        let mut inputs = BTreeMap::new();
        if num_ranks > 1 && self.num_in > 0 {
            let available: Vec<Gid> = (0..num_ranks * self.num_out)
                .map(Gid)
                .filter(|gid| !outputs.contains(gid))
                .collect();

            let mut rng = seeded_rng(self.seed, rank.0, CONNECTIVITY_STREAM);
            let netcons = self.netcons_per_input.min(cell_groups) as usize;

            for index in sample(&mut rng, available.len(), self.num_in as usize) {
                let mut targets: Vec<CellGroupId> =
                    sample(&mut rng, cell_groups as usize, netcons)
                        .into_iter()
                        .map(|g| CellGroupId(g as u32))
                        .collect();
                targets.sort();
                inputs.insert(available[index], targets);
            }
        }

        let connectivity = Connectivity {
            rank,
            num_out: self.num_out,
            outputs,
            inputs,
        };

        info!(
            rank = rank.0,
            outputs = connectivity.outputs.len(),
            inputs = connectivity.inputs.len(),
            "Built connectivity"
        );
        debug!(rank = rank.0, inputs = ?connectivity.input_ids(), "Input gids");

        Ok(connectivity)
    }
}

/// A rank's view of the spike topology.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connectivity {
    rank: Rank,
    num_out: u32,
    /// Gids this rank generates spikes from.
    outputs: BTreeSet<Gid>,
    /// Gids this rank listens to -> local cell groups each one feeds.
    inputs: BTreeMap<Gid, Vec<CellGroupId>>,
}

impl Connectivity {
    pub fn rank(&self) -> Rank {
        self.rank
    }

    pub fn output_ids(&self) -> &BTreeSet<Gid> {
        &self.outputs
    }

    pub fn input_ids(&self) -> BTreeSet<Gid> {
        self.inputs.keys().copied().collect()
    }

    pub fn is_output(&self, gid: Gid) -> bool {
        self.outputs.contains(&gid)
    }

    /// Cell groups fed by input `gid`, or `None` if this rank doesn't listen to it.
    pub fn find_input(&self, gid: Gid) -> Option<&[CellGroupId]> {
        self.inputs.get(&gid).map(Vec::as_slice)
    }

    /// Rank owning `gid`.
    pub fn owner_of(&self, gid: Gid) -> Rank {
        gid.owner(self.num_out)
    }

    /// Ranks whose outputs this rank listens to.
    pub fn source_ranks(&self) -> BTreeSet<Rank> {
        self.inputs.keys().map(|gid| self.owner_of(*gid)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    #[test]
    #[traced_test]
    fn test_invariants_hold_for_every_rank() {
        let builder = ConnectivityBuilder::new(4, 10, 3).with_seed(7);
        for rank in 0..4 {
            let conn = builder.build(4, 8, Rank(rank)).unwrap();

            assert_eq!(conn.output_ids().len(), 4);
            assert_eq!(conn.input_ids().len(), 10);
            assert!(conn.input_ids().is_disjoint(conn.output_ids()));

            let first = rank * 4;
            assert!(conn
                .output_ids()
                .iter()
                .all(|gid| gid.0 >= first && gid.0 < first + 4));

            for gid in conn.input_ids() {
                let targets = conn.find_input(gid).unwrap();
                assert_eq!(targets.len(), 3);
                let unique: BTreeSet<_> = targets.iter().collect();
                assert_eq!(unique.len(), 3, "netcons must be distinct");
                assert!(targets.iter().all(|g| g.0 < 8));
                assert_ne!(conn.owner_of(gid), Rank(rank));
            }
        }
        assert!(logs_contain("Built connectivity"));
    }

    #[test]
    fn test_single_rank_has_no_inputs() {
        let conn = ConnectivityBuilder::new(5, 0, 2)
            .build(1, 4, Rank(0))
            .unwrap();
        assert_eq!(
            conn.output_ids().iter().map(|g| g.0).collect::<Vec<_>>(),
            vec![0, 1, 2, 3, 4]
        );
        assert!(conn.input_ids().is_empty());
        assert!(conn.source_ranks().is_empty());
    }

    #[test]
    fn test_all_available_inputs_can_be_taken() {
        let conn = ConnectivityBuilder::new(3, 6, 1)
            .build(3, 2, Rank(1))
            .unwrap();
        let expected: BTreeSet<Gid> = [0, 1, 2, 6, 7, 8].into_iter().map(Gid).collect();
        assert_eq!(conn.input_ids(), expected);
        assert_eq!(conn.source_ranks(), [Rank(0), Rank(2)].into_iter().collect());
    }

    #[test]
    fn test_too_many_inputs_rejected() {
        let err = ConnectivityBuilder::new(4, 13, 1)
            .build(4, 2, Rank(0))
            .unwrap_err();
        assert_eq!(
            err,
            ConnectivityError::NotEnoughInputs {
                requested: 13,
                available: 12
            }
        );

        let err = ConnectivityBuilder::new(4, 1, 1)
            .build(1, 2, Rank(0))
            .unwrap_err();
        assert!(matches!(err, ConnectivityError::NotEnoughInputs { .. }));
    }

    #[test]
    fn test_other_configuration_errors() {
        let builder = ConnectivityBuilder::new(2, 1, 1);
        assert_eq!(builder.build(0, 2, Rank(0)), Err(ConnectivityError::NoRanks));
        assert_eq!(
            builder.build(2, 0, Rank(0)),
            Err(ConnectivityError::NoCellGroups)
        );
        assert_eq!(
            builder.build(2, 2, Rank(2)),
            Err(ConnectivityError::RankOutOfRange {
                rank: 2,
                num_ranks: 2
            })
        );
    }

    #[test]
    fn test_gid_space_overflow_rejected() {
        let builder = ConnectivityBuilder::new(3_000_000_000, 0, 1);
        assert_eq!(
            builder.validate(2),
            Err(ConnectivityError::GidSpaceExhausted {
                num_ranks: 2,
                num_out: 3_000_000_000
            })
        );
        assert!(builder.build(2, 2, Rank(1)).is_err());
        assert!(builder.validate(1).is_ok());
    }

    #[test]
    fn test_netcons_capped_by_cell_groups() {
        let conn = ConnectivityBuilder::new(2, 2, 10)
            .build(2, 3, Rank(0))
            .unwrap();
        for gid in conn.input_ids() {
            assert_eq!(conn.find_input(gid).unwrap().len(), 3);
        }
    }

    #[test]
    fn test_same_seed_same_assignment() {
        let builder = ConnectivityBuilder::new(8, 12, 2).with_seed(99);
        let a = builder.build(4, 6, Rank(2)).unwrap();
        let b = builder.build(4, 6, Rank(2)).unwrap();
        assert_eq!(a, b);
    }
}
