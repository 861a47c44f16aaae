//! Simulation environment: who talks to whom, and what gets said.
//!
//! - [`ConnectivityBuilder`] assigns each rank its output gids and a random,
//!   duplicate-free sample of other ranks' gids as inputs, each wired to a
//!   set of local cell groups.
//! - [`EventGenerator`] is the closed set of event-generation strategies.
//!   Each cell group draws from its own deterministic [`EventStream`].
//!
//! All randomness comes from `ChaCha8Rng` seeded from the run seed, with a
//! distinct stream per rank and cell group, so runs are reproducible.

mod connectivity;
mod generator;

pub use connectivity::{Connectivity, ConnectivityBuilder, ConnectivityError};
pub use generator::{
    EventClassifier, EventGenerator, EventSource, EventStream, FixedProbability, GeneratorError,
    GeneratorKind, Poisson, Uniform,
};

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

/// Stream id reserved for connectivity sampling.
const CONNECTIVITY_STREAM: u64 = 1 << 63;

/// Deterministic RNG for one (rank, stream) pair of a run.
pub(crate) fn seeded_rng(seed: u64, rank: u32, stream: u64) -> ChaCha8Rng {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    rng.set_stream(stream ^ ((rank as u64) << 32));
    rng
}
