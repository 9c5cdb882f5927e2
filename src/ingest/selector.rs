// src/ingest/selector.rs
use rand::seq::SliceRandom;

use crate::ingest::circuit::CircuitBreaker;
use crate::ingest::types::SubSource;

/// Sample `min(count, eligible)` distinct sub-sources uniformly at random
/// without replacement, excluding anything the circuit breaker has banned.
/// An empty result means the cycle no-ops for this source; it is not an
/// error.
pub fn select_sub_sources(
    pool: &[SubSource],
    count: usize,
    circuit: &CircuitBreaker,
) -> Vec<SubSource> {
    let mut eligible: Vec<SubSource> = pool
        .iter()
        .filter(|s| !circuit.is_banned(&s.name))
        .cloned()
        .collect();
    eligible.shuffle(&mut rand::rng());
    eligible.truncate(count);
    eligible
}
