//! Deterministic, seed-driven generation of operation sequences.
//!
//! Generation is a pure function of `seed` plus a step index: every random
//! decision derives its own `ChaCha8Rng` from `seed` folded with a stream
//! tag and the step index, rather than threading a single mutable RNG
//! through the whole sequence. That's what lets the runner re-derive the
//! exact same fault-injection rolls independently of generation (see
//! `injector.rs`), and what lets shrinking regenerate a sub-sequence without
//! perturbing the randomness used for sequences before it.

use rand::Rng;
use rand_chacha::rand_core::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::config::{KeyStrategy, OperationKind, TestConfig, ValueStrategy};

/// Stream tag folded into the seed so generation and fault injection never
/// draw from the same derived stream even at the same step index.
pub(crate) const STREAM_LENGTH: u64 = 0;
pub(crate) const STREAM_STEP: u64 = 1;
pub(crate) const STREAM_FAULT: u64 = 2;
pub(crate) const STREAM_SHRINK: u64 = 3;

pub(crate) fn derive_rng(seed: u64, stream: u64, index: u64) -> ChaCha8Rng {
    let folded = seed
        ^ stream.wrapping_mul(0x9E3779B97F4A7C15)
        ^ index.wrapping_mul(0xBF58476D1CE4E5B9).wrapping_add(1);
    ChaCha8Rng::seed_from_u64(folded)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GeneratedOp {
    Set { key: Vec<u8>, value: Vec<u8> },
    Get { key: Vec<u8> },
    Del { key: Vec<u8> },
    Flush,
    Restart,
}

impl GeneratedOp {
    pub fn kind(&self) -> OperationKind {
        match self {
            GeneratedOp::Set { .. } => OperationKind::Set,
            GeneratedOp::Get { .. } => OperationKind::Get,
            GeneratedOp::Del { .. } => OperationKind::Del,
            GeneratedOp::Flush => OperationKind::Flush,
            GeneratedOp::Restart => OperationKind::Restart,
        }
    }
}

fn gen_lowercase(rng: &mut impl Rng, len: usize) -> Vec<u8> {
    (0..len).map(|_| rng.gen_range(b'a'..=b'z')).collect()
}

fn gen_key(strategy: &KeyStrategy, rng: &mut impl Rng, live: &[Vec<u8>], counter: &mut u64) -> Vec<u8> {
    match strategy {
        KeyStrategy::UniformRandom { min, max } => {
            let len = if max > min { rng.gen_range(*min..=*max) } else { *min };
            gen_lowercase(rng, len)
        }
        KeyStrategy::CollisionProne { rate } => {
            if !live.is_empty() && rng.gen::<f64>() < *rate {
                let mut key = live[rng.gen_range(0..live.len())].clone();
                if let Some(first) = key.first_mut() {
                    *first ^= 1;
                } else {
                    key.push(0);
                }
                key
            } else {
                let len = rng.gen_range(1..=8);
                gen_lowercase(rng, len)
            }
        }
        KeyStrategy::Sequential { prefix } => {
            let n = *counter;
            *counter += 1;
            format!("{prefix}{n:08}").into_bytes()
        }
    }
}

fn gen_value(strategy: &ValueStrategy, rng: &mut impl Rng) -> Vec<u8> {
    match strategy {
        ValueStrategy::Fixed(n) => vec![b'v'; *n],
        ValueStrategy::Variable { min, max } => {
            let len = if max > min { rng.gen_range(*min..=*max) } else { *min };
            gen_lowercase(rng, len)
        }
        ValueStrategy::RandomBinary { min, max } => {
            let len = if max > min { rng.gen_range(*min..=*max) } else { *min };
            (0..len).map(|_| rng.gen::<u8>()).collect()
        }
    }
}

/// Pick an existing key with probability 1/2 (to exercise hit paths on GET
/// and DEL), else synthesize a fresh one.
fn pick_existing_or_fresh(
    strategy: &KeyStrategy,
    rng: &mut impl Rng,
    live: &[Vec<u8>],
    counter: &mut u64,
) -> Vec<u8> {
    if !live.is_empty() && rng.gen_bool(0.5) {
        live[rng.gen_range(0..live.len())].clone()
    } else {
        gen_key(strategy, rng, live, counter)
    }
}

/// Generate a full sequence for `config` at `seed`. Pure function of its
/// inputs -- calling this twice with the same `config`/`seed` always
/// produces byte-identical output.
pub fn generate_sequence(config: &TestConfig, seed: u64) -> Vec<GeneratedOp> {
    let mut length_rng = derive_rng(seed, STREAM_LENGTH, 0);
    let len = if config.sequence_length.max > config.sequence_length.min {
        length_rng.gen_range(config.sequence_length.min..=config.sequence_length.max)
    } else {
        config.sequence_length.min
    };

    let mut live_keys: Vec<Vec<u8>> = Vec::new();
    let mut counter: u64 = 0;
    let mut ops = Vec::with_capacity(len);

    for step in 0..len {
        let mut rng = derive_rng(seed, STREAM_STEP, step as u64);
        let kind = config.operation_distribution.sample(rng.gen::<f64>());
        let op = match kind {
            OperationKind::Set => {
                let key = gen_key(&config.key_strategy, &mut rng, &live_keys, &mut counter);
                let value = gen_value(&config.value_strategy, &mut rng);
                if !live_keys.contains(&key) {
                    live_keys.push(key.clone());
                }
                GeneratedOp::Set { key, value }
            }
            OperationKind::Get => {
                let key = pick_existing_or_fresh(&config.key_strategy, &mut rng, &live_keys, &mut counter);
                GeneratedOp::Get { key }
            }
            OperationKind::Del => {
                let key = pick_existing_or_fresh(&config.key_strategy, &mut rng, &live_keys, &mut counter);
                live_keys.retain(|k| k != &key);
                GeneratedOp::Del { key }
            }
            OperationKind::Flush => GeneratedOp::Flush,
            OperationKind::Restart => GeneratedOp::Restart,
        };
        ops.push(op);
    }

    ops
}
