//! Sources of randomness for simulated participants

use parking_lot::Mutex;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

pub const DEFAULT_SUCCESS_PROBABILITY: f64 = 0.8;

/// Randomness a participant consults while answering requests.
pub trait Chance: Send + Sync {
    /// Network jitter in time units, at most `max_units`.
    fn jitter_units(&self, max_units: u32) -> u32;

    /// Whether an eligible participant is willing to vote `Yes`.
    fn prepare_succeeds(&self) -> bool;
}

pub struct RandomChance {
    rng: Mutex<SmallRng>,
    success_probability: f64,
}

impl RandomChance {
    pub fn new(success_probability: f64, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => SmallRng::seed_from_u64(seed),
            None => SmallRng::from_entropy(),
        };
        Self {
            rng: Mutex::new(rng),
            success_probability: success_probability.clamp(0.0, 1.0),
        }
    }
}

impl Default for RandomChance {
    fn default() -> Self {
        Self::new(DEFAULT_SUCCESS_PROBABILITY, None)
    }
}

impl Chance for RandomChance {
    fn jitter_units(&self, max_units: u32) -> u32 {
        self.rng.lock().gen_range(0..=max_units)
    }

    fn prepare_succeeds(&self) -> bool {
        self.rng.lock().gen_bool(self.success_probability)
    }
}

/// Deterministic outcome. Jitter is either absent or always at its bound.
#[derive(Debug, Clone, Copy)]
pub struct FixedChance {
    pub succeed: bool,
    pub max_jitter: bool,
}

impl FixedChance {
    pub fn always() -> Self {
        Self {
            succeed: true,
            max_jitter: false,
        }
    }

    pub fn never() -> Self {
        Self {
            succeed: false,
            max_jitter: false,
        }
    }

    pub fn with_max_jitter(mut self) -> Self {
        self.max_jitter = true;
        self
    }
}

impl Chance for FixedChance {
    fn jitter_units(&self, max_units: u32) -> u32 {
        if self.max_jitter {
            max_units
        } else {
            0
        }
    }

    fn prepare_succeeds(&self) -> bool {
        self.succeed
    }
}
