//! Randomness source for simulated outcomes.

#[cfg(test)]
use std::collections::VecDeque;
use std::sync::Mutex;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Narrow randomness capability injected into the simulated engines.
///
/// Implementors only provide uniform draws in `[0, 1)`; the derived helpers
/// are shared so a stub draw of `0.0` always means "the likely outcome".
pub trait RandomSource: Send + Sync {
    /// Next uniform draw in `[0, 1)`.
    fn next_f64(&self) -> f64;

    /// `true` with the given probability.
    fn next_bool(&self, probability: f64) -> bool {
        self.next_f64() < probability.clamp(0.0, 1.0)
    }

    /// Uniform integer in `[0, bound)`; `0` when `bound` is zero.
    fn below(&self, bound: u32) -> u32 {
        if bound == 0 {
            return 0;
        }
        ((self.next_f64() * f64::from(bound)) as u32).min(bound - 1)
    }
}

/// Production source backed by `StdRng`.
pub struct StdRandom {
    rng: Mutex<StdRng>,
}

impl StdRandom {
    pub fn from_entropy() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Reproducible source, used when `ONBOARD_RANDOM_SEED` is set.
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl RandomSource for StdRandom {
    fn next_f64(&self) -> f64 {
        let mut rng = self.rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        rng.r#gen::<f64>()
    }
}

/// Deterministic stub: replays queued draws, then repeats `fallback`.
#[cfg(test)]
pub struct FixedRandom {
    draws: Mutex<VecDeque<f64>>,
    fallback: f64,
}

#[cfg(test)]
impl FixedRandom {
    /// Always returns `draw`.
    pub fn always(draw: f64) -> Self {
        Self {
            draws: Mutex::new(VecDeque::new()),
            fallback: draw,
        }
    }

    /// Returns `draws` in order, then `fallback` forever.
    pub fn sequence(draws: impl IntoIterator<Item = f64>, fallback: f64) -> Self {
        Self {
            draws: Mutex::new(draws.into_iter().collect()),
            fallback,
        }
    }

    /// Queue another draw.
    pub fn push(&self, draw: f64) {
        self.lock().push_back(draw);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<f64>> {
        self.draws.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
impl RandomSource for FixedRandom {
    fn next_f64(&self) -> f64 {
        self.lock().pop_front().unwrap_or(self.fallback)
    }
}
