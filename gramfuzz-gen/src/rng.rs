//! Random source abstraction.
//!
//! Ported from `rnd.h`'s macros (`rndl`, `rnd`, `rndl_inc`, `chance`) as a
//! trait so tests can swap in a scripted source, the same role
//! `cfg_generate`'s `GenRange` trait plays for `rand::Rng`.

use gramfuzz_weighted::RandomDraw;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use crate::trace::DebugFlags;

/// The random-number capability the generator needs. Blanket-implemented
/// for any `rand::Rng`.
///
/// Extends [`RandomDraw`] (which supplies `rndl`) so any `RandSource` can
/// also drive a [`gramfuzz_weighted::WeightedChoice`] directly.
pub trait RandSource: RandomDraw {
    /// Uniform real in `[0.0, max]` (the original's division by `RAND_MAX`
    /// rather than `RAND_MAX + 1`, used only by `RndFlt`).
    fn rndl_inc(&mut self, max: f64) -> f64;

    /// Uniform integer in `[0, max)`. `rnd(max)` in the original.
    fn rnd(&mut self, max: u32) -> u32 {
        if max == 0 {
            return 0;
        }
        self.rndl(max as f64) as u32
    }

    /// `true` with probability `c`. `chance(c)` in the original.
    fn chance(&mut self, c: f64) -> bool {
        self.rndl(1.0) < c
    }
}

impl<R: Rng + ?Sized> RandomDraw for R {
    fn rndl(&mut self, max: f64) -> f64 {
        if max <= 0.0 {
            return 0.0;
        }
        self.gen_range(0.0..max)
    }
}

impl<R: Rng + ?Sized> RandSource for R {
    fn rndl_inc(&mut self, max: f64) -> f64 {
        if max <= 0.0 {
            return 0.0;
        }
        self.gen_range(0.0..=max)
    }
}

/// The default random source: `SmallRng` seeded from OS entropy at
/// construction, logging a ten-digit fingerprint exactly as `seedrnd()`
/// does via `ODBG`.
pub struct GenRng(SmallRng);

impl GenRng {
    /// Seeds from OS entropy, matching `seedrnd()`'s `/dev/random` read
    /// (via `rand::rngs::OsRng` under the hood of `SmallRng::from_entropy`).
    pub fn from_entropy() -> Self {
        let mut rng = GenRng(SmallRng::from_entropy());
        let fingerprint: String = (0..10)
            .map(|_| std::char::from_digit(rng.rnd(10), 10).unwrap())
            .collect();
        // `from_env` isn't threaded in here (this runs before a `GenState`
        // exists), so this site re-reads `GRAMMAR_DEBUG` on its own rather
        // than failing construction over a malformed value.
        let debug = DebugFlags::from_env().unwrap_or(DebugFlags::NONE);
        if debug.contains(DebugFlags::GEN) {
            log::trace!("rnd() fingerprint: {fingerprint}");
        }
        rng
    }

    /// Deterministic seed, for tests and reproducible scenarios.
    pub fn from_seed(seed: u64) -> Self {
        GenRng(SmallRng::seed_from_u64(seed))
    }
}

impl RandomDraw for GenRng {
    fn rndl(&mut self, max: f64) -> f64 {
        self.0.rndl(max)
    }
}

impl RandSource for GenRng {
    fn rndl_inc(&mut self, max: f64) -> f64 {
        self.0.rndl_inc(max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(f64);

    impl RandomDraw for Fixed {
        fn rndl(&mut self, _max: f64) -> f64 {
            self.0
        }
    }

    impl RandSource for Fixed {
        fn rndl_inc(&mut self, _max: f64) -> f64 {
            self.0
        }
    }

    #[test]
    fn chance_compares_against_unit_draw() {
        let mut r = Fixed(0.5);
        assert!(r.chance(0.9));
        assert!(!r.chance(0.1));
    }

    #[test]
    fn rnd_floors_the_draw() {
        let mut r = Fixed(4.9);
        assert_eq!(r.rnd(10), 4);
    }

    #[test]
    fn rnd_of_zero_is_zero() {
        let mut r = Fixed(0.0);
        assert_eq!(r.rnd(0), 0);
    }
}
