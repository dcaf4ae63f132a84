//! Seeded random stream shared by the whole race.
//!
//! The race owns exactly one `SimRng` and consumes it in a fixed order every tick (race-control
//! timers, activation shuffle, per-car boost draws). Anything that must not disturb the race
//! trajectory, such as telemetry noise, draws from a `child` stream instead.

use rand::rngs::SmallRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

/// 64-bit fractional golden-ratio constant for seed mixing.
const MIXING_CONSTANT: u64 = 0x9e37_79b9_7f4a_7c15;

#[derive(Debug, Clone)]
pub struct SimRng(SmallRng);

impl SimRng {
    pub fn new(seed: u64) -> Self {
        SimRng(SmallRng::seed_from_u64(seed))
    }

    /// child derives an independent stream from a seed without touching any existing stream.
    pub fn child(seed: u64, offset: u64) -> Self {
        SimRng(SmallRng::seed_from_u64(
            seed ^ offset.wrapping_mul(MIXING_CONSTANT),
        ))
    }

    #[inline]
    pub fn inner(&mut self) -> &mut SmallRng {
        &mut self.0
    }

    /// Uniform sample in [0.0, 1.0).
    #[inline]
    pub fn unit(&mut self) -> f64 {
        self.0.gen::<f64>()
    }

    #[inline]
    pub fn gen_range(&mut self, low: f64, high: f64) -> f64 {
        if high > low {
            self.0.gen_range(low..high)
        } else {
            low
        }
    }

    /// `true` with probability `p` (clamped to [0, 1]).
    #[inline]
    pub fn gen_bool(&mut self, p: f64) -> bool {
        let p = if p.is_nan() { 0.0 } else { p.clamp(0.0, 1.0) };
        self.0.gen_bool(p)
    }

    #[inline]
    pub fn shuffle<T>(&mut self, slice: &mut [T]) {
        slice.shuffle(&mut self.0);
    }
}
