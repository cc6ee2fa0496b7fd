//! Interval durations.
//!
//! Each named interval of a task has its own distribution. A fresh value is
//! drawn exactly once per entry into the owning state.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::rng::RandomSource;

pub(crate) fn ms(ms: f64) -> Duration {
    if ms.is_finite() && ms > 0.0 {
        Duration::from_nanos((ms * 1e6).round() as u64)
    } else {
        Duration::ZERO
    }
}

/// All values in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum DurationDist {
    Fixed {
        ms: f64,
    },
    Uniform {
        min_ms: f64,
        max_ms: f64,
    },
    /// Exponential with the given mean, clamped into `[min_ms, max_ms]`.
    Exponential {
        mean_ms: f64,
        min_ms: f64,
        max_ms: f64,
    },
}

impl DurationDist {
    pub fn fixed(ms: f64) -> Self {
        DurationDist::Fixed { ms }
    }

    pub fn uniform(min_ms: f64, max_ms: f64) -> Self {
        DurationDist::Uniform { min_ms, max_ms }
    }

    pub fn exponential(mean_ms: f64, min_ms: f64, max_ms: f64) -> Self {
        DurationDist::Exponential {
            mean_ms,
            min_ms,
            max_ms,
        }
    }

    pub fn draw_ms(&self, rng: &mut impl RandomSource) -> f64 {
        match *self {
            DurationDist::Fixed { ms } => ms,
            DurationDist::Uniform { min_ms, max_ms } => rng.gen_range_f64(min_ms, max_ms),
            DurationDist::Exponential {
                mean_ms,
                min_ms,
                max_ms,
            } => {
                // 1 - u is in (0, 1], so the log is finite.
                let u = rng.next_f64_01();
                let x = -mean_ms * (1.0 - u).ln();
                // f64::max drops a NaN operand, so `lo` is a number.
                let lo = min_ms.max(0.0);
                let hi = if max_ms.is_nan() { f64::INFINITY } else { max_ms.max(lo) };
                x.clamp(lo, hi)
            }
        }
    }

    pub fn draw(&self, rng: &mut impl RandomSource) -> Duration {
        ms(self.draw_ms(rng))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rng::Prng;

    #[test]
    fn draws_stay_in_bounds() {
        let mut rng = Prng::new(3);
        let uniform = DurationDist::uniform(100.0, 200.0);
        let expo = DurationDist::exponential(150.0, 50.0, 400.0);
        for _ in 0..2000 {
            let u = uniform.draw_ms(&mut rng);
            assert!((100.0..200.0).contains(&u));
            let e = expo.draw_ms(&mut rng);
            assert!((50.0..=400.0).contains(&e));
        }
        assert_eq!(DurationDist::fixed(7.5).draw(&mut rng), Duration::from_micros(7500));
    }

    #[test]
    fn negative_or_nan_is_zero() {
        assert_eq!(ms(-3.0), Duration::ZERO);
        assert_eq!(ms(f64::NAN), Duration::ZERO);
    }

    #[test]
    fn exponential_with_nan_bounds_still_draws() {
        let mut rng = Prng::new(9);
        let expo = DurationDist::exponential(150.0, f64::NAN, f64::NAN);
        for _ in 0..100 {
            let e = expo.draw_ms(&mut rng);
            assert!(e >= 0.0);
        }
        let unbounded_above = DurationDist::exponential(150.0, 50.0, f64::NAN);
        for _ in 0..100 {
            assert!(unbounded_above.draw_ms(&mut rng) >= 50.0);
        }
    }

    #[test]
    fn json_shape() {
        let d: DurationDist =
            serde_json::from_str(r#"{"kind":"uniform","min_ms":500,"max_ms":900}"#).unwrap();
        assert_eq!(d, DurationDist::uniform(500.0, 900.0));
    }
}
