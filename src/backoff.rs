//! Backoff and jitter computation.

use std::time::Duration;

use rand::Rng;

/// How the base delay grows with the attempt index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackoffStrategy {
    /// `min(initial × multiplier^attempt, max)`.
    Exponential,

    /// `min(initial × (1 + multiplier × attempt), max)`.
    Linear,

    /// `initial`, regardless of attempt.
    Constant,
}

impl From<&str> for BackoffStrategy {
    fn from(value: &str) -> Self {
        match value {
            "linear" => BackoffStrategy::Linear,
            "constant" => BackoffStrategy::Constant,
            // Unrecognized names fall back to the default growth curve.
            _ => BackoffStrategy::Exponential,
        }
    }
}

/// Randomization applied to a computed base delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JitterStrategy {
    /// The base delay, unchanged.
    None,

    /// Uniform integer in `[0, delay]`.
    Full,

    /// `delay/2` plus a uniform integer in `[0, delay/2]`.
    Equal,

    /// `min(max_delay, uniform(initial_delay, prev × 3))`, carrying the
    /// previously chosen delay between attempts.
    Decorrelated,
}

impl From<&str> for JitterStrategy {
    fn from(value: &str) -> Self {
        match value {
            "none" => JitterStrategy::None,
            "equal" => JitterStrategy::Equal,
            "decorrelated" => JitterStrategy::Decorrelated,
            // Unrecognized names fall back to full jitter.
            _ => JitterStrategy::Full,
        }
    }
}

/// Parameters for the base delay curve.
#[derive(Debug, Clone)]
pub struct BackoffConfig {
    initial_delay: Duration,
    max_delay: Duration,
    multiplier: f64,
    strategy: BackoffStrategy,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(30_000),
            multiplier: 2.0,
            strategy: BackoffStrategy::Exponential,
        }
    }
}

impl BackoffConfig {
    /// Creates a config, clamping invalid inputs instead of failing:
    /// `max_delay` is raised to at least `initial_delay` and a non-positive
    /// multiplier falls back to the default.
    pub fn new(
        initial_delay: Duration,
        max_delay: Duration,
        multiplier: f64,
        strategy: BackoffStrategy,
    ) -> Self {
        Self {
            initial_delay,
            max_delay: max_delay.max(initial_delay),
            multiplier: if multiplier > 0.0 { multiplier } else { 2.0 },
            strategy,
        }
    }

    /// The delay before the first retry.
    pub fn initial_delay(&self) -> Duration {
        self.initial_delay
    }

    /// The cap applied to every computed delay.
    pub fn max_delay(&self) -> Duration {
        self.max_delay
    }

    /// The growth factor.
    pub fn multiplier(&self) -> f64 {
        self.multiplier
    }

    /// The growth curve.
    pub fn strategy(&self) -> BackoffStrategy {
        self.strategy
    }

    /// Base delay in milliseconds for a 0-indexed attempt, before jitter.
    #[allow(clippy::cast_precision_loss)]
    pub fn base_delay_ms(&self, attempt: u32) -> f64 {
        let initial = self.initial_delay.as_millis() as f64;
        let max = self.max_delay.as_millis() as f64;

        let raw = match self.strategy {
            // Cap the exponent; 2^63 ms already dwarfs any usable cap.
            BackoffStrategy::Exponential => {
                initial * self.multiplier.powi(attempt.min(63) as i32)
            }
            BackoffStrategy::Linear => initial * (1.0 + self.multiplier * f64::from(attempt)),
            BackoffStrategy::Constant => initial,
        };

        raw.min(max)
    }
}

/// Applies a jitter strategy to a base delay.
///
/// `prev_ms` is the previously jittered delay for this retry sequence (the
/// initial delay before the first attempt); only decorrelated jitter reads
/// it.
#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn apply_jitter(
    config: &BackoffConfig,
    delay_ms: f64,
    jitter: JitterStrategy,
    prev_ms: f64,
) -> f64 {
    let mut rng = rand::thread_rng();

    match jitter {
        JitterStrategy::None => delay_ms,
        JitterStrategy::Full => {
            let ceiling = delay_ms.max(0.0).floor() as u64;
            rng.gen_range(0..=ceiling) as f64
        }
        JitterStrategy::Equal => {
            let half = (delay_ms.max(0.0) / 2.0).floor() as u64;
            (half + rng.gen_range(0..=half)) as f64
        }
        JitterStrategy::Decorrelated => {
            let low = config.initial_delay.as_millis() as f64;
            let high = prev_ms * 3.0;
            let max = config.max_delay.as_millis() as f64;
            let picked = if high > low {
                rng.gen_range(low..high)
            } else {
                low
            };
            picked.floor().min(max)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(strategy: BackoffStrategy) -> BackoffConfig {
        BackoffConfig::new(
            Duration::from_millis(1000),
            Duration::from_millis(30_000),
            2.0,
            strategy,
        )
    }

    #[test]
    fn exponential_doubles_until_capped() {
        let cfg = config(BackoffStrategy::Exponential);
        let expected = [1000.0, 2000.0, 4000.0, 8000.0, 16_000.0, 30_000.0, 30_000.0];
        for (attempt, want) in expected.iter().enumerate() {
            assert_eq!(cfg.base_delay_ms(attempt as u32), *want, "attempt {attempt}");
        }
    }

    #[test]
    fn linear_grows_by_multiplier_steps() {
        let cfg = config(BackoffStrategy::Linear);
        assert_eq!(cfg.base_delay_ms(0), 1000.0);
        assert_eq!(cfg.base_delay_ms(1), 3000.0);
        assert_eq!(cfg.base_delay_ms(2), 5000.0);
        assert_eq!(cfg.base_delay_ms(100), 30_000.0);
    }

    #[test]
    fn constant_ignores_attempt() {
        let cfg = config(BackoffStrategy::Constant);
        for attempt in [0, 1, 7, 50] {
            assert_eq!(cfg.base_delay_ms(attempt), 1000.0);
        }
    }

    #[test]
    fn base_delay_never_exceeds_max() {
        for strategy in [
            BackoffStrategy::Exponential,
            BackoffStrategy::Linear,
            BackoffStrategy::Constant,
        ] {
            let cfg = config(strategy);
            for attempt in 0..200 {
                assert!(cfg.base_delay_ms(attempt) <= 30_000.0);
            }
        }
    }

    #[test]
    fn full_jitter_stays_within_base() {
        let cfg = config(BackoffStrategy::Exponential);
        for _ in 0..100 {
            let d = apply_jitter(&cfg, 4000.0, JitterStrategy::Full, 1000.0);
            assert!((0.0..=4000.0).contains(&d), "got {d}");
        }
    }

    #[test]
    fn equal_jitter_keeps_half_floor() {
        let cfg = config(BackoffStrategy::Exponential);
        for _ in 0..100 {
            let d = apply_jitter(&cfg, 4000.0, JitterStrategy::Equal, 1000.0);
            assert!((2000.0..=4000.0).contains(&d), "got {d}");
        }
    }

    #[test]
    fn no_jitter_is_identity() {
        let cfg = config(BackoffStrategy::Exponential);
        assert_eq!(apply_jitter(&cfg, 1234.0, JitterStrategy::None, 1.0), 1234.0);
    }

    #[test]
    fn decorrelated_jitter_respects_cap_and_floor() {
        let cfg = config(BackoffStrategy::Exponential);
        for _ in 0..100 {
            let d = apply_jitter(&cfg, 0.0, JitterStrategy::Decorrelated, 20_000.0);
            assert!(d >= 1000.0, "below initial delay: {d}");
            assert!(d <= 30_000.0, "above max delay: {d}");
        }
    }

    #[test]
    fn decorrelated_jitter_degenerate_range_returns_initial() {
        let cfg = config(BackoffStrategy::Exponential);
        // prev × 3 below the initial delay leaves an empty range.
        let d = apply_jitter(&cfg, 0.0, JitterStrategy::Decorrelated, 100.0);
        assert_eq!(d, 1000.0);
    }

    #[test]
    fn clamped_construction_never_faults() {
        let cfg = BackoffConfig::new(
            Duration::from_millis(5000),
            Duration::from_millis(10),
            -3.0,
            BackoffStrategy::Exponential,
        );
        assert_eq!(cfg.max_delay(), Duration::from_millis(5000));
        assert_eq!(cfg.multiplier(), 2.0);
    }

    #[test]
    fn strategy_names_fall_back() {
        assert_eq!(BackoffStrategy::from("linear"), BackoffStrategy::Linear);
        assert_eq!(BackoffStrategy::from("bogus"), BackoffStrategy::Exponential);
        assert_eq!(JitterStrategy::from("decorrelated"), JitterStrategy::Decorrelated);
        assert_eq!(JitterStrategy::from("bogus"), JitterStrategy::Full);
    }
}
