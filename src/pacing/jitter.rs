//! Random sources for pacing jitter

use rand::Rng;

/// Source of the random fraction added to a base delay
///
/// Implementations return a value in `[0.0, 1.0]`.
pub trait JitterSource: Send + Sync {
    fn sample(&self) -> f64;
}

/// Draws from the thread-local generator
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadRngJitter;

impl JitterSource for ThreadRngJitter {
    fn sample(&self) -> f64 {
        rand::rng().random_range(0.0..=1.0)
    }
}

/// Always returns the same fraction
#[derive(Debug, Clone, Copy)]
pub struct FixedJitter(pub f64);

impl JitterSource for FixedJitter {
    fn sample(&self) -> f64 {
        self.0
    }
}
