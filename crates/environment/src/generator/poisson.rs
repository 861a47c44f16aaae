//! Poisson-process event generation.

use super::GeneratorError;
use rand::Rng;

/// Events arrive with exponentially distributed gaps at `lambda` events per
/// step, per cell group. Each arrival is stamped with its exact time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Poisson {
    pub lambda: f64,
}

impl Poisson {
    /// Highest accepted rate, in events per cell group per step.
    pub const MAX_RATE: f64 = 10_000.0;

    pub fn new(lambda: f64) -> Self {
        Self { lambda }
    }

    pub(super) fn validate(&self) -> Result<(), GeneratorError> {
        if self.lambda > 0.0 && self.lambda <= Self::MAX_RATE {
            Ok(())
        } else {
            Err(GeneratorError::InvalidRate(self.lambda))
        }
    }

    /// Inverse-transform sample of an exponential gap.
    fn gap(&self, rng: &mut impl Rng) -> f64 {
        // gen::<f64>() is in [0, 1), so 1 - u is in (0, 1] and ln is finite.
        let u: f64 = rng.gen();
        -(1.0 - u).ln() / self.lambda
    }

    pub(super) fn first_arrival(&self, rng: &mut impl Rng) -> f64 {
        self.gap(rng)
    }

    /// Pop the pending arrival if it falls inside step `now`.
    ///
    /// Arrivals from steps that were never visited are skipped.
    pub(super) fn next_in_step(&self, rng: &mut impl Rng, next: &mut f64, now: u64) -> Option<f64> {
        let start = now as f64;
        while *next < start {
            *next += self.gap(rng);
        }
        if *next < start + 1.0 {
            let time = *next;
            *next += self.gap(rng);
            Some(time)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn test_mean_rate() {
        let poisson = Poisson::new(3.0);
        let mut rng = ChaCha8Rng::seed_from_u64(21);
        let mut next = poisson.first_arrival(&mut rng);

        let steps = 2_000u64;
        let mut count = 0;
        for now in 0..steps {
            while let Some(t) = poisson.next_in_step(&mut rng, &mut next, now) {
                assert!(t >= now as f64 && t < (now + 1) as f64);
                count += 1;
            }
        }
        let rate = count as f64 / steps as f64;
        assert!((2.7..3.3).contains(&rate), "rate = {rate}");
    }

    #[test]
    fn test_skipped_steps_are_dropped() {
        let poisson = Poisson::new(5.0);
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let mut next = poisson.first_arrival(&mut rng);
        while let Some(t) = poisson.next_in_step(&mut rng, &mut next, 100) {
            assert!(t >= 100.0);
        }
    }

    #[test]
    fn test_validate() {
        assert!(Poisson::new(0.5).validate().is_ok());
        assert!(Poisson::new(0.0).validate().is_err());
        assert!(Poisson::new(-1.0).validate().is_err());
        assert!(Poisson::new(f64::NAN).validate().is_err());
        assert!(Poisson::new(Poisson::MAX_RATE).validate().is_ok());
        assert_eq!(
            Poisson::new(1e12).validate(),
            Err(GeneratorError::InvalidRate(1e12))
        );
        assert!(Poisson::new(f64::INFINITY).validate().is_err());
    }
}
