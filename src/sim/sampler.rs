//! 指数分布延迟抽样，随机源由每次运行独占。
use rand::distr::Open01;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::sim::SimError;

#[derive(Debug, Clone)]
pub struct DelaySampler<R = StdRng> {
    rng: R,
}

impl DelaySampler<StdRng> {
    pub fn seeded(seed: u64) -> Self {
        Self::new(StdRng::seed_from_u64(seed))
    }
}

impl<R: Rng> DelaySampler<R> {
    pub fn new(rng: R) -> Self {
        Self { rng }
    }

    /// `-ln(u) / rate`，`u ∈ (0, 1)`，结果有限且严格为正。每次调用推进随机源一次。
    ///
    /// 速率过小（如次正规数）导致延迟溢出为无穷时同样视为退化速率。
    pub fn sample(&mut self, rate: f64) -> Result<f64, SimError> {
        if rate.is_nan() || rate <= 0.0 {
            return Err(SimError::DegenerateRate(rate));
        }
        let u: f64 = self.rng.sample(Open01);
        let delay = -u.ln() / rate;
        if !delay.is_finite() {
            return Err(SimError::DegenerateRate(rate));
        }
        Ok(delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_seed_same_delays() {
        let mut a = DelaySampler::seeded(7);
        let mut b = DelaySampler::seeded(7);
        for _ in 0..32 {
            assert_eq!(a.sample(2.0).unwrap(), b.sample(2.0).unwrap());
        }
    }

    #[test]
    fn delays_are_positive_with_expected_mean() {
        let mut sampler = DelaySampler::seeded(42);
        let rate = 4.0;
        let n = 20_000;
        let mut total = 0.0;
        for _ in 0..n {
            let delay = sampler.sample(rate).unwrap();
            assert!(delay > 0.0 && delay.is_finite());
            total += delay;
        }
        let mean = total / n as f64;
        assert!((mean - 1.0 / rate).abs() < 0.02, "mean was {}", mean);
    }

    #[test]
    fn non_positive_rates_are_degenerate() {
        let mut sampler = DelaySampler::seeded(0);
        assert!(matches!(sampler.sample(0.0), Err(SimError::DegenerateRate(r)) if r == 0.0));
        assert!(matches!(sampler.sample(-3.0), Err(SimError::DegenerateRate(_))));
        assert!(matches!(sampler.sample(f64::NAN), Err(SimError::DegenerateRate(_))));
    }

    #[test]
    fn overflowing_delays_are_degenerate() {
        let mut sampler = DelaySampler::seeded(5);
        for _ in 0..8 {
            assert!(matches!(
                sampler.sample(1e-320),
                Err(SimError::DegenerateRate(r)) if r == 1e-320
            ));
        }
        assert!(sampler.sample(1e-300).unwrap().is_finite());
    }
}
