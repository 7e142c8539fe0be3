use penny_core::RandomSource;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// The concrete [`RandomSource`] used outside of tests: a seedable
/// `rand::rngs::StdRng`, so scenario runs and Monte-Carlo samples are
/// reproducible given a seed.
#[derive(Debug)]
pub struct StdRandom {
    rng: StdRng,
}

impl StdRandom {
    pub fn seed_from_u64(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn from_entropy() -> Self {
        Self {
            rng: StdRng::from_os_rng(),
        }
    }
}

impl RandomSource for StdRandom {
    fn bernoulli(&mut self, p: f64) -> bool {
        self.rng.random::<f64>() < p
    }

    fn uniform_int(&mut self, lo: i64, hi: i64) -> i64 {
        self.rng.random_range(lo..=hi)
    }

    fn uniform_real(&mut self, lo: f64, hi: f64) -> f64 {
        lo + self.rng.random::<f64>() * (hi - lo)
    }

    fn uniform_choice(&mut self, n: usize) -> usize {
        if n == 0 {
            0
        } else {
            self.rng.random_range(0..n)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_seed_reproduces_the_same_draws() {
        let mut a = StdRandom::seed_from_u64(7);
        let mut b = StdRandom::seed_from_u64(7);
        for _ in 0..50 {
            assert_eq!(a.uniform_int(0, 1_000_000), b.uniform_int(0, 1_000_000));
        }
    }

    #[test]
    fn bernoulli_zero_never_fires() {
        let mut rng = StdRandom::seed_from_u64(1);
        for _ in 0..1000 {
            assert!(!rng.bernoulli(0.0));
        }
    }

    #[test]
    fn bernoulli_one_always_fires() {
        let mut rng = StdRandom::seed_from_u64(1);
        for _ in 0..1000 {
            assert!(rng.bernoulli(1.0));
        }
    }
}
