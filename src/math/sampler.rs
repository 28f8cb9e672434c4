//! Randomness for key generation and encryption

use rand::seq::index;
use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;

/// ChaCha20-backed sampler for masks, errors and secrets
pub struct Sampler {
    sigma: f64,
    rng: ChaCha20Rng,
}

impl Sampler {
    /// Create a sampler seeded from the operating system
    pub fn new(sigma: f64) -> Self {
        Self {
            sigma,
            rng: ChaCha20Rng::from_entropy(),
        }
    }

    /// Create a seeded sampler for reproducibility
    pub fn with_seed(sigma: f64, seed: u64) -> Self {
        Self {
            sigma,
            rng: ChaCha20Rng::seed_from_u64(seed),
        }
    }

    /// Sample from discrete Gaussian using Box-Muller transform
    pub fn gaussian(&mut self) -> i64 {
        let u1: f64 = self.rng.gen_range(f64::MIN_POSITIVE..1.0);
        let u2: f64 = self.rng.gen_range(0.0..1.0);

        let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
        (z * self.sigma).round() as i64
    }

    /// n discrete Gaussian values as signed integers
    pub fn gaussian_vec(&mut self, n: usize) -> Vec<i64> {
        (0..n).map(|_| self.gaussian()).collect()
    }

    /// n values uniform in [0, q)
    pub fn uniform_vec(&mut self, n: usize, q: u64) -> Vec<u64> {
        (0..n).map(|_| self.rng.gen_range(0..q)).collect()
    }

    /// Ternary vector with exactly `weight` entries in {-1, +1}
    pub fn sparse_ternary(&mut self, n: usize, weight: usize) -> Vec<i64> {
        let mut out = vec![0i64; n];
        for pos in index::sample(&mut self.rng, n, weight.min(n)) {
            out[pos] = if self.rng.gen::<bool>() { 1 } else { -1 };
        }
        out
    }

    /// Fresh 32 bytes, used for symmetric key material
    pub fn bytes32(&mut self) -> [u8; 32] {
        self.rng.gen()
    }

    /// Get the standard deviation
    pub fn sigma(&self) -> f64 {
        self.sigma
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seeded_is_reproducible() {
        let mut a = Sampler::with_seed(3.2, 7);
        let mut b = Sampler::with_seed(3.2, 7);
        assert_eq!(a.gaussian_vec(64), b.gaussian_vec(64));
        assert_eq!(a.uniform_vec(8, 97), b.uniform_vec(8, 97));
    }

    #[test]
    fn test_gaussian_is_small() {
        let mut sampler = Sampler::with_seed(3.2, 1);
        let samples = sampler.gaussian_vec(4096);
        assert!(samples.iter().all(|s| s.abs() < 40));
        let mean = samples.iter().sum::<i64>() as f64 / samples.len() as f64;
        assert!(mean.abs() < 0.5);
    }

    #[test]
    fn test_sparse_ternary_weight() {
        let mut sampler = Sampler::with_seed(3.2, 2);
        let s = sampler.sparse_ternary(256, 170);
        assert_eq!(s.iter().filter(|&&c| c != 0).count(), 170);
        assert!(s.iter().all(|&c| (-1..=1).contains(&c)));
    }
}
