//! Parameter sets for the EVD engine
//!
//! One ring degree N is shared by every collection. The per-collection MLWE
//! layout (rank and stack) is derived from the vector dimension.

use serde::{Deserialize, Serialize};

use crate::error::{validation_err, Result};

/// 54-bit NTT-friendly ciphertext modulus, Q ≡ 1 (mod 8192).
pub const EVD_Q: u64 = 18014398491918337;

/// 55-bit NTT-friendly special modulus used only inside key switching, P ≡ 1 (mod 8192).
pub const EVD_P: u64 = 36028797005856769;

/// Production ring degree.
pub const DEFAULT_DEGREE: usize = 4096;

/// Scale used for the one-hot PIR selector and the payload digits.
pub const PIR_SCALE: f64 = (1u64 << 40) as f64;

/// Payload bits carried by one plaintext coefficient of a PIR response.
pub const PIR_BITS_PER_COEFF: usize = 2;

/// Core cryptographic parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvdParams {
    /// Ring degree N (power of two)
    pub degree: usize,

    /// Ciphertext modulus Q, must satisfy Q ≡ 1 (mod 2N)
    pub q: u64,

    /// Key-switching modulus P, must satisfy P ≡ 1 (mod 2N) and P > Q
    pub p: u64,

    /// Number of nonzero (±1) coefficients of the secret key
    pub hamming_weight: usize,

    /// Standard deviation for Gaussian error sampling
    pub sigma: f64,
}

impl EvdParams {
    /// Production parameters: N = 4096 over the 54/55-bit moduli pair.
    pub fn production() -> Self {
        Self {
            degree: DEFAULT_DEGREE,
            q: EVD_Q,
            p: EVD_P,
            hamming_weight: 2730,
            sigma: 3.2,
        }
    }

    /// Same moduli at a smaller degree, with the hamming weight scaled along.
    ///
    /// Intended for tests and local experiments.
    pub fn with_degree(degree: usize) -> Self {
        Self {
            degree,
            hamming_weight: (degree * 2 / 3).max(1),
            ..Self::production()
        }
    }

    /// log2 of the ring degree
    pub fn log_degree(&self) -> u32 {
        self.degree.trailing_zeros()
    }

    /// Largest payload (in bytes) that fits a single PIR block.
    ///
    /// Two bytes of every block are spent on the length prefix.
    pub fn max_payload_len(&self) -> usize {
        self.degree * PIR_BITS_PER_COEFF / 8 - 2
    }

    /// Check if parameters are valid
    pub fn validate(&self) -> Result<()> {
        if !self.degree.is_power_of_two() || self.degree < 4 {
            return Err(validation_err!(
                "degree must be a power of two >= 4, got {}",
                self.degree
            ));
        }
        let two_n = 2 * self.degree as u64;
        if self.q % two_n != 1 {
            return Err(validation_err!("q must be ≡ 1 (mod 2N) for NTT"));
        }
        if self.p % two_n != 1 {
            return Err(validation_err!("p must be ≡ 1 (mod 2N) for NTT"));
        }
        if self.p <= self.q {
            return Err(validation_err!("p must exceed q"));
        }
        if self.q >= 1 << 62 || self.p >= 1 << 62 {
            return Err(validation_err!("moduli must stay below 2^62"));
        }
        if self.hamming_weight == 0 || self.hamming_weight > self.degree {
            return Err(validation_err!(
                "hamming weight must be in 1..={}, got {}",
                self.degree,
                self.hamming_weight
            ));
        }
        if self.sigma.is_nan() || self.sigma <= 0.0 {
            return Err(validation_err!("sigma must be positive"));
        }
        Ok(())
    }
}

impl Default for EvdParams {
    fn default() -> Self {
        Self::production()
    }
}

/// MLWE layout of one collection.
///
/// A vector of dimension `dim` is packed into `rank = max(2, next_pow2(dim))`
/// coefficients of R_rank = Z_Q[Y]/(Y^rank + 1), and a degree-N ring element
/// splits into `stack = N / rank` such components via Y = X^stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankLayout {
    /// log2 of the rank
    pub log_rank: u32,
    /// MLWE ring degree
    pub rank: usize,
    /// Number of rank-degree components of one degree-N element
    pub stack: usize,
}

impl RankLayout {
    /// Layout for an explicit log rank.
    pub fn from_log_rank(log_rank: u32, degree: usize) -> Result<Self> {
        let rank = 1usize
            .checked_shl(log_rank)
            .ok_or_else(|| validation_err!("log rank {} out of range", log_rank))?;
        if rank < 2 || rank > degree {
            return Err(validation_err!(
                "rank {} must lie in 2..={}",
                rank,
                degree
            ));
        }
        Ok(Self {
            log_rank,
            rank,
            stack: degree / rank,
        })
    }

    /// Smallest layout holding vectors of `dim` slots.
    pub fn for_dimension(dim: usize, degree: usize) -> Result<Self> {
        if dim == 0 || dim > degree {
            return Err(validation_err!(
                "dimension must lie in 1..={}, got {}",
                degree,
                dim
            ));
        }
        let rank = dim.next_power_of_two().max(2);
        Self::from_log_rank(rank.trailing_zeros(), degree)
    }
}

/// Fixed-point scales applied to queries and keys.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScalePair {
    /// Scale of the query encoding
    pub query: f64,
    /// Scale of the key encoding
    pub key: f64,
}

impl ScalePair {
    /// Scale of a decrypted score.
    pub fn output(&self) -> f64 {
        self.query * self.key
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_production_params_valid() {
        let params = EvdParams::production();
        assert!(params.validate().is_ok());
        assert_eq!(params.log_degree(), 12);
        assert_eq!(params.max_payload_len(), 1022);
    }

    #[test]
    fn test_small_degree_valid() {
        let params = EvdParams::with_degree(256);
        assert!(params.validate().is_ok());
        assert_eq!(params.hamming_weight, 170);
    }

    #[test]
    fn test_invalid_params_rejected() {
        let mut params = EvdParams::with_degree(256);
        params.degree = 300;
        assert!(params.validate().is_err());

        let mut params = EvdParams::with_degree(256);
        params.hamming_weight = 257;
        assert!(params.validate().is_err());

        let mut params = EvdParams::with_degree(256);
        params.q = 65537 * 3;
        assert!(params.validate().is_err());
    }

    #[test]
    fn test_rank_layout() {
        let layout = RankLayout::for_dimension(8, 256).unwrap();
        assert_eq!((layout.rank, layout.stack, layout.log_rank), (8, 32, 3));

        let layout = RankLayout::for_dimension(5, 256).unwrap();
        assert_eq!(layout.rank, 8);

        let layout = RankLayout::for_dimension(1, 256).unwrap();
        assert_eq!((layout.rank, layout.stack), (2, 128));

        let layout = RankLayout::for_dimension(256, 256).unwrap();
        assert_eq!(layout.stack, 1);

        assert!(RankLayout::for_dimension(0, 256).is_err());
        assert!(RankLayout::for_dimension(257, 256).is_err());
    }
}
