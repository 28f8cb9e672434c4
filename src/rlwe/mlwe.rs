//! Module-LWE ciphertexts over R_rank.
//!
//! An MLWE ciphertext is the component-0 slice of an RLWE ciphertext of
//! degree N = rank · stack. With the RLWE secret split into components
//! `s = Σ_u X^u s_u(X^stack)`, component 0 of `a·s + b` equals
//! `b_0 + Σ_t a_t · σ_t` where `σ_0 = s_0` and `σ_t = Y · s_{stack - t}`.
//! A whole embedding vector then travels as `stack + 1` polynomials of
//! degree `rank` instead of two of degree N.

use serde::{Deserialize, Serialize};
use std::ops::{AddAssign, SubAssign};

use crate::error::{crypto_err, Result};
use crate::math::{NttContext, Polynomial};
use crate::params::RankLayout;

use super::galois::{apply_automorphism, multiply_monomial};
use super::types::Ciphertext;

/// MLWE ciphertext: `stack` mask polynomials and one body, all of degree `rank`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MLWECiphertext {
    /// Mask components a_0..a_{stack-1}
    pub a: Vec<Polynomial>,
    /// Body
    pub b: Polynomial,
}

impl MLWECiphertext {
    /// Trivial encryption of zero
    pub fn zero(layout: &RankLayout, modulus: u64) -> Self {
        Self {
            a: vec![Polynomial::zero(layout.rank, modulus); layout.stack],
            b: Polynomial::zero(layout.rank, modulus),
        }
    }

    /// Extracts the component-0 MLWE ciphertext from a coefficient-domain RLWE one
    pub fn from_rlwe(ct: &Ciphertext, stack: usize) -> Self {
        Self {
            a: (0..stack).map(|t| ct.a.component(t, stack)).collect(),
            b: ct.b.component(0, stack),
        }
    }

    /// Degree of every component
    pub fn rank(&self) -> usize {
        self.b.degree()
    }

    /// Number of mask components
    pub fn stack(&self) -> usize {
        self.a.len()
    }

    /// Ciphertext modulus
    pub fn modulus(&self) -> u64 {
        self.b.modulus()
    }

    /// τ_g applied to every component (result decrypts under τ_g(σ))
    pub fn automorphism(&self, g: usize) -> Self {
        Self {
            a: self.a.iter().map(|p| apply_automorphism(p, g)).collect(),
            b: apply_automorphism(&self.b, g),
        }
    }

    /// Multiplies the plaintext by Y^exponent
    pub fn multiply_monomial(&self, exponent: usize) -> Self {
        Self {
            a: self.a.iter().map(|p| multiply_monomial(p, exponent)).collect(),
            b: multiply_monomial(&self.b, exponent),
        }
    }

    /// Multiplies every component by a scalar
    pub fn scalar_mul_assign(&mut self, scalar: u64) {
        for p in &mut self.a {
            p.scalar_mul_assign(scalar);
        }
        self.b.scalar_mul_assign(scalar);
    }

    /// Fails unless the ciphertext matches the layout and modulus in coefficient domain.
    pub fn validate(&self, layout: &RankLayout, modulus: u64) -> Result<()> {
        if self.stack() != layout.stack {
            return Err(crypto_err!(
                "MLWE ciphertext has {} mask components, expected {}",
                self.stack(),
                layout.stack
            ));
        }
        for p in self.a.iter().chain(std::iter::once(&self.b)) {
            p.check_shape(layout.rank, modulus, false)?;
        }
        Ok(())
    }
}

impl AddAssign<&MLWECiphertext> for MLWECiphertext {
    fn add_assign(&mut self, rhs: &MLWECiphertext) {
        for (x, y) in self.a.iter_mut().zip(&rhs.a) {
            *x += y;
        }
        self.b += &rhs.b;
    }
}

impl SubAssign<&MLWECiphertext> for MLWECiphertext {
    fn sub_assign(&mut self, rhs: &MLWECiphertext) {
        for (x, y) in self.a.iter_mut().zip(&rhs.a) {
            *x -= y;
        }
        self.b -= &rhs.b;
    }
}

/// MLWE secret σ_0..σ_{stack-1} from the coefficient-domain RLWE secret
pub fn mlwe_secret(secret: &Polynomial, stack: usize) -> Vec<Polynomial> {
    (0..stack)
        .map(|t| {
            if t == 0 {
                secret.component(0, stack)
            } else {
                multiply_monomial(&secret.component(stack - t, stack), 1)
            }
        })
        .collect()
}

/// Raw MLWE decryption `b + Σ a_t σ_t`, coefficient domain.
pub fn decrypt_mlwe(
    ct: &MLWECiphertext,
    sigma: &[Polynomial],
    rank_ctx: &NttContext,
) -> Result<Polynomial> {
    if ct.stack() != sigma.len() {
        return Err(crypto_err!(
            "MLWE ciphertext has {} components, secret has {}",
            ct.stack(),
            sigma.len()
        ));
    }
    let mut acc = Polynomial::zero(ct.rank(), ct.modulus());
    acc.to_ntt(rank_ctx);
    for (a, s) in ct.a.iter().zip(sigma) {
        a.check_compatible(s)?;
        acc.mul_acc_ntt_domain(&a.to_ntt_new(rank_ctx), &s.to_ntt_new(rank_ctx), rank_ctx);
    }
    acc.from_ntt(rank_ctx);
    acc += &ct.b;
    Ok(acc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::{RingContext, Sampler};
    use crate::params::EvdParams;
    use crate::rlwe::{decrypt, encrypt, SecretKey};

    #[test]
    fn test_mlwe_extraction_decrypts() {
        let params = EvdParams::with_degree(256);
        let layout = RankLayout::for_dimension(8, params.degree).unwrap();
        let ring = RingContext::new(params.degree, params.q, params.p);
        let rank_ctx = NttContext::new(layout.rank, params.q);
        let mut sampler = Sampler::with_seed(params.sigma, 8);
        let sk = SecretKey::generate(&params, &ring, &mut sampler);

        let values: Vec<i64> = (0..8).map(|i| (i - 4) * 1000).collect();
        let msg = Polynomial::from_signed(&values, params.q).embed(layout.stack);
        let ct = encrypt(&sk, &msg, &ring, &mut sampler).unwrap();

        let mlwe = MLWECiphertext::from_rlwe(&ct, layout.stack);
        assert!(mlwe.validate(&layout, params.q).is_ok());

        let sigma = mlwe_secret(&sk.coeff_q(&ring.q), layout.stack);
        let dec = decrypt_mlwe(&mlwe, &sigma, &rank_ctx).unwrap();
        let full = decrypt(&ct, &sk, &ring).unwrap();
        assert_eq!(dec, full.component(0, layout.stack));
        for (i, &v) in values.iter().enumerate() {
            assert!((dec.centered(i) - v).abs() < 64);
        }
    }

    #[test]
    fn test_validate_rejects_wrong_layout() {
        let layout = RankLayout::for_dimension(8, 256).unwrap();
        let q = EvdParams::with_degree(256).q;
        let ct = MLWECiphertext::zero(&layout, q);
        let other = RankLayout::for_dimension(16, 256).unwrap();
        assert!(ct.validate(&other, q).is_err());
    }
}
