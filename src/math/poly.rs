//! Polynomial operations over R_q = Z_q[X]/(X^N + 1).
//!
//! A [`Polynomial`] lives either in coefficient domain or in NTT domain, and
//! two polynomials only combine when degree, modulus and domain agree. The
//! operator impls assert this (mixing is a programming error inside the
//! crate); [`Polynomial::check_compatible`] is the fallible form used on
//! material that arrived from outside.
//!
//! # Component layout
//!
//! A degree-N polynomial with N = rank · stack splits uniquely as
//! `f(X) = Σ_{i<stack} X^i f_i(X^stack)` where every `f_i` lives in
//! R_rank = Z_q[Y]/(Y^rank + 1). [`Polynomial::component`] extracts `f_i`,
//! [`Polynomial::embed`] is the ring map Y ↦ X^stack and
//! [`Polynomial::interleave`] rebuilds `f` from all components.

use serde::{Deserialize, Serialize};
use std::ops::{Add, AddAssign, Neg, Sub, SubAssign};

use super::modular::ModQ;
use super::ntt::NttContext;
use super::sampler::Sampler;
use crate::error::{crypto_err, Result};

/// Polynomial in R_q = Z_q[X]/(X^N + 1).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Polynomial {
    coeffs: Vec<u64>,
    modulus: u64,
    is_ntt: bool,
}

impl Polynomial {
    /// Zero polynomial in coefficient domain
    pub fn zero(degree: usize, modulus: u64) -> Self {
        Self {
            coeffs: vec![0; degree],
            modulus,
            is_ntt: false,
        }
    }

    /// Coefficient-domain polynomial, reducing every entry
    pub fn from_coeffs(coeffs: Vec<u64>, modulus: u64) -> Self {
        let mut p = Self {
            coeffs,
            modulus,
            is_ntt: false,
        };
        for c in &mut p.coeffs {
            *c %= modulus;
        }
        p
    }

    /// Coefficient-domain polynomial from centered integers
    pub fn from_signed(coeffs: &[i64], modulus: u64) -> Self {
        Self {
            coeffs: coeffs
                .iter()
                .map(|&c| ModQ::from_signed(c, modulus))
                .collect(),
            modulus,
            is_ntt: false,
        }
    }

    /// Uniformly random polynomial
    pub fn uniform(degree: usize, modulus: u64, sampler: &mut Sampler) -> Self {
        Self {
            coeffs: sampler.uniform_vec(degree, modulus),
            modulus,
            is_ntt: false,
        }
    }

    /// Polynomial with discrete Gaussian coefficients
    pub fn gaussian(degree: usize, modulus: u64, sampler: &mut Sampler) -> Self {
        Self::from_signed(&sampler.gaussian_vec(degree), modulus)
    }

    /// Number of coefficients
    pub fn degree(&self) -> usize {
        self.coeffs.len()
    }

    /// Get modulus
    pub fn modulus(&self) -> u64 {
        self.modulus
    }

    /// Check if in NTT domain
    pub fn is_ntt(&self) -> bool {
        self.is_ntt
    }

    /// Coefficient at index (coefficient domain only)
    pub fn coeff(&self, i: usize) -> u64 {
        assert!(!self.is_ntt, "Cannot access coefficients in NTT domain");
        self.coeffs[i]
    }

    /// Centered representative of the coefficient at index
    pub fn centered(&self, i: usize) -> i64 {
        ModQ::to_signed(self.coeff(i), self.modulus)
    }

    /// Set coefficient at index (coefficient domain only)
    pub fn set_coeff(&mut self, i: usize, value: u64) {
        assert!(!self.is_ntt, "Cannot set coefficients in NTT domain");
        self.coeffs[i] = value % self.modulus;
    }

    /// Raw values in the current domain
    pub fn coeffs(&self) -> &[u64] {
        &self.coeffs
    }

    /// Mutable raw values in the current domain
    pub fn coeffs_mut(&mut self) -> &mut [u64] {
        &mut self.coeffs
    }

    /// Degree, modulus and domain all agree with `other`.
    pub fn check_compatible(&self, other: &Self) -> Result<()> {
        if self.degree() != other.degree() {
            return Err(crypto_err!(
                "degree mismatch: {} vs {}",
                self.degree(),
                other.degree()
            ));
        }
        if self.modulus != other.modulus {
            return Err(crypto_err!(
                "modulus mismatch: {} vs {}",
                self.modulus,
                other.modulus
            ));
        }
        if self.is_ntt != other.is_ntt {
            return Err(crypto_err!("NTT domain mismatch"));
        }
        Ok(())
    }

    /// Fails unless the polynomial has the given shape.
    pub fn check_shape(&self, degree: usize, modulus: u64, is_ntt: bool) -> Result<()> {
        if self.degree() != degree || self.modulus != modulus || self.is_ntt != is_ntt {
            return Err(crypto_err!(
                "expected (degree {}, modulus {}, ntt {}), got ({}, {}, {})",
                degree,
                modulus,
                is_ntt,
                self.degree(),
                self.modulus,
                self.is_ntt
            ));
        }
        if self.coeffs.iter().any(|&c| c >= modulus) {
            return Err(crypto_err!("coefficient not reduced modulo {}", modulus));
        }
        Ok(())
    }

    /// Convert to NTT domain
    pub fn to_ntt(&mut self, ctx: &NttContext) {
        if !self.is_ntt {
            debug_assert_eq!(ctx.modulus(), self.modulus);
            ctx.forward(&mut self.coeffs);
            self.is_ntt = true;
        }
    }

    /// Convert from NTT domain to coefficient domain
    pub fn from_ntt(&mut self, ctx: &NttContext) {
        if self.is_ntt {
            debug_assert_eq!(ctx.modulus(), self.modulus);
            ctx.inverse(&mut self.coeffs);
            self.is_ntt = false;
        }
    }

    /// Copy in NTT domain
    pub fn to_ntt_new(&self, ctx: &NttContext) -> Self {
        let mut result = self.clone();
        result.to_ntt(ctx);
        result
    }

    /// Copy in coefficient domain
    pub fn from_ntt_new(&self, ctx: &NttContext) -> Self {
        let mut result = self.clone();
        result.from_ntt(ctx);
        result
    }

    /// Scalar multiplication, valid in either domain
    pub fn scalar_mul(&self, scalar: u64) -> Self {
        let mut out = self.clone();
        out.scalar_mul_assign(scalar);
        out
    }

    /// In-place scalar multiplication
    pub fn scalar_mul_assign(&mut self, scalar: u64) {
        let scalar = scalar % self.modulus;
        for c in &mut self.coeffs {
            *c = ModQ::mul(*c, scalar, self.modulus);
        }
    }

    /// Product of two NTT-domain polynomials
    pub fn mul_ntt_domain(&self, other: &Self, ctx: &NttContext) -> Self {
        assert!(
            self.is_ntt && other.is_ntt,
            "Both polynomials must be in NTT domain"
        );
        assert_eq!(self.modulus, other.modulus, "Moduli must match");

        let mut result = vec![0u64; self.coeffs.len()];
        ctx.pointwise_mul(&self.coeffs, &other.coeffs, &mut result);
        Self {
            coeffs: result,
            modulus: self.modulus,
            is_ntt: true,
        }
    }

    /// In-place multiply-accumulate in NTT domain: self += a * b
    pub fn mul_acc_ntt_domain(&mut self, a: &Self, b: &Self, ctx: &NttContext) {
        assert!(
            self.is_ntt && a.is_ntt && b.is_ntt,
            "All polynomials must be in NTT domain"
        );
        assert_eq!(self.modulus, a.modulus, "Moduli must match");
        assert_eq!(self.modulus, b.modulus, "Moduli must match");
        ctx.pointwise_mul_acc(&mut self.coeffs, &a.coeffs, &b.coeffs);
    }

    /// Product of two polynomials in any domain, returned in coefficient domain
    pub fn mul_ntt(&self, other: &Self, ctx: &NttContext) -> Self {
        let a = self.to_ntt_new(ctx);
        let b = other.to_ntt_new(ctx);
        let mut out = a.mul_ntt_domain(&b, ctx);
        out.from_ntt(ctx);
        out
    }

    /// Same ring element under another modulus, through centered representatives
    pub fn lift_to(&self, modulus: u64) -> Self {
        assert!(!self.is_ntt, "Cannot lift in NTT domain");
        Self {
            coeffs: self
                .coeffs
                .iter()
                .map(|&c| ModQ::lift_centered(c, self.modulus, modulus))
                .collect(),
            modulus,
            is_ntt: false,
        }
    }

    /// Component `index` of the decomposition over `stack` interleaved parts
    pub fn component(&self, index: usize, stack: usize) -> Self {
        assert!(!self.is_ntt, "Cannot split in NTT domain");
        assert!(index < stack && self.degree() % stack == 0);
        Self {
            coeffs: self.coeffs.iter().skip(index).step_by(stack).copied().collect(),
            modulus: self.modulus,
            is_ntt: false,
        }
    }

    /// Ring embedding Y ↦ X^stack into degree `degree() * stack`
    pub fn embed(&self, stack: usize) -> Self {
        assert!(!self.is_ntt, "Cannot embed in NTT domain");
        let mut coeffs = vec![0u64; self.degree() * stack];
        for (j, &c) in self.coeffs.iter().enumerate() {
            coeffs[j * stack] = c;
        }
        Self {
            coeffs,
            modulus: self.modulus,
            is_ntt: false,
        }
    }

    /// Σ_i X^i · embed(parts[i]), the inverse of taking every component
    pub fn interleave(parts: &[Self]) -> Self {
        assert!(!parts.is_empty(), "Nothing to interleave");
        let stack = parts.len();
        let rank = parts[0].degree();
        let modulus = parts[0].modulus;
        let mut coeffs = vec![0u64; rank * stack];
        for (i, part) in parts.iter().enumerate() {
            assert!(!part.is_ntt && part.degree() == rank && part.modulus == modulus);
            for (j, &c) in part.coeffs.iter().enumerate() {
                coeffs[j * stack + i] = c;
            }
        }
        Self {
            coeffs,
            modulus,
            is_ntt: false,
        }
    }

    /// Check if polynomial is zero
    pub fn is_zero(&self) -> bool {
        self.coeffs.iter().all(|&c| c == 0)
    }

    /// Largest centered coefficient magnitude
    pub fn linf_norm(&self) -> u64 {
        assert!(!self.is_ntt, "Cannot compute norm in NTT domain");
        self.coeffs
            .iter()
            .map(|&c| c.min(self.modulus - c))
            .max()
            .unwrap_or(0)
    }
}

impl Add for &Polynomial {
    type Output = Polynomial;

    fn add(self, rhs: Self) -> Self::Output {
        let mut out = self.clone();
        out += rhs;
        out
    }
}

impl Add for Polynomial {
    type Output = Self;

    fn add(mut self, rhs: Self) -> Self::Output {
        self += &rhs;
        self
    }
}

impl AddAssign<&Polynomial> for Polynomial {
    fn add_assign(&mut self, rhs: &Polynomial) {
        assert_eq!(self.modulus, rhs.modulus, "Moduli must match");
        assert_eq!(self.is_ntt, rhs.is_ntt, "NTT domains must match");
        assert_eq!(self.degree(), rhs.degree(), "Degrees must match");
        let q = self.modulus;
        for (a, &b) in self.coeffs.iter_mut().zip(&rhs.coeffs) {
            *a = ModQ::add(*a, b, q);
        }
    }
}

impl AddAssign for Polynomial {
    fn add_assign(&mut self, rhs: Self) {
        *self += &rhs;
    }
}

impl Sub for &Polynomial {
    type Output = Polynomial;

    fn sub(self, rhs: Self) -> Self::Output {
        let mut out = self.clone();
        out -= rhs;
        out
    }
}

impl Sub for Polynomial {
    type Output = Self;

    fn sub(mut self, rhs: Self) -> Self::Output {
        self -= &rhs;
        self
    }
}

impl SubAssign<&Polynomial> for Polynomial {
    fn sub_assign(&mut self, rhs: &Polynomial) {
        assert_eq!(self.modulus, rhs.modulus, "Moduli must match");
        assert_eq!(self.is_ntt, rhs.is_ntt, "NTT domains must match");
        assert_eq!(self.degree(), rhs.degree(), "Degrees must match");
        let q = self.modulus;
        for (a, &b) in self.coeffs.iter_mut().zip(&rhs.coeffs) {
            *a = ModQ::sub(*a, b, q);
        }
    }
}

impl SubAssign for Polynomial {
    fn sub_assign(&mut self, rhs: Self) {
        *self -= &rhs;
    }
}

impl Neg for &Polynomial {
    type Output = Polynomial;

    fn neg(self) -> Self::Output {
        Polynomial {
            coeffs: self
                .coeffs
                .iter()
                .map(|&c| ModQ::negate(c, self.modulus))
                .collect(),
            modulus: self.modulus,
            is_ntt: self.is_ntt,
        }
    }
}

impl Neg for Polynomial {
    type Output = Self;

    fn neg(self) -> Self::Output {
        -&self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::{EVD_P, EVD_Q};

    fn make_ctx(n: usize) -> NttContext {
        NttContext::new(n, EVD_Q)
    }

    #[test]
    fn test_addition_and_subtraction_wrap() {
        let q = EVD_Q;
        let a = Polynomial::from_coeffs(vec![5, 6, 7, 8], q);
        let b = Polynomial::from_coeffs(vec![10, 20, 30, 40], q);

        let diff = &a - &b;
        assert_eq!(diff.coeff(0), q - 5);
        assert_eq!(diff.centered(1), -14);

        let sum = &diff + &b;
        assert_eq!(sum, a);
    }

    #[test]
    fn test_negation() {
        let q = EVD_Q;
        let a = Polynomial::from_coeffs(vec![1, 2, 3, 0], q);
        let neg_a = -&a;
        assert_eq!(neg_a.coeff(0), q - 1);
        assert_eq!(neg_a.coeff(3), 0);
        assert!((&a + &neg_a).is_zero());
    }

    #[test]
    fn test_ntt_roundtrip_and_product() {
        let n = 256;
        let ctx = make_ctx(n);
        let mut sampler = Sampler::with_seed(3.2, 11);

        let a = Polynomial::uniform(n, EVD_Q, &mut sampler);
        assert_eq!(a.to_ntt_new(&ctx).from_ntt_new(&ctx), a);

        // X * X^(n-1) = -1
        let mut x = Polynomial::zero(n, EVD_Q);
        x.set_coeff(1, 1);
        let mut x_top = Polynomial::zero(n, EVD_Q);
        x_top.set_coeff(n - 1, 1);
        let prod = x.mul_ntt(&x_top, &ctx);
        assert_eq!(prod.centered(0), -1);
        assert!(prod.coeffs()[1..].iter().all(|&c| c == 0));
    }

    #[test]
    fn test_check_compatible() {
        let a = Polynomial::zero(8, EVD_Q);
        let b = Polynomial::zero(16, EVD_Q);
        let c = Polynomial::zero(8, EVD_P);
        assert!(a.check_compatible(&a.clone()).is_ok());
        assert!(a.check_compatible(&b).is_err());
        assert!(a.check_compatible(&c).is_err());

        let ctx = make_ctx(8);
        let a_ntt = a.to_ntt_new(&ctx);
        let err = a.check_compatible(&a_ntt).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::CryptoState);
    }

    #[test]
    fn test_components_interleave_roundtrip() {
        let mut sampler = Sampler::with_seed(3.2, 5);
        let f = Polynomial::uniform(64, EVD_Q, &mut sampler);
        let parts: Vec<Polynomial> = (0..8).map(|i| f.component(i, 8)).collect();
        assert_eq!(parts[3].coeff(2), f.coeff(2 * 8 + 3));
        assert_eq!(Polynomial::interleave(&parts), f);
    }

    #[test]
    fn test_embed_is_ring_homomorphism() {
        let mut sampler = Sampler::with_seed(3.2, 6);
        let (rank, stack) = (8, 4);
        let u = Polynomial::uniform(rank, EVD_Q, &mut sampler);
        let v = Polynomial::uniform(rank, EVD_Q, &mut sampler);

        let small = make_ctx(rank);
        let big = make_ctx(rank * stack);
        let lhs = u.mul_ntt(&v, &small).embed(stack);
        let rhs = u.embed(stack).mul_ntt(&v.embed(stack), &big);
        assert_eq!(lhs, rhs);
    }

    #[test]
    fn test_lift_keeps_small_values() {
        let a = Polynomial::from_signed(&[-3, 0, 7, -1], EVD_Q);
        let lifted = a.lift_to(EVD_P);
        assert_eq!(lifted.modulus(), EVD_P);
        assert_eq!(lifted.centered(0), -3);
        assert_eq!(lifted.centered(2), 7);
        assert_eq!(lifted.linf_norm(), 7);
    }
}
