//! Number-Theoretic Transform (NTT) for fast polynomial multiplication.
//!
//! Cooley-Tukey radix-2 forward transform and Gentleman-Sande inverse for
//! negacyclic convolution over R_q = Z_q[X]/(X^n + 1).
//!
//! # Theory
//!
//! A primitive 2n-th root of unity ψ (ψ^n = -1) exists whenever q ≡ 1 (mod 2n).
//! The forward transform evaluates a polynomial at the odd powers of ψ, so a
//! negacyclic product becomes a pointwise product.
//!
//! Values in the evaluation domain are kept in Montgomery form. `forward`
//! converts on entry and `inverse` converts back, so the pointwise product of
//! two transformed polynomials is again a valid transformed polynomial.
//!
//! # Example
//!
//! ```
//! use evd::math::NttContext;
//! use evd::params::EVD_Q;
//!
//! let ctx = NttContext::new(256, EVD_Q);
//! let mut coeffs = vec![1u64; 256];
//! ctx.forward(&mut coeffs);
//! ctx.inverse(&mut coeffs);
//! assert_eq!(coeffs[0], 1);
//! ```

use super::modular::ModQ;

/// Precomputed NTT context with twiddle factors.
///
/// Create once per (degree, modulus) pair and share it; the server keeps one
/// per ring it works in.
#[derive(Clone, Debug)]
pub struct NttContext {
    /// Ring dimension (power of two, at least 2).
    n: usize,
    q: u64,
    /// -q^(-1) mod 2^64 for Montgomery reduction.
    q_inv_neg: u64,
    /// 2^128 mod q, converts into Montgomery form.
    r_squared: u64,
    /// Forward twiddle factors (powers of ψ, bit-reversed order, Montgomery form).
    psi_powers: Vec<u64>,
    /// Inverse twiddle factors (powers of ψ^(-1)).
    psi_inv_powers: Vec<u64>,
    /// n^(-1) mod q in Montgomery form.
    n_inv: u64,
}

impl NttContext {
    /// Creates an NTT context for the given dimension and modulus.
    ///
    /// # Panics
    ///
    /// Panics if `n` is not a power of two at least 2, or if q ≢ 1 (mod 2n).
    /// Parameter sets are validated before any context is built.
    pub fn new(n: usize, q: u64) -> Self {
        assert!(n.is_power_of_two() && n >= 2, "n must be a power of two >= 2");
        assert!(q % (2 * n as u64) == 1, "q must be ≡ 1 (mod 2n)");

        let q_inv_neg = Self::compute_q_inv_neg(q);
        let r_squared = Self::compute_r_squared(q);

        let psi = Self::find_primitive_root(2 * n as u64, q);
        let psi_inv = ModQ::inv(psi, q);
        let psi_powers = Self::compute_twiddle_factors(n, psi, q, q_inv_neg, r_squared);
        let psi_inv_powers = Self::compute_twiddle_factors(n, psi_inv, q, q_inv_neg, r_squared);
        let n_inv = Self::to_montgomery(ModQ::inv(n as u64, q), q, r_squared, q_inv_neg);

        Self {
            n,
            q,
            q_inv_neg,
            r_squared,
            psi_powers,
            psi_inv_powers,
            n_inv,
        }
    }

    /// Returns the ring dimension.
    pub fn dimension(&self) -> usize {
        self.n
    }

    /// Returns the modulus q.
    pub fn modulus(&self) -> u64 {
        self.q
    }

    /// Forward NTT in place. Input is in standard form.
    ///
    /// # Panics
    ///
    /// Panics if `coeffs.len() != n`.
    pub fn forward(&self, coeffs: &mut [u64]) {
        assert_eq!(coeffs.len(), self.n, "Input length must match dimension");

        for c in coeffs.iter_mut() {
            *c = Self::to_montgomery(*c, self.q, self.r_squared, self.q_inv_neg);
        }

        let n = self.n;
        let q = self.q;
        let mut t = n;
        let mut m = 1;

        while m < n {
            t >>= 1;
            for i in 0..m {
                let j1 = 2 * i * t;
                let w = self.psi_powers[m + i];

                for j in j1..j1 + t {
                    let u = coeffs[j];
                    let v = self.montgomery_mul(coeffs[j + t], w);

                    coeffs[j] = if u + v >= q { u + v - q } else { u + v };
                    coeffs[j + t] = if u >= v { u - v } else { q - v + u };
                }
            }
            m <<= 1;
        }
    }

    /// Inverse NTT in place. Output is in standard form.
    ///
    /// # Panics
    ///
    /// Panics if `coeffs.len() != n`.
    pub fn inverse(&self, coeffs: &mut [u64]) {
        assert_eq!(coeffs.len(), self.n, "Input length must match dimension");

        let n = self.n;
        let q = self.q;
        let mut t = 1;
        let mut m = n;

        while m > 1 {
            m >>= 1;
            for i in 0..m {
                let j1 = i * 2 * t;
                let w = self.psi_inv_powers[m + i];

                for j in j1..j1 + t {
                    let u = coeffs[j];
                    let v = coeffs[j + t];

                    coeffs[j] = if u + v >= q { u + v - q } else { u + v };
                    let diff = if u >= v { u - v } else { q - v + u };
                    coeffs[j + t] = self.montgomery_mul(diff, w);
                }
            }
            t <<= 1;
        }

        // n^(-1) scaling and the Montgomery exit share one reduction
        for c in coeffs.iter_mut() {
            *c = self.montgomery_mul(self.montgomery_mul(*c, self.n_inv), 1);
        }
    }

    /// Pointwise product of two transformed polynomials.
    ///
    /// # Panics
    ///
    /// Panics if any slice length differs from n.
    pub fn pointwise_mul(&self, a: &[u64], b: &[u64], result: &mut [u64]) {
        assert_eq!(a.len(), self.n, "Input length must match dimension");
        assert_eq!(b.len(), self.n, "Input length must match dimension");
        assert_eq!(result.len(), self.n, "Input length must match dimension");

        for ((r, &x), &y) in result.iter_mut().zip(a).zip(b) {
            *r = self.montgomery_mul(x, y);
        }
    }

    /// Fused `acc += a * b` over transformed polynomials.
    pub fn pointwise_mul_acc(&self, acc: &mut [u64], a: &[u64], b: &[u64]) {
        assert_eq!(acc.len(), self.n, "Input length must match dimension");
        let q = self.q;
        for ((r, &x), &y) in acc.iter_mut().zip(a).zip(b) {
            let s = *r + self.montgomery_mul(x, y);
            *r = if s >= q { s - q } else { s };
        }
    }

    #[inline]
    fn montgomery_mul(&self, a: u64, b: u64) -> u64 {
        let q = self.q;
        let ab = (a as u128) * (b as u128);
        let m = ((ab as u64).wrapping_mul(self.q_inv_neg)) as u128;
        let t = ((ab + m * (q as u128)) >> 64) as u64;
        if t >= q {
            t - q
        } else {
            t
        }
    }

    fn to_montgomery(a: u64, q: u64, r_squared: u64, q_inv_neg: u64) -> u64 {
        let ab = (a as u128) * (r_squared as u128);
        let m = ((ab as u64).wrapping_mul(q_inv_neg)) as u128;
        let t = ((ab + m * (q as u128)) >> 64) as u64;
        if t >= q {
            t - q
        } else {
            t
        }
    }

    fn compute_q_inv_neg(q: u64) -> u64 {
        let mut y: u64 = 1;
        for i in 1..64 {
            let yi = y.wrapping_mul(q) & (1u64 << i);
            y |= yi;
        }
        y.wrapping_neg()
    }

    fn compute_r_squared(q: u64) -> u64 {
        let r_mod_q = (1u128 << 64) % (q as u128);
        ((r_mod_q * r_mod_q) % (q as u128)) as u64
    }

    /// Smallest-generator primitive `order`-th root of unity modulo q.
    ///
    /// Deterministic, so every context over the same (n, q) agrees on ψ.
    fn find_primitive_root(order: u64, q: u64) -> u64 {
        let exp = (q - 1) / order;
        let mut g = 2;
        loop {
            let candidate = ModQ::pow(g, exp, q);
            if ModQ::pow(candidate, order / 2, q) == q - 1 {
                return candidate;
            }
            g += 1;
        }
    }

    /// Powers ψ^brv(m) for m in 1..n, in Montgomery form.
    fn compute_twiddle_factors(
        n: usize,
        psi: u64,
        q: u64,
        q_inv_neg: u64,
        r_squared: u64,
    ) -> Vec<u64> {
        let log_n = n.trailing_zeros();
        let mut factors = vec![0u64; n];
        for (m, f) in factors.iter_mut().enumerate().skip(1) {
            let exp = (m.reverse_bits() >> (usize::BITS - log_n)) as u64;
            *f = Self::to_montgomery(ModQ::pow(psi, exp, q), q, r_squared, q_inv_neg);
        }
        factors
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::{EVD_P, EVD_Q};

    fn naive_negacyclic(a: &[u64], b: &[u64], q: u64) -> Vec<u64> {
        let n = a.len();
        let mut out = vec![0u64; n];
        for i in 0..n {
            for j in 0..n {
                let prod = ModQ::mul(a[i], b[j], q);
                if i + j < n {
                    out[i + j] = ModQ::add(out[i + j], prod, q);
                } else {
                    out[i + j - n] = ModQ::sub(out[i + j - n], prod, q);
                }
            }
        }
        out
    }

    #[test]
    fn test_ntt_inverse_roundtrip() {
        for n in [2, 16, 256, 4096] {
            let ctx = NttContext::new(n, EVD_Q);
            let original: Vec<u64> = (0..n as u64).map(|i| (i * 12345) % EVD_Q).collect();
            let mut coeffs = original.clone();
            ctx.forward(&mut coeffs);
            ctx.inverse(&mut coeffs);
            assert_eq!(coeffs, original, "roundtrip failed for n = {}", n);
        }
    }

    #[test]
    fn test_negacyclic_convolution() {
        // x * x^(n-1) = x^n = -1 (mod X^n + 1)
        let n = 256;
        let ctx = NttContext::new(n, EVD_Q);

        let mut a = vec![0u64; n];
        a[1] = 1;
        let mut b = vec![0u64; n];
        b[n - 1] = 1;

        ctx.forward(&mut a);
        ctx.forward(&mut b);
        let mut result = vec![0u64; n];
        ctx.pointwise_mul(&a, &b, &mut result);
        ctx.inverse(&mut result);

        assert_eq!(result[0], EVD_Q - 1);
        assert!(result[1..].iter().all(|&c| c == 0));
    }

    #[test]
    fn test_matches_naive_product() {
        let n = 32;
        for q in [EVD_Q, EVD_P] {
            let ctx = NttContext::new(n, q);
            let a: Vec<u64> = (0..n as u64).map(|i| (i * i * 7919 + 3) % q).collect();
            let b: Vec<u64> = (0..n as u64).map(|i| q - 1 - i * 31).collect();
            let expected = naive_negacyclic(&a, &b, q);

            let (mut fa, mut fb) = (a.clone(), b.clone());
            ctx.forward(&mut fa);
            ctx.forward(&mut fb);
            let mut acc = vec![0u64; n];
            ctx.pointwise_mul_acc(&mut acc, &fa, &fb);
            ctx.inverse(&mut acc);
            assert_eq!(acc, expected);
        }
    }

    #[test]
    fn test_linearity() {
        let n = 256;
        let q = EVD_Q;
        let ctx = NttContext::new(n, q);

        let a: Vec<u64> = (0..n as u64).collect();
        let b: Vec<u64> = (0..n as u64).map(|i| (i * 2) % q).collect();
        let (mut fa, mut fb) = (a.clone(), b.clone());
        ctx.forward(&mut fa);
        ctx.forward(&mut fb);

        let mut sum: Vec<u64> = a.iter().zip(&b).map(|(&x, &y)| (x + y) % q).collect();
        ctx.forward(&mut sum);

        for i in 0..n {
            assert_eq!(sum[i], (fa[i] + fb[i]) % q);
        }
    }
}
