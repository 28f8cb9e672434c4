//! Galois automorphisms and monomial shifts
//!
//! Galois automorphisms τ_g: R → R are ring automorphisms defined by
//! τ_g(X) = X^g for odd g. For R = Z[X]/(X^n + 1) they form the group
//! (Z/2nZ)^*, of order n.

use crate::math::{ModQ, Polynomial};

use super::types::Ciphertext;

/// Apply Galois automorphism τ_g to a coefficient-domain polynomial
///
/// X^i maps to X^(g·i mod 2n), with a sign flip when g·i mod 2n ≥ n.
pub fn apply_automorphism(poly: &Polynomial, g: usize) -> Polynomial {
    assert!(g % 2 == 1, "Galois element must be odd");
    let n = poly.degree();
    let q = poly.modulus();
    let two_n = 2 * n;

    let mut out = Polynomial::zero(n, q);
    let coeffs = out.coeffs_mut();
    for i in 0..n {
        let c = poly.coeff(i);
        if c == 0 {
            continue;
        }
        let idx = (g * i) % two_n;
        if idx < n {
            coeffs[idx] = c;
        } else {
            coeffs[idx - n] = ModQ::negate(c, q);
        }
    }
    out
}

/// Multiply by the monomial X^exponent (exponent taken mod 2n)
pub fn multiply_monomial(poly: &Polynomial, exponent: usize) -> Polynomial {
    let n = poly.degree();
    let q = poly.modulus();
    let e = exponent % (2 * n);

    let mut out = Polynomial::zero(n, q);
    let coeffs = out.coeffs_mut();
    for i in 0..n {
        let c = poly.coeff(i);
        let idx = (i + e) % (2 * n);
        if idx < n {
            coeffs[idx] = c;
        } else {
            coeffs[idx - n] = ModQ::negate(c, q);
        }
    }
    out
}

/// τ_g on both components of a ciphertext
///
/// The result decrypts under τ_g(s); key switching brings it back to s.
pub fn automorphism_ciphertext(ct: &Ciphertext, g: usize) -> Ciphertext {
    assert!(ct.c.is_none(), "Cannot rotate an extended ciphertext");
    Ciphertext::new(apply_automorphism(&ct.a, g), apply_automorphism(&ct.b, g))
}

/// g^(-1) in (Z/2nZ)^*
pub fn inverse_galois_element(g: usize, two_n: usize) -> usize {
    assert!(g % 2 == 1, "Galois element must be odd");
    // The group has order n, so g^(n-1) = g^(-1).
    let mut result = 1usize;
    let mut base = g % two_n;
    let mut exp = two_n / 2 - 1;
    while exp > 0 {
        if exp & 1 == 1 {
            result = result * base % two_n;
        }
        base = base * base % two_n;
        exp >>= 1;
    }
    result
}

/// Reverses the low `bits` bits of `x`
#[inline]
pub fn bit_reverse(x: usize, bits: u32) -> usize {
    if bits == 0 {
        return 0;
    }
    x.reverse_bits() >> (usize::BITS - bits)
}
