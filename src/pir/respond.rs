//! PIR Respond: server-side selection
//!
//! Implements PIR.Respond(payloads, query) → response
//!
//! # Query expansion
//!
//! A ciphertext encrypting `Σ_j v_j X^j` is split level by level: at level
//! `l` with `g = N / 2^l + 1`,
//! ```text
//! c0 = c + τ_g(c)                  keeps the exponents ≡ 0 (mod 2^(l+1))
//! c1 = (c - τ_g(c)) · X^(-2^l)     keeps the others, shifted down
//! ```
//! After `log2 B` levels entry `j` encrypts `2^(log B) · v_j` as a constant,
//! which the client cancelled in advance with `B⁻¹`.

use rayon::prelude::*;

use crate::error::{crypto_err, validation_err, Result};
use crate::ks::{automorphism_key_switch, InvAutKeys};
use crate::math::{Polynomial, RingContext};
use crate::rlwe::{multiply_monomial, Ciphertext};

use super::query::{block_count, block_size, PirQuery, PirResponse};

/// Expands one selection ciphertext into `2^levels` constant selectors.
///
/// Input and output are in coefficient domain.
pub fn expand(ct: &Ciphertext, levels: usize, keys: &InvAutKeys, ring: &RingContext) -> Vec<Ciphertext> {
    let n = ring.degree();
    let mut cts = vec![ct.clone()];
    for level in 0..levels {
        let g = InvAutKeys::galois_element(n, level);
        let key = &keys.keys[level];
        let shift = 2 * n - (1 << level);
        let expanded: Vec<(Ciphertext, Ciphertext)> = cts
            .par_iter()
            .map(|c| {
                let rotated = automorphism_key_switch(c, g, key, ring);
                let mut even = c.clone();
                even += &rotated;
                let mut odd = c.clone();
                odd -= &rotated;
                let odd = Ciphertext::new(
                    multiply_monomial(&odd.a, shift),
                    multiply_monomial(&odd.b, shift),
                );
                (even, odd)
            })
            .collect();
        let (evens, odds): (Vec<_>, Vec<_>) = expanded.into_iter().unzip();
        cts = evens.into_iter().chain(odds).collect();
    }
    cts
}

/// PIR.Respond(payloads, query) → response
///
/// # Arguments
/// * `query` - selection ciphertexts sized for `payloads.len()` entries
/// * `payloads` - NTT-domain payload polynomials, one per entry
/// * `keys` - expansion keys
/// * `ring` - NTT tables at the ring degree
pub fn respond(
    query: &PirQuery,
    payloads: &[Polynomial],
    keys: &InvAutKeys,
    ring: &RingContext,
) -> Result<PirResponse> {
    let (n, q) = (ring.degree(), ring.modulus_q());
    let count = payloads.len();
    if count == 0 {
        return Err(validation_err!("nothing to retrieve from an empty collection"));
    }
    let block = block_size(count, n);
    if query.block_size != block || query.cts.len() != block_count(count, n) {
        return Err(validation_err!(
            "query shaped for {} blocks of {}, collection needs {} of {}",
            query.cts.len(),
            query.block_size,
            block_count(count, n),
            block
        ));
    }
    let levels = block.trailing_zeros() as usize;
    if keys.levels() < levels {
        return Err(crypto_err!(
            "{} expansion keys cannot expand {} levels",
            keys.levels(),
            levels
        ));
    }
    for ct in &query.cts {
        if ct.is_extended() {
            return Err(validation_err!("selection ciphertext must have two components"));
        }
        ct.validate(n, q, false)?;
    }

    let mut sum = query
        .cts
        .par_iter()
        .enumerate()
        .map(|(b, ct)| {
            let selectors = expand(ct, levels, keys, ring);
            let mut acc = Ciphertext::zero(n, q);
            acc.to_ntt(&ring.q);
            for (mut sel, payload) in selectors.into_iter().zip(&payloads[b * block..]) {
                sel.to_ntt(&ring.q);
                acc.a.mul_acc_ntt_domain(&sel.a, payload, &ring.q);
                acc.b.mul_acc_ntt_domain(&sel.b, payload, &ring.q);
            }
            acc
        })
        .reduce_with(|mut x, y| {
            x += &y;
            x
        })
        .ok_or_else(|| validation_err!("empty selection query"))?;
    sum.from_ntt(&ring.q);
    Ok(PirResponse { ct: sum })
}
