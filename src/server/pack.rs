//! Mod-packing and the key butterfly.
//!
//! Mod-packing turns MLWE ciphertexts over R_rank, decrypting under the
//! rotated secret τ_g(σ), into one RLWE ciphertext of degree N under s. Each
//! MLWE mask component is switched with the key for φ(τ_g(σ_t)).

use crate::ks::{ComponentKeySwitchAccumulator, KeySwitchAccumulator, MLWESwitchingKey, SwitchingKey};
use crate::math::{Polynomial, RingContext};
use crate::rlwe::{bit_reverse, Ciphertext, MLWECiphertext};

/// Packs a single MLWE ciphertext into component 0 of a degree-N ciphertext.
///
/// Every product stays in R_rank, which keeps the query path cheap.
pub(crate) fn pack_single(
    ct: &MLWECiphertext,
    keys: &[MLWESwitchingKey],
    stack: usize,
    rank_ring: &RingContext,
) -> Ciphertext {
    let mut acc = ComponentKeySwitchAccumulator::new(rank_ring, stack);
    for (a_t, key) in ct.a.iter().zip(keys) {
        acc.add(a_t, key);
    }
    let (a, b) = acc.finish();
    Ciphertext::new(a, &b + &ct.b.embed(stack))
}

/// Packs `stack` MLWE ciphertexts, the i-th landing in component i.
pub(crate) fn pack_components(
    cts: &[MLWECiphertext],
    keys: &[SwitchingKey],
    ring: &RingContext,
) -> Ciphertext {
    let bodies: Vec<Polynomial> = cts.iter().map(|c| c.b.clone()).collect();
    let body = Polynomial::interleave(&bodies);

    let mut acc = KeySwitchAccumulator::new(ring);
    for (t, key) in keys.iter().enumerate() {
        let masks: Vec<Polynomial> = cts.iter().map(|c| c.a[t].clone()).collect();
        acc.add(&Polynomial::interleave(&masks), key);
    }
    let (a, b) = acc.finish();
    Ciphertext::new(a, &body + &b)
}

/// In-place negacyclic butterfly over a column of `rank` ciphertexts.
///
/// Afterwards entry `j` holds `Σ_c Y^(c·h) · column[c]` with
/// `h = 2·brv(j) + 1`.
pub(crate) fn butterfly(column: &mut [MLWECiphertext], log_rank: u32) {
    let n = column.len();
    debug_assert_eq!(n, 1 << log_rank);
    let mut t = n;
    let mut m = 1;
    while m < n {
        t /= 2;
        for i in 0..m {
            let start = 2 * i * t;
            let w = bit_reverse(m + i, log_rank);
            for j in start..start + t {
                let v = column[j + t].multiply_monomial(w);
                let mut lower = column[j].clone();
                lower -= &v;
                column[j] += &v;
                column[j + t] = lower;
            }
        }
        m *= 2;
    }
}

/// Exponent `h` reached by butterfly output `j`
pub(crate) fn butterfly_exponent(j: usize, log_rank: u32) -> usize {
    2 * bit_reverse(j, log_rank) + 1
}
