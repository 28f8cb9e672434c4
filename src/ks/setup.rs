//! Switching key generation

use crate::math::{NttContext, Polynomial, RingContext, Sampler};
use crate::params::RankLayout;
use crate::rlwe::{apply_automorphism, mlwe_secret, SecretKey};

use super::types::{
    AutedModPackKeys, AutedModPackMLWEKeys, InvAutKeys, MLWESwitchingKey, SwitchingKey,
};

/// Generate a switching key from `target` (coefficient domain mod Q, small
/// coefficients) to the secret `sk`.
pub fn generate_switching_key(
    sk: &SecretKey,
    target: &Polynomial,
    ring: &RingContext,
    sampler: &mut Sampler,
) -> SwitchingKey {
    let n = sk.degree();
    let (q, p) = (ring.modulus_q(), ring.modulus_p());
    assert_eq!(target.degree(), n, "Target degree must match the key");

    let mut a_q = Polynomial::uniform(n, q, sampler);
    a_q.to_ntt(&ring.q);
    let mut a_p = Polynomial::uniform(n, p, sampler);
    a_p.to_ntt(&ring.p);

    let e = sampler.gaussian_vec(n);

    let mut b_q = Polynomial::from_signed(&e, q);
    b_q += &target.scalar_mul(p % q);
    b_q.to_ntt(&ring.q);
    b_q -= &a_q.mul_ntt_domain(sk.mod_q(), &ring.q);

    let mut b_p = Polynomial::from_signed(&e, p);
    b_p.to_ntt(&ring.p);
    b_p -= &a_p.mul_ntt_domain(sk.mod_p(), &ring.p);

    SwitchingKey { a_q, a_p, b_q, b_p }
}

/// Splits a degree-N key into `stack` component keys over R_rank.
pub fn split_switching_key(
    key: &SwitchingKey,
    layout: &RankLayout,
    ring: &RingContext,
    rank_ring: &RingContext,
) -> MLWESwitchingKey {
    let parts = |poly: &Polynomial, ctx_n: &NttContext, ctx_r: &NttContext| -> Vec<Polynomial> {
        let coeff = poly.from_ntt_new(ctx_n);
        (0..layout.stack)
            .map(|j| coeff.component(j, layout.stack).to_ntt_new(ctx_r))
            .collect()
    };
    let a_q = parts(&key.a_q, &ring.q, &rank_ring.q);
    let a_p = parts(&key.a_p, &ring.p, &rank_ring.p);
    let b_q = parts(&key.b_q, &ring.q, &rank_ring.q);
    let b_p = parts(&key.b_p, &ring.p, &rank_ring.p);

    let components = a_q
        .into_iter()
        .zip(a_p)
        .zip(b_q.into_iter().zip(b_p))
        .map(|((a_q, a_p), (b_q, b_p))| SwitchingKey { a_q, a_p, b_q, b_p })
        .collect();
    MLWESwitchingKey { components }
}

/// Relinearization key: switches s² to s.
pub fn generate_relin_key(sk: &SecretKey, ring: &RingContext, sampler: &mut Sampler) -> SwitchingKey {
    let s = sk.coeff_q(&ring.q);
    let s_squared = s.mul_ntt(&s, &ring.q);
    generate_switching_key(sk, &s_squared, ring, sampler)
}

/// Targets φ(τ_{2i+1}(σ_j)) for every automorphism row i and MLWE component j.
fn mod_pack_targets(sk: &SecretKey, layout: &RankLayout, ring: &RingContext) -> Vec<Vec<Polynomial>> {
    let sigma = mlwe_secret(&sk.coeff_q(&ring.q), layout.stack);
    (0..layout.rank)
        .map(|i| {
            let g = 2 * i + 1;
            sigma
                .iter()
                .map(|s| apply_automorphism(s, g).embed(layout.stack))
                .collect()
        })
        .collect()
}

/// Keys packing rotated MLWE components into one RLWE ciphertext.
pub fn generate_auted_mod_pack_keys(
    sk: &SecretKey,
    layout: &RankLayout,
    ring: &RingContext,
    sampler: &mut Sampler,
) -> AutedModPackKeys {
    let keys = mod_pack_targets(sk, layout, ring)
        .iter()
        .map(|row| {
            row.iter()
                .map(|target| generate_switching_key(sk, target, ring, sampler))
                .collect()
        })
        .collect();
    AutedModPackKeys { keys }
}

/// The mod-pack keys in component layout, for inputs that live in R_rank.
pub fn generate_auted_mod_pack_mlwe_keys(
    sk: &SecretKey,
    layout: &RankLayout,
    ring: &RingContext,
    rank_ring: &RingContext,
    sampler: &mut Sampler,
) -> AutedModPackMLWEKeys {
    let keys = mod_pack_targets(sk, layout, ring)
        .iter()
        .map(|row| {
            row.iter()
                .map(|target| {
                    let key = generate_switching_key(sk, target, ring, sampler);
                    split_switching_key(&key, layout, ring, rank_ring)
                })
                .collect()
        })
        .collect();
    AutedModPackMLWEKeys { keys }
}

/// One key per level of the PIR expansion tree.
pub fn generate_inv_aut_keys(sk: &SecretKey, ring: &RingContext, sampler: &mut Sampler) -> InvAutKeys {
    let n = sk.degree();
    let s = sk.coeff_q(&ring.q);
    let keys = (0..n.trailing_zeros() as usize)
        .map(|level| {
            let g = InvAutKeys::galois_element(n, level);
            generate_switching_key(sk, &apply_automorphism(&s, g), ring, sampler)
        })
        .collect();
    InvAutKeys { keys }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::EvdParams;

    fn test_params() -> EvdParams {
        EvdParams::with_degree(64)
    }

    #[test]
    fn test_switching_key_relation() {
        let params = test_params();
        let ring = RingContext::new(params.degree, params.q, params.p);
        let mut sampler = Sampler::with_seed(params.sigma, 31);
        let sk = SecretKey::generate(&params, &ring, &mut sampler);
        let target = Polynomial::from_signed(&sampler.sparse_ternary(64, 10), params.q);

        let key = generate_switching_key(&sk, &target, &ring, &mut sampler);
        assert!(key.validate(64, params.q, params.p).is_ok());

        // b_q + a_q·s - (P mod Q)·s' is the small error
        let mut lhs = key.a_q.mul_ntt_domain(sk.mod_q(), &ring.q);
        lhs += &key.b_q;
        lhs.from_ntt(&ring.q);
        let err = &lhs - &target.scalar_mul(params.p % params.q);
        assert!(err.linf_norm() < 40);

        // the same error modulo P
        let mut lhs_p = key.a_p.mul_ntt_domain(sk.mod_p(), &ring.p);
        lhs_p += &key.b_p;
        lhs_p.from_ntt(&ring.p);
        for i in 0..64 {
            assert_eq!(lhs_p.centered(i), err.centered(i));
        }
    }

    #[test]
    fn test_key_set_shapes() {
        let params = test_params();
        let layout = RankLayout::for_dimension(4, params.degree).unwrap();
        let ring = RingContext::new(params.degree, params.q, params.p);
        let rank_ring = RingContext::new(layout.rank, params.q, params.p);
        let mut sampler = Sampler::with_seed(params.sigma, 32);
        let sk = SecretKey::generate(&params, &ring, &mut sampler);

        let ampk = generate_auted_mod_pack_keys(&sk, &layout, &ring, &mut sampler);
        assert!(ampk.validate(&layout, 64, params.q, params.p).is_ok());

        let mlwe = generate_auted_mod_pack_mlwe_keys(&sk, &layout, &ring, &rank_ring, &mut sampler);
        assert!(mlwe.validate(&layout, params.q, params.p).is_ok());
        assert!(mlwe.validate(&RankLayout::for_dimension(8, 64).unwrap(), params.q, params.p).is_err());

        let inv = generate_inv_aut_keys(&sk, &ring, &mut sampler);
        assert_eq!(inv.levels(), 6);
        assert!(inv.validate(64, params.q, params.p).is_ok());
    }

    #[test]
    fn test_split_then_interleave_recovers_key() {
        let params = test_params();
        let layout = RankLayout::for_dimension(8, params.degree).unwrap();
        let ring = RingContext::new(params.degree, params.q, params.p);
        let rank_ring = RingContext::new(layout.rank, params.q, params.p);
        let mut sampler = Sampler::with_seed(params.sigma, 33);
        let sk = SecretKey::generate(&params, &ring, &mut sampler);
        let key = generate_relin_key(&sk, &ring, &mut sampler);

        let split = split_switching_key(&key, &layout, &ring, &rank_ring);
        let parts: Vec<Polynomial> = split
            .components
            .iter()
            .map(|c| c.b_p.from_ntt_new(&rank_ring.p))
            .collect();
        assert_eq!(Polynomial::interleave(&parts), key.b_p.from_ntt_new(&ring.p));
    }
}
