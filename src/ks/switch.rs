//! Hybrid key switching
//!
//! To switch `d` (mod Q) from s' to s, lift d to the modulus P through its
//! centered representative, multiply by the key under both moduli and divide
//! the result by P:
//! ```text
//! (a, b) = ModDown(d · (a_q, b_q), d · (a_p, b_p))
//! ModDown(x_q, x_p) = (x_q - [x_p]) · P^(-1)   (mod Q)
//! ```
//! so that `a·s + b ≈ d·s'`. Sums of several switches are accumulated before
//! the single ModDown.

use crate::error::{crypto_err, Result};
use crate::math::{ModQ, Polynomial, RingContext};
use crate::rlwe::{apply_automorphism, Ciphertext};

use super::types::{MLWESwitchingKey, SwitchingKey};

fn mod_down(x_q: &Polynomial, x_p: &Polynomial, q: u64, p: u64) -> Polynomial {
    let p_inv = ModQ::inv(p % q, q);
    let coeffs = x_q
        .coeffs()
        .iter()
        .zip(x_p.coeffs())
        .map(|(&xq, &xp)| {
            let diff = ModQ::sub(xq, ModQ::lift_centered(xp, p, q), q);
            ModQ::mul(diff, p_inv, q)
        })
        .collect();
    Polynomial::from_coeffs(coeffs, q)
}

/// Accumulates `Σ d_i · key_i` for degree-N keys.
pub struct KeySwitchAccumulator<'a> {
    ring: &'a RingContext,
    a_q: Polynomial,
    a_p: Polynomial,
    b_q: Polynomial,
    b_p: Polynomial,
}

impl<'a> KeySwitchAccumulator<'a> {
    /// Empty accumulator over the ring
    pub fn new(ring: &'a RingContext) -> Self {
        let n = ring.degree();
        let zero_q = Polynomial::zero(n, ring.modulus_q()).to_ntt_new(&ring.q);
        let zero_p = Polynomial::zero(n, ring.modulus_p()).to_ntt_new(&ring.p);
        Self {
            ring,
            a_q: zero_q.clone(),
            a_p: zero_p.clone(),
            b_q: zero_q,
            b_p: zero_p,
        }
    }

    /// Adds `d · key` for a coefficient-domain `d` modulo Q
    pub fn add(&mut self, d: &Polynomial, key: &SwitchingKey) {
        let ring = self.ring;
        let d_q = d.to_ntt_new(&ring.q);
        let d_p = d.lift_to(ring.modulus_p()).to_ntt_new(&ring.p);
        self.a_q.mul_acc_ntt_domain(&d_q, &key.a_q, &ring.q);
        self.b_q.mul_acc_ntt_domain(&d_q, &key.b_q, &ring.q);
        self.a_p.mul_acc_ntt_domain(&d_p, &key.a_p, &ring.p);
        self.b_p.mul_acc_ntt_domain(&d_p, &key.b_p, &ring.p);
    }

    /// ModDown of the accumulated sum: `(a, b)` in coefficient domain modulo Q
    pub fn finish(mut self) -> (Polynomial, Polynomial) {
        let ring = self.ring;
        let (q, p) = (ring.modulus_q(), ring.modulus_p());
        self.a_q.from_ntt(&ring.q);
        self.b_q.from_ntt(&ring.q);
        self.a_p.from_ntt(&ring.p);
        self.b_p.from_ntt(&ring.p);
        (
            mod_down(&self.a_q, &self.a_p, q, p),
            mod_down(&self.b_q, &self.b_p, q, p),
        )
    }
}

/// Accumulates `Σ φ(u_i) · key_i` with keys in component layout.
///
/// Every product stays in R_rank: `φ(u) · K = Σ_j X^j φ(u · K_j)`.
pub struct ComponentKeySwitchAccumulator<'a> {
    rank_ring: &'a RingContext,
    /// Per component: (a_q, a_p, b_q, b_p) in NTT domain
    parts: Vec<[Polynomial; 4]>,
}

impl<'a> ComponentKeySwitchAccumulator<'a> {
    /// Empty accumulator for `stack` components of degree `rank_ring.degree()`
    pub fn new(rank_ring: &'a RingContext, stack: usize) -> Self {
        let r = rank_ring.degree();
        let zero_q = Polynomial::zero(r, rank_ring.modulus_q()).to_ntt_new(&rank_ring.q);
        let zero_p = Polynomial::zero(r, rank_ring.modulus_p()).to_ntt_new(&rank_ring.p);
        Self {
            rank_ring,
            parts: vec![[zero_q.clone(), zero_p.clone(), zero_q, zero_p]; stack],
        }
    }

    /// Adds `φ(u) · key` for a coefficient-domain `u` in R_rank modulo Q
    pub fn add(&mut self, u: &Polynomial, key: &MLWESwitchingKey) {
        let ring = self.rank_ring;
        let u_q = u.to_ntt_new(&ring.q);
        let u_p = u.lift_to(ring.modulus_p()).to_ntt_new(&ring.p);
        for ([a_q, a_p, b_q, b_p], k) in self.parts.iter_mut().zip(&key.components) {
            a_q.mul_acc_ntt_domain(&u_q, &k.a_q, &ring.q);
            a_p.mul_acc_ntt_domain(&u_p, &k.a_p, &ring.p);
            b_q.mul_acc_ntt_domain(&u_q, &k.b_q, &ring.q);
            b_p.mul_acc_ntt_domain(&u_p, &k.b_p, &ring.p);
        }
    }

    /// Interleaves the components and mods down: `(a, b)` of degree N, coefficient domain
    pub fn finish(self) -> (Polynomial, Polynomial) {
        let ring = self.rank_ring;
        let (q, p) = (ring.modulus_q(), ring.modulus_p());
        let mut a_q = Vec::with_capacity(self.parts.len());
        let mut a_p = Vec::with_capacity(self.parts.len());
        let mut b_q = Vec::with_capacity(self.parts.len());
        let mut b_p = Vec::with_capacity(self.parts.len());
        for [x_aq, x_ap, x_bq, x_bp] in self.parts {
            a_q.push(x_aq.from_ntt_new(&ring.q));
            a_p.push(x_ap.from_ntt_new(&ring.p));
            b_q.push(x_bq.from_ntt_new(&ring.q));
            b_p.push(x_bp.from_ntt_new(&ring.p));
        }
        (
            mod_down(&Polynomial::interleave(&a_q), &Polynomial::interleave(&a_p), q, p),
            mod_down(&Polynomial::interleave(&b_q), &Polynomial::interleave(&b_p), q, p),
        )
    }
}

/// Switch a single coefficient-domain `d` with `key`.
pub fn key_switch(d: &Polynomial, key: &SwitchingKey, ring: &RingContext) -> (Polynomial, Polynomial) {
    let mut acc = KeySwitchAccumulator::new(ring);
    acc.add(d, key);
    acc.finish()
}

/// Collapses an extended ciphertext (a, b, c) under (s², s, 1) to (a', b') under s.
///
/// Input and output are in coefficient domain.
pub fn relinearize(ct: &Ciphertext, relin_key: &SwitchingKey, ring: &RingContext) -> Result<Ciphertext> {
    let c = ct
        .c
        .as_ref()
        .ok_or_else(|| crypto_err!("relinearization needs an extended ciphertext"))?;
    if ct.is_ntt() {
        return Err(crypto_err!("relinearization expects coefficient domain"));
    }
    let (ks_a, ks_b) = key_switch(&ct.a, relin_key, ring);
    Ok(Ciphertext::new(&ks_a + &ct.b, &ks_b + c))
}

/// τ_g followed by a switch from τ_g(s) back to s.
pub fn automorphism_key_switch(
    ct: &Ciphertext,
    g: usize,
    key: &SwitchingKey,
    ring: &RingContext,
) -> Ciphertext {
    let (a, b) = key_switch(&apply_automorphism(&ct.a, g), key, ring);
    Ciphertext::new(a, &b + &apply_automorphism(&ct.b, g))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ks::{generate_relin_key, generate_switching_key, split_switching_key};
    use crate::math::Sampler;
    use crate::params::{EvdParams, RankLayout};
    use crate::rlwe::{decrypt, encrypt, SecretKey};

    fn test_params() -> EvdParams {
        EvdParams::with_degree(256)
    }

    fn setup(seed: u64) -> (EvdParams, RingContext, SecretKey, Sampler) {
        let params = test_params();
        let ring = RingContext::new(params.degree, params.q, params.p);
        let mut sampler = Sampler::with_seed(params.sigma, seed);
        let sk = SecretKey::generate(&params, &ring, &mut sampler);
        (params, ring, sk, sampler)
    }

    #[test]
    fn test_key_switch_noise() {
        let (params, ring, sk, mut sampler) = setup(41);
        let target = Polynomial::from_signed(&sampler.sparse_ternary(256, 100), params.q);
        let key = generate_switching_key(&sk, &target, &ring, &mut sampler);

        let d = Polynomial::uniform(256, params.q, &mut sampler);
        let (a, b) = key_switch(&d, &key, &ring);
        let got = decrypt(&Ciphertext::new(a, b), &sk, &ring).unwrap();
        let want = d.mul_ntt(&target, &ring.q);

        let noise = (&got - &want).linf_norm();
        assert!(noise < 1 << 10, "key switch noise {}", noise);
    }

    #[test]
    fn test_relinearize_product() {
        let (params, ring, sk, mut sampler) = setup(42);
        let relin = generate_relin_key(&sk, &ring, &mut sampler);

        let m1 = Polynomial::from_signed(&[1 << 20; 256], params.q);
        let mut m2 = Polynomial::zero(256, params.q);
        m2.set_coeff(0, 1 << 20);

        let mut c1 = encrypt(&sk, &m1, &ring, &mut sampler).unwrap();
        let mut c2 = encrypt(&sk, &m2, &ring, &mut sampler).unwrap();
        c1.to_ntt(&ring.q);
        c2.to_ntt(&ring.q);

        let a = c1.a.mul_ntt_domain(&c2.a, &ring.q);
        let mut b = c1.a.mul_ntt_domain(&c2.b, &ring.q);
        b.mul_acc_ntt_domain(&c1.b, &c2.a, &ring.q);
        let c = c1.b.mul_ntt_domain(&c2.b, &ring.q);
        let mut ext = Ciphertext::extended(a, b, c);
        ext.from_ntt(&ring.q);

        let relin_ct = relinearize(&ext, &relin, &ring).unwrap();
        assert!(!relin_ct.is_extended());
        let dec = decrypt(&relin_ct, &sk, &ring).unwrap();
        for i in 0..256 {
            let v = dec.centered(i) as f64 / (1u64 << 40) as f64;
            assert!((v - 1.0).abs() < 1e-3, "slot {} = {}", i, v);
        }
    }

    #[test]
    fn test_relinearize_rejects_plain_ciphertext() {
        let (params, ring, sk, mut sampler) = setup(43);
        let relin = generate_relin_key(&sk, &ring, &mut sampler);
        let ct = Ciphertext::zero(256, params.q);
        assert!(relinearize(&ct, &relin, &ring).is_err());
    }

    #[test]
    fn test_component_accumulator_matches_full() {
        let (params, ring, sk, mut sampler) = setup(44);
        let layout = RankLayout::for_dimension(16, params.degree).unwrap();
        let rank_ring = RingContext::new(layout.rank, params.q, params.p);
        let target = Polynomial::from_signed(&sampler.sparse_ternary(256, 50), params.q);
        let key = generate_switching_key(&sk, &target, &ring, &mut sampler);
        let split = split_switching_key(&key, &layout, &ring, &rank_ring);

        let u = Polynomial::uniform(layout.rank, params.q, &mut sampler);
        let mut comp = ComponentKeySwitchAccumulator::new(&rank_ring, layout.stack);
        comp.add(&u, &split);

        assert_eq!(comp.finish(), key_switch(&u.embed(layout.stack), &key, &ring));
    }

    #[test]
    fn test_automorphism_key_switch() {
        let (params, ring, sk, mut sampler) = setup(45);
        let g = 5;
        let s = sk.coeff_q(&ring.q);
        let key = generate_switching_key(&sk, &apply_automorphism(&s, g), &ring, &mut sampler);

        let values: Vec<i64> = (0..256).map(|i| i * 1000).collect();
        let m = Polynomial::from_signed(&values, params.q);
        let ct = encrypt(&sk, &m, &ring, &mut sampler).unwrap();

        let rotated = automorphism_key_switch(&ct, g, &key, &ring);
        let dec = decrypt(&rotated, &sk, &ring).unwrap();
        let noise = (&dec - &apply_automorphism(&m, g)).linf_norm();
        assert!(noise < 1 << 10);
    }
}
