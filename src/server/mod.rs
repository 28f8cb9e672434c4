//! Homomorphic inner products over packed MLWE ciphertexts.
//!
//! The [`Server`] holds only public evaluation keys. For a query `x` and a
//! block of keys `y_0..y_{N-1}` it returns one RLWE ciphertext whose
//! coefficient `n` decrypts to `<x, y_n>` (times the product of both scales).
//!
//! # Algorithm
//!
//! With the query reversed by τ_{2r-1} and both sides pre-multiplied by
//! r^(-1), the constant coefficient of `q_rev · y` in R_rank is the dot
//! product. Summing `τ_g(q_rev · W)` over all Galois elements g of R_rank
//! (the trace) keeps exactly that coefficient, times r:
//! 1. **cache_query**: τ_g(query) for every g, mod-packed into degree N
//! 2. **cache_keys**: a butterfly over each component column produces
//!    `W_g = Σ_c Y^(c·g⁻¹) y_c`, then τ_g and a mod-pack interleave the
//!    `stack` components into one ciphertext per g
//! 3. **inner_product**: `r · Σ_g Q_g ⊗ K_g`, relinearized
//!
//! Key `n` of a block sits in column `n / stack`, component `n % stack`, and
//! its score ends up in coefficient `n`.

mod cache;
mod pack;

use rayon::prelude::*;

use crate::error::{crypto_err, validation_err, Result};
use crate::ks::{relinearize, AutedModPackKeys, AutedModPackMLWEKeys, SwitchingKey};
use crate::math::{ModQ, RingContext};
use crate::message::{self, Message};
use crate::params::RankLayout;
use crate::rlwe::{apply_automorphism, inverse_galois_element, Ciphertext, MLWECiphertext};

pub use cache::{CachedKeys, CachedQuery};

/// Evaluation side of the protocol for one MLWE rank.
pub struct Server {
    layout: RankLayout,
    ring: RingContext,
    rank_ring: RingContext,
    relin_key: SwitchingKey,
    mod_pack_keys: AutedModPackKeys,
    mod_pack_mlwe_keys: AutedModPackMLWEKeys,
}

impl Server {
    /// Builds a server from the client's public keys.
    ///
    /// Ring degree and moduli are taken from the relinearization key; every
    /// other key must agree with them and with `log_rank`.
    pub fn new(
        log_rank: u32,
        relin_key: SwitchingKey,
        mod_pack_keys: AutedModPackKeys,
        mod_pack_mlwe_keys: AutedModPackMLWEKeys,
    ) -> Result<Self> {
        let degree = relin_key.degree();
        let q = relin_key.a_q.modulus();
        let p = relin_key.a_p.modulus();
        let two_n = 2 * degree as u64;
        if !degree.is_power_of_two() || degree < 4 || q % two_n != 1 || p % two_n != 1 {
            return Err(crypto_err!(
                "relinearization key does not describe an NTT ring (degree {})",
                degree
            ));
        }
        let layout = RankLayout::from_log_rank(log_rank, degree)
            .map_err(|e| crypto_err!("{}", e.message()))?;

        relin_key.validate(degree, q, p)?;
        mod_pack_keys.validate(&layout, degree, q, p)?;
        mod_pack_mlwe_keys.validate(&layout, q, p)?;

        Ok(Self {
            ring: RingContext::new(degree, q, p),
            rank_ring: RingContext::new(layout.rank, q, p),
            layout,
            relin_key,
            mod_pack_keys,
            mod_pack_mlwe_keys,
        })
    }

    /// MLWE layout the keys were generated for
    pub fn layout(&self) -> &RankLayout {
        &self.layout
    }

    /// Ring degree N
    pub fn degree(&self) -> usize {
        self.ring.degree()
    }

    /// Ciphertext modulus
    pub fn modulus(&self) -> u64 {
        self.ring.modulus_q()
    }

    /// Largest number of keys one [`CachedKeys`] block holds
    pub fn block_size(&self) -> usize {
        self.ring.degree()
    }

    /// Rotates and packs an encrypted query.
    pub fn cache_query(&self, query: &MLWECiphertext) -> Result<CachedQuery> {
        query.validate(&self.layout, self.modulus())?;
        let stack = self.layout.stack;
        let cts = (0..self.layout.rank)
            .into_par_iter()
            .map(|i| {
                let rotated = query.automorphism(2 * i + 1);
                let mut ct = pack::pack_single(
                    &rotated,
                    &self.mod_pack_mlwe_keys.keys[i],
                    stack,
                    &self.rank_ring,
                );
                ct.to_ntt(&self.ring.q);
                ct
            })
            .collect();
        Ok(CachedQuery::Encrypted(cts))
    }

    /// Rotates a plaintext query the same way [`Server::cache_query`] does.
    pub fn cache_query_plain(&self, query: &Message, scale: f64) -> Result<CachedQuery> {
        let (rank, stack, q) = (self.layout.rank, self.layout.stack, self.modulus());
        let padded = Message::padded(query.as_slice(), rank)?;
        let poly = message::encode(&padded, scale, rank, q)?;
        let mut reversed = apply_automorphism(&poly, 2 * rank - 1);
        reversed.scalar_mul_assign(ModQ::inv(rank as u64, q));

        let polys = (0..rank)
            .into_par_iter()
            .map(|i| apply_automorphism(&reversed, 2 * i + 1).embed(stack).to_ntt_new(&self.ring.q))
            .collect();
        Ok(CachedQuery::Plain(polys))
    }

    /// Packs one block of at most N key ciphertexts.
    pub fn cache_keys(&self, keys: &[MLWECiphertext]) -> Result<CachedKeys> {
        let (rank, stack, log_rank) = (self.layout.rank, self.layout.stack, self.layout.log_rank);
        if keys.len() > self.block_size() {
            return Err(validation_err!(
                "{} keys exceed the block size {}",
                keys.len(),
                self.block_size()
            ));
        }
        for key in keys {
            key.validate(&self.layout, self.modulus())?;
        }

        let zero = MLWECiphertext::zero(&self.layout, self.modulus());
        let columns: Vec<Vec<MLWECiphertext>> = (0..stack)
            .into_par_iter()
            .map(|i| {
                let mut column: Vec<MLWECiphertext> = (0..rank)
                    .map(|c| keys.get(c * stack + i).unwrap_or(&zero).clone())
                    .collect();
                pack::butterfly(&mut column, log_rank);
                column
            })
            .collect();

        let mut packed: Vec<(usize, Ciphertext)> = (0..rank)
            .into_par_iter()
            .map(|j| {
                let h = pack::butterfly_exponent(j, log_rank);
                let g = inverse_galois_element(h, 2 * rank);
                let comps: Vec<MLWECiphertext> =
                    columns.iter().map(|col| col[j].automorphism(g)).collect();
                let row = (g - 1) / 2;
                let mut ct = pack::pack_components(&comps, &self.mod_pack_keys.keys[row], &self.ring);
                ct.to_ntt(&self.ring.q);
                (row, ct)
            })
            .collect();
        packed.sort_by_key(|(row, _)| *row);

        Ok(CachedKeys {
            cts: packed.into_iter().map(|(_, ct)| ct).collect(),
            count: keys.len(),
        })
    }

    /// Scores of every key in the block, coefficient `n` for key `n`.
    ///
    /// The result is in coefficient domain and decrypts at scale
    /// `query_scale · key_scale`.
    pub fn inner_product(&self, query: &CachedQuery, keys: &CachedKeys) -> Result<Ciphertext> {
        let rank = self.layout.rank;
        if query.rank() != rank || keys.rank() != rank {
            return Err(crypto_err!(
                "rank mismatch: server {}, query {}, keys {}",
                rank,
                query.rank(),
                keys.rank()
            ));
        }
        let ctx = &self.ring.q;

        let mut sum = match query {
            CachedQuery::Encrypted(qs) => qs
                .par_iter()
                .zip(keys.cts.par_iter())
                .map(|(q_g, k_g)| {
                    let a = q_g.a.mul_ntt_domain(&k_g.a, ctx);
                    let mut b = q_g.a.mul_ntt_domain(&k_g.b, ctx);
                    b.mul_acc_ntt_domain(&q_g.b, &k_g.a, ctx);
                    let c = q_g.b.mul_ntt_domain(&k_g.b, ctx);
                    Ciphertext::extended(a, b, c)
                })
                .reduce_with(|mut acc, ct| {
                    acc += &ct;
                    acc
                }),
            CachedQuery::Plain(ps) => ps
                .par_iter()
                .zip(keys.cts.par_iter())
                .map(|(p_g, k_g)| {
                    Ciphertext::new(p_g.mul_ntt_domain(&k_g.a, ctx), p_g.mul_ntt_domain(&k_g.b, ctx))
                })
                .reduce_with(|mut acc, ct| {
                    acc += &ct;
                    acc
                }),
        }
        .ok_or_else(|| crypto_err!("empty cache"))?;

        sum.scalar_mul_assign(rank as u64);
        sum.from_ntt(ctx);
        if sum.is_extended() {
            relinearize(&sum, &self.relin_key, &self.ring)
        } else {
            Ok(sum)
        }
    }

}
