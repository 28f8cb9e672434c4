//! Client side of the EVD protocol.
//!
//! The [`Client`] is the only party that sees plaintext vectors and scores.
//! It samples the secret, derives the public evaluation keys handed to the
//! server, encrypts queries and database vectors as MLWE ciphertexts and
//! decrypts the score ciphertexts the server returns.
//!
//! # Example
//!
//! ```
//! use evd::client::Client;
//! use evd::message::Message;
//! use evd::params::EvdParams;
//!
//! let params = EvdParams::with_degree(256);
//! let mut client = Client::with_seed(params, 3, 7).unwrap();
//! let secret = client.gen_sec_key().clone();
//!
//! let msg = Message::from(vec![0.25, -0.5, 1.0, 0.0]);
//! let ct = client.encrypt_message(&msg, (1u64 << 30) as f64).unwrap();
//! let out = client.decrypt(&ct, &secret, (1u64 << 30) as f64).unwrap();
//! assert!((out[0] - 0.25).abs() < 1e-6);
//! ```

use crate::error::{crypto_err, validation_err, Result};
use crate::ks::{
    generate_auted_mod_pack_keys, generate_auted_mod_pack_mlwe_keys, generate_inv_aut_keys,
    generate_relin_key, AutedModPackKeys, AutedModPackMLWEKeys, InvAutKeys, SwitchingKey,
};
use crate::math::{ModQ, Polynomial, RingContext, Sampler};
use crate::message::{self, Message};
use crate::params::{EvdParams, RankLayout};
use crate::rlwe::{
    apply_automorphism, decrypt_mlwe, encrypt, mlwe_secret, Ciphertext, MLWECiphertext, SecretKey,
};
use crate::topk::TopK;

const KEY_CHECK_SCALE: f64 = (1u64 << 20) as f64;
const KEY_CHECK_TOLERANCE: f64 = 1e-2;

/// Key owner and plaintext endpoint for one MLWE rank.
pub struct Client {
    params: EvdParams,
    layout: RankLayout,
    ring: RingContext,
    rank_ring: RingContext,
    sampler: Sampler,
    secret: Option<SecretKey>,
}

impl Client {
    /// Client for MLWE rank 2^`log_rank`, with fresh OS randomness.
    pub fn new(params: EvdParams, log_rank: u32) -> Result<Self> {
        let sampler = Sampler::new(params.sigma);
        Self::with_sampler(params, log_rank, sampler)
    }

    /// Deterministic client, for tests and reproducible experiments.
    pub fn with_seed(params: EvdParams, log_rank: u32, seed: u64) -> Result<Self> {
        let sampler = Sampler::with_seed(params.sigma, seed);
        Self::with_sampler(params, log_rank, sampler)
    }

    fn with_sampler(params: EvdParams, log_rank: u32, sampler: Sampler) -> Result<Self> {
        params.validate()?;
        let layout = RankLayout::from_log_rank(log_rank, params.degree)?;
        Ok(Self {
            ring: RingContext::new(params.degree, params.q, params.p),
            rank_ring: RingContext::new(layout.rank, params.q, params.p),
            params,
            layout,
            sampler,
            secret: None,
        })
    }

    /// Parameters in use
    pub fn params(&self) -> &EvdParams {
        &self.params
    }

    /// MLWE layout in use
    pub fn layout(&self) -> &RankLayout {
        &self.layout
    }

    /// NTT tables at the full ring degree
    pub fn ring(&self) -> &RingContext {
        &self.ring
    }

    /// MLWE rank
    pub fn get_rank(&self) -> usize {
        self.layout.rank
    }

    /// rank^(-1) mod Q
    pub fn get_inv_rank(&self) -> u64 {
        ModQ::inv(self.layout.rank as u64, self.params.q)
    }

    /// Samples a new secret, replacing any previous one.
    pub fn gen_sec_key(&mut self) -> &SecretKey {
        let sk = SecretKey::generate(&self.params, &self.ring, &mut self.sampler);
        self.secret.insert(sk)
    }

    /// Installs an existing secret, e.g. one loaded from disk.
    pub fn set_secret_key(&mut self, secret: SecretKey) -> Result<()> {
        if secret.degree() != self.params.degree {
            return Err(crypto_err!(
                "secret key has degree {}, client runs at {}",
                secret.degree(),
                self.params.degree
            ));
        }
        self.secret = Some(secret);
        Ok(())
    }

    /// The owned secret, if one was generated or installed
    pub fn secret_key(&self) -> Option<&SecretKey> {
        self.secret.as_ref()
    }

    fn owned_secret(&self) -> Result<&SecretKey> {
        self.secret
            .as_ref()
            .ok_or_else(|| crypto_err!("client holds no secret key"))
    }

    fn check_secret(&self, secret: &SecretKey) -> Result<()> {
        if secret.degree() != self.params.degree {
            return Err(crypto_err!(
                "secret key has degree {}, expected {}",
                secret.degree(),
                self.params.degree
            ));
        }
        Ok(())
    }

    /// Relinearization key (s² to s)
    pub fn gen_relin_key(&mut self, secret: &SecretKey) -> Result<SwitchingKey> {
        self.check_secret(secret)?;
        Ok(generate_relin_key(secret, &self.ring, &mut self.sampler))
    }

    /// Mod-pack keys used by the server on key ciphertexts
    pub fn gen_auted_mod_pack_keys(&mut self, secret: &SecretKey) -> Result<AutedModPackKeys> {
        self.check_secret(secret)?;
        Ok(generate_auted_mod_pack_keys(
            secret,
            &self.layout,
            &self.ring,
            &mut self.sampler,
        ))
    }

    /// Mod-pack keys in component layout, used by the server on queries
    pub fn gen_inv_auted_mod_pack_keys(
        &mut self,
        secret: &SecretKey,
    ) -> Result<AutedModPackMLWEKeys> {
        self.check_secret(secret)?;
        Ok(generate_auted_mod_pack_mlwe_keys(
            secret,
            &self.layout,
            &self.ring,
            &self.rank_ring,
            &mut self.sampler,
        ))
    }

    /// Expansion keys for private retrieval
    pub fn gen_inv_aut_keys(&mut self, secret: &SecretKey) -> Result<InvAutKeys> {
        self.check_secret(secret)?;
        Ok(generate_inv_aut_keys(secret, &self.ring, &mut self.sampler))
    }

    /// Fixed-point encoding at the full ring degree
    pub fn encode(&self, message: &Message, scale: f64) -> Result<Polynomial> {
        message::encode(message, scale, self.params.degree, self.params.q)
    }

    /// Every coefficient divided by `scale`
    pub fn decode(&self, poly: &Polynomial, scale: f64) -> Result<Message> {
        message::decode(poly, scale)
    }

    /// RLWE encryption of a coefficient-domain plaintext under the owned secret
    pub fn encrypt_polynomial(&mut self, poly: &Polynomial) -> Result<Ciphertext> {
        let sk = self
            .secret
            .as_ref()
            .ok_or_else(|| crypto_err!("client holds no secret key"))?;
        encrypt(sk, poly, &self.ring, &mut self.sampler)
    }

    /// Encodes then encrypts
    pub fn encrypt_message(&mut self, message: &Message, scale: f64) -> Result<Ciphertext> {
        let poly = self.encode(message, scale)?;
        self.encrypt_polynomial(&poly)
    }

    fn encode_rank(&self, slots: &Message, scale: f64) -> Result<Polynomial> {
        if slots.len() > self.layout.rank {
            return Err(validation_err!(
                "vector of {} slots exceeds rank {}",
                slots.len(),
                self.layout.rank
            ));
        }
        let padded = Message::padded(slots.as_slice(), self.layout.rank)?;
        message::encode(&padded, scale, self.layout.rank, self.params.q)
    }

    fn encrypt_mlwe(&mut self, msg: &Polynomial) -> Result<MLWECiphertext> {
        let embedded = msg.embed(self.layout.stack);
        let ct = self.encrypt_polynomial(&embedded)?;
        let mut mlwe = MLWECiphertext::from_rlwe(&ct, self.layout.stack);
        mlwe.scalar_mul_assign(self.get_inv_rank());
        Ok(mlwe)
    }

    /// MLWE encryption of a query vector.
    ///
    /// Slots are reversed by τ_{2·rank-1} so that the server's product with a
    /// key lands the dot product in the constant coefficient.
    pub fn encrypt_query(&mut self, query: &Message, scale: f64) -> Result<MLWECiphertext> {
        let poly = self.encode_rank(query, scale)?;
        let reversed = apply_automorphism(&poly, 2 * self.layout.rank - 1);
        self.encrypt_mlwe(&reversed)
    }

    /// MLWE encryption of a database vector
    pub fn encrypt_key(&mut self, key: &Message, scale: f64) -> Result<MLWECiphertext> {
        let poly = self.encode_rank(key, scale)?;
        self.encrypt_mlwe(&poly)
    }

    /// Decrypts and decodes a degree-N ciphertext.
    pub fn decrypt(&self, ct: &Ciphertext, secret: &SecretKey, scale: f64) -> Result<Message> {
        let poly = crate::rlwe::decrypt(ct, secret, &self.ring)?;
        message::decode(&poly, scale)
    }

    /// Decrypts an MLWE ciphertext of this client's rank into `rank` slots.
    ///
    /// The rank^(-1) factor applied at encryption is removed.
    pub fn decrypt_mlwe(
        &self,
        ct: &MLWECiphertext,
        secret: &SecretKey,
        scale: f64,
    ) -> Result<Message> {
        self.check_secret(secret)?;
        ct.validate(&self.layout, self.params.q)?;
        let sigma = mlwe_secret(&secret.coeff_q(&self.ring.q), self.layout.stack);
        let mut poly = decrypt_mlwe(ct, &sigma, &self.rank_ring.q)?;
        poly.scalar_mul_assign(self.layout.rank as u64);
        message::decode(&poly, scale)
    }

    /// Batch decryption of score ciphertexts into `out`, one message each.
    pub fn decrypt_score(
        &self,
        out: &mut [Message],
        ciphertexts: &[Ciphertext],
        secret: &SecretKey,
        scale: f64,
    ) -> Result<()> {
        if out.len() != ciphertexts.len() {
            return Err(validation_err!(
                "{} output messages for {} score ciphertexts",
                out.len(),
                ciphertexts.len()
            ));
        }
        for (slot, ct) in out.iter_mut().zip(ciphertexts) {
            *slot = self.decrypt(ct, secret, scale)?;
        }
        Ok(())
    }

    /// Ranks every slot of the concatenated messages into `out`.
    ///
    /// Candidate indices run across messages: slot `j` of message `m` is
    /// candidate `Σ_{i<m} len_i + j`.
    pub fn top_k_score(&self, out: &mut TopK, messages: &[Message]) {
        let scores: Vec<f64> = messages
            .iter()
            .flat_map(|m| m.as_slice().iter().copied())
            .collect();
        out.fill_from(&scores);
    }

    /// Encryption of a fixed marker under the owned secret.
    ///
    /// Stored next to a collection so a later session can confirm it holds
    /// the same secret with [`Client::verify_key_check`].
    pub fn gen_key_check(&mut self) -> Result<Ciphertext> {
        let poly = self.encode(&Message::from(vec![1.0]), KEY_CHECK_SCALE)?;
        self.encrypt_polynomial(&poly)
    }

    /// Fails with a crypto-state error unless `ct` came from
    /// [`Client::gen_key_check`] under the owned secret.
    pub fn verify_key_check(&self, ct: &Ciphertext) -> Result<()> {
        if ct.is_extended() {
            return Err(crypto_err!("key check must have two components"));
        }
        let marker = self.decrypt_owned(ct, KEY_CHECK_SCALE)?;
        let holds = marker.as_slice().iter().enumerate().all(|(i, v)| {
            let want = if i == 0 { 1.0 } else { 0.0 };
            (v - want).abs() < KEY_CHECK_TOLERANCE
        });
        if !holds {
            return Err(crypto_err!("key check failed: another secret key is in use"));
        }
        Ok(())
    }

    /// [`Client::decrypt`] with the owned secret
    pub fn decrypt_owned(&self, ct: &Ciphertext, scale: f64) -> Result<Message> {
        self.decrypt(ct, self.owned_secret()?, scale)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn test_params() -> EvdParams {
        EvdParams::with_degree(256)
    }

    fn make_client(log_rank: u32, seed: u64) -> (Client, SecretKey) {
        let mut client = Client::with_seed(test_params(), log_rank, seed).unwrap();
        let secret = client.gen_sec_key().clone();
        (client, secret)
    }

    #[test]
    fn test_rank_accessors() {
        let (client, _) = make_client(3, 1);
        assert_eq!(client.get_rank(), 8);
        let inv = client.get_inv_rank();
        assert_eq!(ModQ::mul(inv, 8, client.params().q), 1);
    }

    #[test]
    fn test_encrypt_message_roundtrip() {
        let (mut client, secret) = make_client(3, 2);
        let scale = (1u64 << 30) as f64;
        let values: Vec<f64> = (0..16).map(|i| (i as f64 - 8.0) / 10.0).collect();
        let msg = Message::from(values.clone());

        let ct = client.encrypt_message(&msg, scale).unwrap();
        let out = client.decrypt(&ct, &secret, scale).unwrap();
        assert_eq!(out.len(), 256);
        for (i, v) in values.iter().enumerate() {
            assert!((out[i * 16] - v).abs() < 1e-6, "slot {}", i);
        }
    }

    #[test]
    fn test_encrypt_key_mlwe_roundtrip() {
        let (mut client, secret) = make_client(3, 3);
        let scale = (1u64 << 22) as f64;
        let key = Message::from(vec![0.5, -0.25, 0.125, 1.0, -1.0]);

        let ct = client.encrypt_key(&key, scale).unwrap();
        assert_eq!(ct.stack(), 32);
        let out = client.decrypt_mlwe(&ct, &secret, scale).unwrap();
        assert_eq!(out.len(), 8);
        for i in 0..5 {
            assert!((out[i] - key[i]).abs() < 1e-4);
        }
        assert!(out[7].abs() < 1e-4);
    }

    #[test]
    fn test_encrypt_query_is_reversed() {
        let (mut client, secret) = make_client(2, 4);
        let scale = (1u64 << 22) as f64;
        let query = Message::from(vec![1.0, 2.0, 3.0, 4.0]);

        let ct = client.encrypt_query(&query, scale).unwrap();
        let out = client.decrypt_mlwe(&ct, &secret, scale).unwrap();
        // τ_{2r-1}: Y^j ↦ -Y^(r-j)
        let want = [1.0, -4.0, -3.0, -2.0];
        for (got, want) in out.as_slice().iter().zip(want) {
            assert!((got - want).abs() < 1e-4);
        }
    }

    #[test]
    fn test_query_longer_than_rank_rejected() {
        let (mut client, _) = make_client(2, 5);
        let err = client
            .encrypt_query(&Message::from(vec![0.0; 5]), 1.0)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn test_encrypt_without_secret_fails() {
        let mut client = Client::with_seed(test_params(), 3, 6).unwrap();
        let err = client
            .encrypt_message(&Message::from(vec![1.0]), 2.0)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CryptoState);
    }

    #[test]
    fn test_decrypt_rejects_foreign_degree() {
        let (client, secret) = make_client(3, 7);
        let ct = Ciphertext::zero(128, client.params().q);
        let err = client.decrypt(&ct, &secret, 1.0).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CryptoState);
    }

    #[test]
    fn test_decode_rejects_ntt_domain() {
        let (client, _) = make_client(3, 11);
        let poly = client
            .encode(&Message::from(vec![1.0, -1.0, 0.5, 0.0]), 8.0)
            .unwrap();
        let err = client
            .decode(&poly.to_ntt_new(&client.ring().q), 8.0)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CryptoState);

        let back = client.decode(&poly, 8.0).unwrap();
        assert_eq!(back[64], -1.0);
    }

    #[test]
    fn test_key_check_binds_secret() {
        let (mut client, _) = make_client(3, 12);
        let check = client.gen_key_check().unwrap();
        client.verify_key_check(&check).unwrap();

        let (other, _) = make_client(3, 13);
        let err = other.verify_key_check(&check).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CryptoState);
    }

    #[test]
    fn test_decrypt_score_length_mismatch() {
        let (client, secret) = make_client(3, 8);
        let cts = vec![Ciphertext::zero(256, client.params().q); 2];
        let mut out = vec![Message::zeros(0); 3];
        let err = client
            .decrypt_score(&mut out, &cts, &secret, 1.0)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let mut out = vec![Message::zeros(0); 2];
        client.decrypt_score(&mut out, &cts, &secret, 1.0).unwrap();
        assert!(out.iter().all(|m| m.len() == 256));
    }

    #[test]
    fn test_top_k_score_across_messages() {
        let (client, _) = make_client(3, 9);
        let messages = vec![
            Message::from(vec![0.1, 0.9]),
            Message::from(vec![0.5]),
            Message::from(vec![0.95, 0.0]),
        ];
        let mut out = TopK::new(3);
        client.top_k_score(&mut out, &messages);
        assert_eq!(out.as_slice(), &[3, 1, 2]);
    }

    #[test]
    fn test_gen_sec_key_replaces_secret() {
        let mut client = Client::with_seed(test_params(), 3, 10).unwrap();
        let first = client.gen_sec_key().clone();
        let second = client.gen_sec_key().clone();
        assert_ne!(first.mod_q(), second.mod_q());
        assert_eq!(client.secret_key().unwrap().mod_q(), second.mod_q());
    }
}
