//! RLWE encryption and decryption

use crate::error::{crypto_err, Result};
use crate::math::{Polynomial, RingContext, Sampler};

use super::types::{Ciphertext, SecretKey};

/// Encrypts a coefficient-domain plaintext: b = m - a·s + e.
///
/// Returns the ciphertext in coefficient domain.
pub fn encrypt(
    sk: &SecretKey,
    message: &Polynomial,
    ring: &RingContext,
    sampler: &mut Sampler,
) -> Result<Ciphertext> {
    let degree = sk.degree();
    let q = ring.modulus_q();
    message.check_shape(degree, q, false)?;

    let a = Polynomial::uniform(degree, q, sampler);
    let e = Polynomial::gaussian(degree, q, sampler);

    let mut a_s = a.to_ntt_new(&ring.q).mul_ntt_domain(sk.mod_q(), &ring.q);
    a_s.from_ntt(&ring.q);

    let b = &(message + &e) - &a_s;
    Ok(Ciphertext::new(a, b))
}

/// Raw decryption a·s + b (+ c·s² when extended), in coefficient domain.
///
/// Accepts ciphertexts in either domain; fails when degree or modulus does
/// not match the key.
pub fn decrypt(ct: &Ciphertext, sk: &SecretKey, ring: &RingContext) -> Result<Polynomial> {
    if ct.degree() != sk.degree() {
        return Err(crypto_err!(
            "ciphertext degree {} does not match key degree {}",
            ct.degree(),
            sk.degree()
        ));
    }
    if ct.modulus() != ring.modulus_q() {
        return Err(crypto_err!(
            "ciphertext modulus {} is not the key modulus",
            ct.modulus()
        ));
    }
    let is_ntt = ct.is_ntt();
    for part in ct.parts() {
        if part.is_ntt() != is_ntt || part.degree() != ct.degree() || part.modulus() != ct.modulus() {
            return Err(crypto_err!("ciphertext components disagree on their shape"));
        }
    }

    let mut ct = ct.clone();
    ct.to_ntt(&ring.q);
    let s = sk.mod_q();

    // Horner in s: ((a)·s + b)·s + c, or a·s + b
    let mut acc = ct.a.mul_ntt_domain(s, &ring.q);
    acc += &ct.b;
    if let Some(c) = &ct.c {
        acc = acc.mul_ntt_domain(s, &ring.q);
        acc += c;
    }
    acc.from_ntt(&ring.q);
    Ok(acc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::EvdParams;

    fn setup() -> (EvdParams, RingContext, SecretKey, Sampler) {
        let params = EvdParams::with_degree(256);
        let ring = RingContext::new(params.degree, params.q, params.p);
        let mut sampler = Sampler::with_seed(params.sigma, 21);
        let sk = SecretKey::generate(&params, &ring, &mut sampler);
        (params, ring, sk, sampler)
    }

    #[test]
    fn test_encrypt_decrypt_small_noise() {
        let (params, ring, sk, mut sampler) = setup();
        let values: Vec<i64> = (0..256).map(|i| (i as i64 - 128) << 20).collect();
        let msg = Polynomial::from_signed(&values, params.q);

        let ct = encrypt(&sk, &msg, &ring, &mut sampler).unwrap();
        assert!(!ct.is_ntt());
        let dec = decrypt(&ct, &sk, &ring).unwrap();

        let noise = (&dec - &msg).linf_norm();
        assert!(noise < 64, "noise too large: {}", noise);
    }

    #[test]
    fn test_decrypt_ntt_domain_input() {
        let (params, ring, sk, mut sampler) = setup();
        let msg = Polynomial::from_signed(&[1 << 30; 256], params.q);
        let mut ct = encrypt(&sk, &msg, &ring, &mut sampler).unwrap();
        ct.to_ntt(&ring.q);

        let dec = decrypt(&ct, &sk, &ring).unwrap();
        assert!((&dec - &msg).linf_norm() < 64);
    }

    #[test]
    fn test_decrypt_rejects_foreign_degree() {
        let (params, ring, sk, _) = setup();
        let ct = Ciphertext::zero(128, params.q);
        let err = decrypt(&ct, &sk, &ring).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::CryptoState);
    }

    #[test]
    fn test_extended_decryption() {
        let (params, ring, sk, _) = setup();
        // (1, 0, 0) decrypts to s², which has norm at most the hamming weight.
        let mut one = Polynomial::zero(params.degree, params.q);
        one.set_coeff(0, 1);
        let zero = Polynomial::zero(params.degree, params.q);
        let ct = Ciphertext::extended(one, zero.clone(), zero);

        let s = sk.coeff_q(&ring.q);
        let expected = s.mul_ntt(&s, &ring.q);
        assert_eq!(decrypt(&ct, &sk, &ring).unwrap(), expected);
    }
}
