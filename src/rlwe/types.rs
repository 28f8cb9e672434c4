//! RLWE secret key and ciphertext types.
//!
//! Ring-LWE over R_Q = Z_Q[X]/(X^N + 1). A ciphertext (a, b) decrypts to
//! a·s + b; an extended ciphertext (a, b, c) produced by a tensor product
//! decrypts to a·s² + b·s + c.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::ops::{AddAssign, SubAssign};
use std::path::Path;

use crate::error::{crypto_err, validation_err, Result};
use crate::math::{NttContext, Polynomial, RingContext, Sampler};
use crate::params::EvdParams;

const SECRET_FILE_VERSION: u16 = 1;

/// RLWE secret key: one sparse ternary polynomial, held under both Q and P.
///
/// Both representations are kept in NTT domain. The key is never serialized
/// to the wire; [`SecretKey::save`] writes it to local disk only.
#[derive(Clone)]
pub struct SecretKey {
    mod_q: Polynomial,
    mod_p: Polynomial,
}

#[derive(Serialize, Deserialize)]
struct StoredSecretKey {
    version: u16,
    degree: u32,
    coeffs: Vec<i8>,
}

impl SecretKey {
    /// Samples a secret with exactly `hamming_weight` nonzero ±1 coefficients.
    pub fn generate(params: &EvdParams, ring: &RingContext, sampler: &mut Sampler) -> Self {
        let coeffs = sampler.sparse_ternary(params.degree, params.hamming_weight);
        Self::from_signed(&coeffs, ring)
    }

    /// Secret from explicit small coefficients.
    pub fn from_signed(coeffs: &[i64], ring: &RingContext) -> Self {
        let mut mod_q = Polynomial::from_signed(coeffs, ring.modulus_q());
        let mut mod_p = Polynomial::from_signed(coeffs, ring.modulus_p());
        mod_q.to_ntt(&ring.q);
        mod_p.to_ntt(&ring.p);
        Self { mod_q, mod_p }
    }

    /// Ring degree of the key
    pub fn degree(&self) -> usize {
        self.mod_q.degree()
    }

    /// Secret modulo Q, NTT domain
    pub fn mod_q(&self) -> &Polynomial {
        &self.mod_q
    }

    /// Secret modulo P, NTT domain
    pub fn mod_p(&self) -> &Polynomial {
        &self.mod_p
    }

    /// Secret in coefficient domain modulo Q
    pub fn coeff_q(&self, ctx: &NttContext) -> Polynomial {
        self.mod_q.from_ntt_new(ctx)
    }

    /// Writes the key to a local file.
    pub fn save(&self, path: impl AsRef<Path>, ring: &RingContext) -> Result<()> {
        let poly = self.coeff_q(&ring.q);
        let stored = StoredSecretKey {
            version: SECRET_FILE_VERSION,
            degree: self.degree() as u32,
            coeffs: (0..poly.degree()).map(|i| poly.centered(i) as i8).collect(),
        };
        fs::write(path, bincode::serialize(&stored)?)?;
        Ok(())
    }

    /// Reads a key written by [`SecretKey::save`].
    pub fn load(path: impl AsRef<Path>, ring: &RingContext) -> Result<Self> {
        let stored: StoredSecretKey = bincode::deserialize(&fs::read(path)?)?;
        if stored.version != SECRET_FILE_VERSION {
            return Err(validation_err!(
                "unsupported secret key file version {}",
                stored.version
            ));
        }
        if stored.degree as usize != ring.degree() || stored.coeffs.len() != ring.degree() {
            return Err(crypto_err!(
                "secret key of degree {} does not match ring degree {}",
                stored.degree,
                ring.degree()
            ));
        }
        let coeffs: Vec<i64> = stored.coeffs.iter().map(|&c| c as i64).collect();
        Ok(Self::from_signed(&coeffs, ring))
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretKey")
            .field("degree", &self.degree())
            .finish_non_exhaustive()
    }
}

/// RLWE ciphertext, optionally extended by a third component.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Ciphertext {
    /// Mask, multiplied by s on decryption
    pub a: Polynomial,
    /// Body
    pub b: Polynomial,
    /// Degree-2 component of a tensor product, multiplied by s²
    pub c: Option<Polynomial>,
}

impl Ciphertext {
    /// Ciphertext (a, b)
    pub fn new(a: Polynomial, b: Polynomial) -> Self {
        Self { a, b, c: None }
    }

    /// Extended ciphertext (a, b, c)
    pub fn extended(a: Polynomial, b: Polynomial, c: Polynomial) -> Self {
        Self { a, b, c: Some(c) }
    }

    /// Trivial encryption of zero in coefficient domain
    pub fn zero(degree: usize, modulus: u64) -> Self {
        Self::new(
            Polynomial::zero(degree, modulus),
            Polynomial::zero(degree, modulus),
        )
    }

    /// Ring degree
    pub fn degree(&self) -> usize {
        self.a.degree()
    }

    /// Ciphertext modulus
    pub fn modulus(&self) -> u64 {
        self.a.modulus()
    }

    /// True when the components are in NTT domain
    pub fn is_ntt(&self) -> bool {
        self.a.is_ntt()
    }

    /// True for a not-yet-relinearized product
    pub fn is_extended(&self) -> bool {
        self.c.is_some()
    }

    /// Components as a list: [a, b] or [a, b, c]
    pub fn parts(&self) -> impl Iterator<Item = &Polynomial> {
        [&self.a, &self.b].into_iter().chain(self.c.as_ref())
    }

    fn parts_mut(&mut self) -> impl Iterator<Item = &mut Polynomial> {
        [&mut self.a, &mut self.b].into_iter().chain(self.c.as_mut())
    }

    /// Converts every component to NTT domain
    pub fn to_ntt(&mut self, ctx: &NttContext) {
        self.parts_mut().for_each(|p| p.to_ntt(ctx));
    }

    /// Converts every component to coefficient domain
    pub fn from_ntt(&mut self, ctx: &NttContext) {
        self.parts_mut().for_each(|p| p.from_ntt(ctx));
    }

    /// Multiplies every component by a scalar
    pub fn scalar_mul_assign(&mut self, scalar: u64) {
        self.parts_mut().for_each(|p| p.scalar_mul_assign(scalar));
    }

    /// Fails unless every component has the given shape.
    pub fn validate(&self, degree: usize, modulus: u64, is_ntt: bool) -> Result<()> {
        for part in self.parts() {
            part.check_shape(degree, modulus, is_ntt)?;
        }
        Ok(())
    }
}

impl AddAssign<&Ciphertext> for Ciphertext {
    fn add_assign(&mut self, rhs: &Ciphertext) {
        self.a += &rhs.a;
        self.b += &rhs.b;
        match (&mut self.c, &rhs.c) {
            (Some(c), Some(rc)) => *c += rc,
            (None, Some(rc)) => self.c = Some(rc.clone()),
            _ => {}
        }
    }
}

impl SubAssign<&Ciphertext> for Ciphertext {
    fn sub_assign(&mut self, rhs: &Ciphertext) {
        self.a -= &rhs.a;
        self.b -= &rhs.b;
        match (&mut self.c, &rhs.c) {
            (Some(c), Some(rc)) => *c -= rc,
            (None, Some(rc)) => self.c = Some(-rc),
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_params() -> EvdParams {
        EvdParams::with_degree(64)
    }

    fn make_ring(params: &EvdParams) -> RingContext {
        RingContext::new(params.degree, params.q, params.p)
    }

    #[test]
    fn test_secret_key_shape() {
        let params = test_params();
        let ring = make_ring(&params);
        let mut sampler = Sampler::with_seed(params.sigma, 1);
        let sk = SecretKey::generate(&params, &ring, &mut sampler);

        assert_eq!(sk.degree(), 64);
        assert!(sk.mod_q().is_ntt() && sk.mod_p().is_ntt());
        let coeffs = sk.coeff_q(&ring.q);
        let nonzero = (0..64).filter(|&i| coeffs.coeff(i) != 0).count();
        assert_eq!(nonzero, params.hamming_weight);
        assert_eq!(coeffs.linf_norm(), 1);
    }

    #[test]
    fn test_secret_key_save_load() {
        let params = test_params();
        let ring = make_ring(&params);
        let mut sampler = Sampler::with_seed(params.sigma, 2);
        let sk = SecretKey::generate(&params, &ring, &mut sampler);

        let path = std::env::temp_dir().join(format!("evd-sk-{}.bin", std::process::id()));
        sk.save(&path, &ring).unwrap();
        let loaded = SecretKey::load(&path, &ring).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(loaded.mod_q(), sk.mod_q());
        assert_eq!(loaded.mod_p(), sk.mod_p());

        let other_ring = RingContext::new(32, params.q, params.p);
        let path = std::env::temp_dir().join(format!("evd-sk2-{}.bin", std::process::id()));
        sk.save(&path, &ring).unwrap();
        assert!(SecretKey::load(&path, &other_ring).is_err());
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_secret_key_debug_hides_coefficients() {
        let params = test_params();
        let ring = make_ring(&params);
        let sk = SecretKey::from_signed(&[1; 64], &ring);
        assert_eq!(format!("{:?}", sk), "SecretKey { degree: 64, .. }");
    }

    #[test]
    fn test_ciphertext_arithmetic() {
        let q = test_params().q;
        let mut ct = Ciphertext::new(
            Polynomial::from_signed(&[1, 2], q),
            Polynomial::from_signed(&[3, 4], q),
        );
        let other = Ciphertext::extended(
            Polynomial::from_signed(&[1, 1], q),
            Polynomial::from_signed(&[1, 1], q),
            Polynomial::from_signed(&[5, 5], q),
        );
        ct += &other;
        assert!(ct.is_extended());
        assert_eq!(ct.a.centered(1), 3);
        assert_eq!(ct.c.as_ref().map(|c| c.centered(0)), Some(5));

        ct -= &other;
        assert_eq!(ct.b.centered(0), 3);
        assert_eq!(ct.parts().count(), 3);
        assert!(ct.validate(2, q, false).is_ok());
        assert!(ct.validate(4, q, false).is_err());
    }
}
