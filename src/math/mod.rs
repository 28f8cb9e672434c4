//! Arithmetic primitives for the EVD engine.
//!
//! - **Modular arithmetic** over Z_q
//! - **Number-Theoretic Transform (NTT)** for fast negacyclic products
//! - **Polynomials** over R_q = Z_q[X]/(X^N + 1), with the component layout
//!   used by MLWE ciphertexts
//! - **Sampling** of masks, errors and sparse ternary secrets
//!
//! Everything above this module works over the two primes of
//! [`crate::params`]: Q for ciphertexts and P for the key-switching lift.
//! [`RingContext`] bundles the NTT tables of both for one degree.

pub mod modular;
pub mod ntt;
pub mod poly;
pub mod sampler;

pub use modular::ModQ;
pub use ntt::NttContext;
pub use poly::Polynomial;
pub use sampler::Sampler;

/// NTT tables for one ring degree under both moduli.
#[derive(Clone, Debug)]
pub struct RingContext {
    /// Tables modulo Q
    pub q: NttContext,
    /// Tables modulo P
    pub p: NttContext,
}

impl RingContext {
    /// Builds the tables for `degree` under moduli `q` and `p`.
    pub fn new(degree: usize, q: u64, p: u64) -> Self {
        Self {
            q: NttContext::new(degree, q),
            p: NttContext::new(degree, p),
        }
    }

    /// Ring degree
    pub fn degree(&self) -> usize {
        self.q.dimension()
    }

    /// Ciphertext modulus
    pub fn modulus_q(&self) -> u64 {
        self.q.modulus()
    }

    /// Key-switching modulus
    pub fn modulus_p(&self) -> u64 {
        self.p.modulus()
    }
}
