//! RLWE and MLWE encryption
//!
//! Ring-LWE over R_Q = Z_Q[X]/(X^N + 1):
//! - the secret key s is a sparse ternary polynomial
//! - a ciphertext (a, b) encrypts m as b = m - a·s + e
//! - decryption is a·s + b
//!
//! Messages carry their own fixed-point scale (see [`crate::message`]), so
//! there is no plaintext modulus.
//!
//! MLWE ciphertexts ([`MLWECiphertext`]) are component slices of RLWE ones
//! and carry one vector per ciphertext.

mod enc;
mod galois;
mod mlwe;
mod types;

pub use enc::{decrypt, encrypt};
pub use galois::{
    apply_automorphism, automorphism_ciphertext, bit_reverse, inverse_galois_element,
    multiply_monomial,
};
pub use mlwe::{decrypt_mlwe, mlwe_secret, MLWECiphertext};
pub use types::{Ciphertext, SecretKey};
