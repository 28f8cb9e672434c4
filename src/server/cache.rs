//! Server-side precomputed state
//!
//! Both caches hold one NTT-domain entry per Galois element `g = 2i + 1` of
//! R_rank, in order of `i`.

use serde::{Deserialize, Serialize};

use crate::math::Polynomial;
use crate::rlwe::Ciphertext;

/// One query, rotated by every Galois element and packed into degree N.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum CachedQuery {
    /// Query arrived encrypted
    Encrypted(Vec<Ciphertext>),
    /// Query arrived in plaintext
    Plain(Vec<Polynomial>),
}

impl CachedQuery {
    /// Number of rotations, equal to the rank it was cached for
    pub fn rank(&self) -> usize {
        match self {
            Self::Encrypted(cts) => cts.len(),
            Self::Plain(polys) => polys.len(),
        }
    }

    /// True if the query was cached from an encrypted vector
    pub fn is_encrypted(&self) -> bool {
        matches!(self, Self::Encrypted(_))
    }
}

/// One block of up to N key vectors, packed per Galois element.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CachedKeys {
    /// Packed ciphertexts, one per Galois element
    pub cts: Vec<Ciphertext>,
    /// Number of real keys in the block; the rest are zero
    pub count: usize,
}

impl CachedKeys {
    /// Number of rotations, equal to the rank it was cached for
    pub fn rank(&self) -> usize {
        self.cts.len()
    }
}
