//! Switching key types

use serde::{Deserialize, Serialize};

use crate::error::{crypto_err, Result};
use crate::math::Polynomial;
use crate::params::RankLayout;

/// Hybrid switching key from s' to s over the modulus pair (Q, P).
///
/// Encrypts P·s' under s with one error shared by both moduli:
/// ```text
/// b_q = e - a_q·s + (P mod Q)·s'   (mod Q)
/// b_p = e - a_p·s                  (mod P)
/// ```
/// All four polynomials are stored in NTT domain.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SwitchingKey {
    /// Mask modulo Q
    pub a_q: Polynomial,
    /// Mask modulo P
    pub a_p: Polynomial,
    /// Body modulo Q
    pub b_q: Polynomial,
    /// Body modulo P
    pub b_p: Polynomial,
}

impl SwitchingKey {
    /// Ring degree of the key
    pub fn degree(&self) -> usize {
        self.a_q.degree()
    }

    /// Fails unless every polynomial has the given degree, the right modulus and NTT domain.
    pub fn validate(&self, degree: usize, q: u64, p: u64) -> Result<()> {
        self.a_q.check_shape(degree, q, true)?;
        self.b_q.check_shape(degree, q, true)?;
        self.a_p.check_shape(degree, p, true)?;
        self.b_p.check_shape(degree, p, true)?;
        Ok(())
    }
}

/// A degree-N switching key split into its `stack` components of degree `rank`.
///
/// Component j holds the j-th component of all four polynomials, in R_rank NTT
/// domain. Multiplying an embedded element φ(u) by the full key equals
/// `Σ_j X^j φ(u · component_j)`, so keys in this layout switch MLWE masks
/// without ever leaving R_rank.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MLWESwitchingKey {
    /// Per-component keys, indexed by component
    pub components: Vec<SwitchingKey>,
}

impl MLWESwitchingKey {
    /// Number of components
    pub fn stack(&self) -> usize {
        self.components.len()
    }

    /// Borrowed view of one component key
    pub fn component(&self, j: usize) -> &SwitchingKey {
        &self.components[j]
    }

    /// Fails unless the key matches the layout
    pub fn validate(&self, layout: &RankLayout, q: u64, p: u64) -> Result<()> {
        if self.stack() != layout.stack {
            return Err(crypto_err!(
                "MLWE switching key has {} components, expected {}",
                self.stack(),
                layout.stack
            ));
        }
        self.components
            .iter()
            .try_for_each(|k| k.validate(layout.rank, q, p))
    }
}

/// `[i][j]` keys switching φ(τ_{2i+1}(σ_j)) back to s.
///
/// The server packs `stack` rotated MLWE components into one RLWE ciphertext
/// with row `i`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AutedModPackKeys {
    /// Keys indexed by automorphism then MLWE secret component
    pub keys: Vec<Vec<SwitchingKey>>,
}

impl AutedModPackKeys {
    /// Borrowed view of key `[i][j]`
    pub fn get(&self, i: usize, j: usize) -> &SwitchingKey {
        &self.keys[i][j]
    }

    /// Fails unless the shape is rank × stack keys of degree N
    pub fn validate(&self, layout: &RankLayout, degree: usize, q: u64, p: u64) -> Result<()> {
        if self.keys.len() != layout.rank || self.keys.iter().any(|row| row.len() != layout.stack)
        {
            return Err(crypto_err!(
                "mod-pack keys must be {} x {}",
                layout.rank,
                layout.stack
            ));
        }
        self.keys
            .iter()
            .flatten()
            .try_for_each(|k| k.validate(degree, q, p))
    }
}

/// Same material as [`AutedModPackKeys`] in component layout.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AutedModPackMLWEKeys {
    /// Keys indexed by automorphism then MLWE secret component
    pub keys: Vec<Vec<MLWESwitchingKey>>,
}

impl AutedModPackMLWEKeys {
    /// Borrowed view of key `[i][j]`
    pub fn get(&self, i: usize, j: usize) -> &MLWESwitchingKey {
        &self.keys[i][j]
    }

    /// Fails unless the shape is rank × stack component keys
    pub fn validate(&self, layout: &RankLayout, q: u64, p: u64) -> Result<()> {
        if self.keys.len() != layout.rank || self.keys.iter().any(|row| row.len() != layout.stack)
        {
            return Err(crypto_err!(
                "MLWE mod-pack keys must be {} x {}",
                layout.rank,
                layout.stack
            ));
        }
        self.keys
            .iter()
            .flatten()
            .try_for_each(|k| k.validate(layout, q, p))
    }
}

/// Keys for the PIR expansion: entry `l` switches τ_{N/2^l + 1}(s) back to s.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InvAutKeys {
    /// One key per expansion level
    pub keys: Vec<SwitchingKey>,
}

impl InvAutKeys {
    /// Galois element used at expansion level `level`
    pub fn galois_element(degree: usize, level: usize) -> usize {
        (degree >> level) + 1
    }

    /// Number of expansion levels the keys support
    pub fn levels(&self) -> usize {
        self.keys.len()
    }

    /// Fails unless there is one degree-N key per level of log N
    pub fn validate(&self, degree: usize, q: u64, p: u64) -> Result<()> {
        let levels = degree.trailing_zeros() as usize;
        if self.keys.len() != levels {
            return Err(crypto_err!(
                "expected {} expansion keys, got {}",
                levels,
                self.keys.len()
            ));
        }
        self.keys.iter().try_for_each(|k| k.validate(degree, q, p))
    }
}
