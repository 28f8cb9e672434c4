//! Plaintext messages and their fixed-point encoding

use serde::{Deserialize, Serialize};
use std::ops::{Index, IndexMut};

use crate::error::{crypto_err, validation_err, Result};
use crate::math::{ModQ, Polynomial};

/// Plaintext vector of real-valued slots.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Message(Vec<f64>);

impl Message {
    /// Message of `len` zero slots
    pub fn zeros(len: usize) -> Self {
        Self(vec![0.0; len])
    }

    /// Number of slots
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True if the message has no slots
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Slots as a slice
    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    /// Consumes the message
    pub fn into_vec(self) -> Vec<f64> {
        self.0
    }

    /// Copy of `slots` zero-padded to `len`
    pub fn padded(slots: &[f64], len: usize) -> Result<Self> {
        if slots.len() > len {
            return Err(validation_err!(
                "message of {} slots does not fit {} slots",
                slots.len(),
                len
            ));
        }
        let mut out = vec![0.0; len];
        out[..slots.len()].copy_from_slice(slots);
        Ok(Self(out))
    }

    /// Largest slot magnitude
    pub fn max_abs(&self) -> f64 {
        self.0.iter().fold(0.0, |m, v| m.max(v.abs()))
    }
}

impl From<Vec<f64>> for Message {
    fn from(slots: Vec<f64>) -> Self {
        Self(slots)
    }
}

impl From<&[f64]> for Message {
    fn from(slots: &[f64]) -> Self {
        Self(slots.to_vec())
    }
}

impl Index<usize> for Message {
    type Output = f64;

    fn index(&self, i: usize) -> &f64 {
        &self.0[i]
    }
}

impl IndexMut<usize> for Message {
    fn index_mut(&mut self, i: usize) -> &mut f64 {
        &mut self.0[i]
    }
}

/// Fixed-point encoding into a coefficient-domain polynomial.
///
/// Slot `i` of a message of length L lands on coefficient `i * degree / L`
/// as `round(scale * m_i)`; L must divide `degree`.
pub fn encode(message: &Message, scale: f64, degree: usize, modulus: u64) -> Result<Polynomial> {
    let len = message.len();
    if len == 0 || degree % len != 0 {
        return Err(validation_err!(
            "message length {} does not divide degree {}",
            len,
            degree
        ));
    }
    if !scale.is_finite() || scale <= 0.0 {
        return Err(validation_err!("scale must be positive, got {}", scale));
    }
    if message.0.iter().any(|v| !v.is_finite()) {
        return Err(validation_err!("message contains a non-finite slot"));
    }
    let bound = (modulus / 2) as f64;
    if scale * message.max_abs() >= bound {
        return Err(validation_err!(
            "scale {} overflows the modulus for max |m| = {}",
            scale,
            message.max_abs()
        ));
    }

    let gap = degree / len;
    let mut poly = Polynomial::zero(degree, modulus);
    for (i, &v) in message.0.iter().enumerate() {
        poly.set_coeff(i * gap, ModQ::from_f64(v * scale, modulus));
    }
    Ok(poly)
}

/// Inverse of [`encode`] at full resolution: every coefficient becomes a slot.
pub fn decode(poly: &Polynomial, scale: f64) -> Result<Message> {
    if poly.is_ntt() {
        return Err(crypto_err!("cannot decode a polynomial in the NTT domain"));
    }
    Ok(Message(
        (0..poly.degree())
            .map(|i| poly.centered(i) as f64 / scale)
            .collect(),
    ))
}
