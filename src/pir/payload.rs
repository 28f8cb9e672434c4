//! Payload encoding for retrieval
//!
//! A payload block is `N / 4` bytes: a little-endian `u16` length, the
//! payload bytes and zero padding. The client seals the whole block, so the
//! server only ever holds fixed-size opaque blocks.
//!
//! One block fills one degree-N polynomial at two bits per coefficient;
//! each byte is split into four 2-bit digits, least significant first,
//! stored centered (`v ≥ 2` becomes `v - 4`) so a PIR selector multiplies
//! small values.
//!
//! Sealing uses a ChaCha20 keystream keyed by the [`PayloadKey`], with one
//! stream per collection entry.

use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha20Rng;
use std::fs;
use std::path::Path;

use crate::error::{validation_err, Result};
use crate::math::Polynomial;
use crate::message::Message;
use crate::params::PIR_BITS_PER_COEFF;

const DIGITS_PER_BYTE: usize = 8 / PIR_BITS_PER_COEFF;
const DIGIT_MASK: u8 = (1 << PIR_BITS_PER_COEFF) - 1;
const LENGTH_PREFIX: usize = 2;

/// Bytes in one payload block for ring degree `degree`
pub fn block_len(degree: usize) -> usize {
    degree / DIGITS_PER_BYTE
}

/// Largest payload in bytes for ring degree `degree`
pub fn max_payload_len(degree: usize) -> usize {
    block_len(degree) - LENGTH_PREFIX
}

/// Length-prefixed, zero-padded block holding `bytes`.
pub fn pack_block(bytes: &[u8], degree: usize) -> Result<Vec<u8>> {
    let max = max_payload_len(degree);
    if bytes.len() > max {
        return Err(validation_err!(
            "payload of {} bytes exceeds the {} byte block",
            bytes.len(),
            max
        ));
    }
    let mut block = Vec::with_capacity(block_len(degree));
    block.extend_from_slice(&(bytes.len() as u16).to_le_bytes());
    block.extend_from_slice(bytes);
    block.resize(block_len(degree), 0);
    Ok(block)
}

/// Payload bytes of an opened block
pub fn unpack_block(block: &[u8]) -> Result<Vec<u8>> {
    if block.len() < LENGTH_PREFIX {
        return Err(validation_err!("payload block too short"));
    }
    let len = u16::from_le_bytes([block[0], block[1]]) as usize;
    if len > block.len() - LENGTH_PREFIX {
        return Err(validation_err!(
            "payload length {} overruns the block of {} bytes",
            len,
            block.len() - LENGTH_PREFIX
        ));
    }
    Ok(block[LENGTH_PREFIX..LENGTH_PREFIX + len].to_vec())
}

/// Centered digits of one block, `degree` of them.
pub fn block_digits(block: &[u8], degree: usize) -> Result<Vec<i64>> {
    if block.len() != block_len(degree) {
        return Err(validation_err!(
            "payload block of {} bytes, expected {}",
            block.len(),
            block_len(degree)
        ));
    }
    let half = 1 << (PIR_BITS_PER_COEFF - 1);
    let mut digits = Vec::with_capacity(degree);
    for byte in block {
        for d in 0..DIGITS_PER_BYTE {
            let v = (byte >> (d * PIR_BITS_PER_COEFF)) & DIGIT_MASK;
            digits.push(if v >= half { v as i64 - (1 << PIR_BITS_PER_COEFF) } else { v as i64 });
        }
    }
    Ok(digits)
}

/// Block as a coefficient-domain plaintext polynomial
pub fn block_polynomial(block: &[u8], degree: usize, modulus: u64) -> Result<Polynomial> {
    Ok(Polynomial::from_signed(&block_digits(block, degree)?, modulus))
}

/// Reads a block back from decoded digit values (already divided by the scale).
pub fn decode_block(digits: &Message) -> Vec<u8> {
    digits
        .as_slice()
        .chunks(DIGITS_PER_BYTE)
        .map(|chunk| {
            chunk.iter().enumerate().fold(0u8, |acc, (d, v)| {
                let digit = (v.round() as i64).rem_euclid(1 << PIR_BITS_PER_COEFF) as u8;
                acc | (digit << (d * PIR_BITS_PER_COEFF))
            })
        })
        .collect()
}

/// Symmetric key sealing payloads at rest.
#[derive(Clone, PartialEq, Eq)]
pub struct PayloadKey([u8; 32]);

impl std::fmt::Debug for PayloadKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("PayloadKey(..)")
    }
}

impl PayloadKey {
    /// Fresh key from OS randomness
    pub fn generate() -> Self {
        let mut key = [0u8; 32];
        ChaCha20Rng::from_entropy().fill_bytes(&mut key);
        Self(key)
    }

    /// Key from raw bytes
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Writes the raw key to `path`
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        fs::write(path, self.0)?;
        Ok(())
    }

    /// Reads a key written by [`PayloadKey::save`]
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read(path)?;
        let bytes: [u8; 32] = raw
            .as_slice()
            .try_into()
            .map_err(|_| validation_err!("payload key must be 32 bytes, got {}", raw.len()))?;
        Ok(Self(bytes))
    }

    fn keystream(&self, collection_id: u32, index: u64, len: usize) -> Vec<u8> {
        let mut rng = ChaCha20Rng::from_seed(self.0);
        rng.set_stream(((collection_id as u64) << 32) | (index & 0xffff_ffff));
        let mut out = vec![0u8; len];
        rng.fill_bytes(&mut out);
        out
    }

    /// XORs `bytes` with the keystream of entry `index`; sealing and opening are the same map.
    pub fn apply(&self, collection_id: u32, index: u64, bytes: &[u8]) -> Vec<u8> {
        self.keystream(collection_id, index, bytes.len())
            .iter()
            .zip(bytes)
            .map(|(k, b)| k ^ b)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::EVD_Q;

    #[test]
    fn test_digits_layout() {
        let block = pack_block(&[0b1110_0100], 64).unwrap();
        assert_eq!(block.len(), 16);
        let digits = block_digits(&block, 64).unwrap();
        assert_eq!(digits.len(), 64);
        // length prefix 1, 0
        assert_eq!(&digits[..8], &[1, 0, 0, 0, 0, 0, 0, 0]);
        // 0b11_10_01_00 → 0, 1, 2, 3 → centered 0, 1, -2, -1
        assert_eq!(&digits[8..12], &[0, 1, -2, -1]);
        assert!(digits[12..].iter().all(|&d| d == 0));
    }

    #[test]
    fn test_decode_digits() {
        let payload = b"hello, payload".to_vec();
        let block = pack_block(&payload, 256).unwrap();
        let digits = block_digits(&block, 256).unwrap();
        // slight noise must round away
        let noisy: Vec<f64> = digits.iter().map(|&d| d as f64 + 0.3).collect();
        let back = decode_block(&Message::from(noisy));
        assert_eq!(back, block);
        assert_eq!(unpack_block(&back).unwrap(), payload);
    }

    #[test]
    fn test_block_size_hides_payload_length() {
        let short = pack_block(b"a", 256).unwrap();
        let long = pack_block(&[5u8; 40], 256).unwrap();
        assert_eq!(short.len(), block_len(256));
        assert_eq!(long.len(), block_len(256));

        let key = PayloadKey::from_bytes([3u8; 32]);
        let sealed = key.apply(1, 0, &short);
        assert_eq!(sealed.len(), 64);
        assert_eq!(unpack_block(&key.apply(1, 0, &sealed)).unwrap(), b"a");
    }

    #[test]
    fn test_payload_limits() {
        assert_eq!(max_payload_len(4096), 1022);
        assert!(pack_block(&[7u8; 62], 256).is_ok());
        assert!(pack_block(&[7u8; 63], 256).is_err());
        assert!(block_polynomial(&[0u8; 64], 256, EVD_Q).unwrap().is_zero());
        assert!(block_digits(&[0u8; 63], 256).is_err());
    }

    #[test]
    fn test_corrupt_length_rejected() {
        let mut block = vec![0u8; 16];
        block[0] = 0xff;
        block[1] = 0xff;
        assert!(unpack_block(&block).is_err());
        assert!(unpack_block(&[1u8]).is_err());
    }

    #[test]
    fn test_seal_and_open() {
        let key = PayloadKey::from_bytes([9u8; 32]);
        let plain = b"secret payload".to_vec();
        let sealed = key.apply(1, 5, &plain);
        assert_ne!(sealed, plain);
        assert_eq!(key.apply(1, 5, &sealed), plain);
        // streams differ per entry and per collection
        assert_ne!(key.apply(1, 6, &plain), sealed);
        assert_ne!(key.apply(2, 5, &plain), sealed);
    }

    #[test]
    fn test_key_file_roundtrip() {
        let dir = std::env::temp_dir().join(format!("evd-payload-key-{}", std::process::id()));
        let key = PayloadKey::generate();
        key.save(&dir).unwrap();
        assert_eq!(PayloadKey::load(&dir).unwrap(), key);
        std::fs::write(&dir, [1u8; 5]).unwrap();
        assert!(PayloadKey::load(&dir).is_err());
        std::fs::remove_file(&dir).unwrap();
    }
}
