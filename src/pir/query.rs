//! PIR query and response handling on the client
//!
//! The client encrypts one ciphertext per block of `B` entries. The block
//! holding the target carries `Δ · B⁻¹` at the target's coefficient, every
//! other block encrypts zero, so all requests for a given collection size
//! look alike.

use serde::{Deserialize, Serialize};

use crate::client::Client;
use crate::error::{validation_err, Result};
use crate::math::{ModQ, Polynomial};
use crate::params::PIR_SCALE;
use crate::rlwe::Ciphertext;

use super::payload::decode_block;

/// Entries per selection ciphertext for a collection of `count` entries.
pub fn block_size(count: usize, degree: usize) -> usize {
    count.max(1).next_power_of_two().min(degree)
}

/// Number of selection ciphertexts for `count` entries.
pub fn block_count(count: usize, degree: usize) -> usize {
    count.max(1).div_ceil(block_size(count, degree))
}

/// Encrypted one-hot selection over a collection.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PirQuery {
    /// One coefficient-domain ciphertext per block
    pub cts: Vec<Ciphertext>,
    /// Entries per block, a power of two
    pub block_size: usize,
}

/// Encrypted payload block returned by the server.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PirResponse {
    /// Coefficient-domain ciphertext of the selected payload digits
    pub ct: Ciphertext,
}

/// PIR.Query(index) → query
///
/// # Arguments
/// * `client` - client holding the secret key
/// * `index` - entry to fetch
/// * `count` - number of entries in the collection
pub fn build_query(client: &mut Client, index: usize, count: usize) -> Result<PirQuery> {
    if index >= count {
        return Err(validation_err!(
            "index {} out of range for {} entries",
            index,
            count
        ));
    }
    let (degree, q) = (client.params().degree, client.params().q);
    let block = block_size(count, degree);
    let selected = ModQ::mul(
        (PIR_SCALE as u64) % q,
        ModQ::inv(block as u64, q),
        q,
    );

    let cts = (0..block_count(count, degree))
        .map(|b| {
            let mut pt = Polynomial::zero(degree, q);
            if b == index / block {
                pt.set_coeff(index % block, selected);
            }
            client.encrypt_polynomial(&pt)
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(PirQuery {
        cts,
        block_size: block,
    })
}

/// PIR.Extract(response) → the selected block as stored
pub fn decode_response(client: &Client, response: &PirResponse) -> Result<Vec<u8>> {
    let digits = client.decrypt_owned(&response.ct, PIR_SCALE)?;
    Ok(decode_block(&digits))
}
