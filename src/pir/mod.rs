//! Private retrieval of collection payloads
//!
//! Fetches the payload of one entry without revealing which entry.
//!
//! # Protocol Overview
//!
//! 1. **Query**: the client encrypts a one-hot selection, one ciphertext
//!    per block of entries
//! 2. **Respond**: the server expands every ciphertext into per-entry
//!    selectors with the expansion keys, multiplies each by its entry's
//!    payload polynomial and sums everything into one ciphertext
//! 3. **Extract**: the client decrypts and reads back the block digits
//!
//! Request and response sizes depend only on the number of entries.
//!
//! # Example
//!
//! ```ignore
//! use evd::pir::{build_query, decode_response, respond};
//!
//! let query = build_query(&mut client, 42, payloads.len())?;
//! let response = respond(&query, &payloads, &inv_aut_keys, &ring)?;
//! let block = decode_response(&client, &response)?;
//! ```

mod payload;
mod query;
mod respond;

pub use payload::{
    block_digits, block_len, block_polynomial, decode_block, max_payload_len, pack_block,
    unpack_block, PayloadKey,
};
pub use query::{block_count, block_size, build_query, decode_response, PirQuery, PirResponse};
pub use respond::{expand, respond};
