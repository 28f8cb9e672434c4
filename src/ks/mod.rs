//! Key-switching module
//!
//! Transforms a ciphertext valid under s' into one valid under s. The EVD
//! protocol needs it for three things:
//! - relinearizing tensor products (s' = s²)
//! - packing rotated MLWE components into one RLWE ciphertext
//!   (s' = φ(τ_g(σ_j)))
//! - the PIR selector expansion (s' = τ_g(s))
//!
//! # Switching key
//!
//! Keys are hybrid: they encrypt P·s' modulo Q·P, stored as one half per
//! modulus, so switching needs no gadget decomposition:
//! ```text
//! K = (a_q, a_p, b_q, b_p),   b + a·s = e + P·s'
//! ```
//!
//! # Example
//!
//! ```ignore
//! use evd::ks::{generate_relin_key, relinearize};
//!
//! let relin = generate_relin_key(&sk, &ring, &mut sampler);
//! let ct = relinearize(&extended, &relin, &ring)?;
//! ```

mod setup;
mod switch;
mod types;

pub use setup::{
    generate_auted_mod_pack_keys, generate_auted_mod_pack_mlwe_keys, generate_inv_aut_keys,
    generate_relin_key, generate_switching_key, split_switching_key,
};
pub use switch::{
    automorphism_key_switch, key_switch, relinearize, ComponentKeySwitchAccumulator,
    KeySwitchAccumulator,
};
pub use types::{
    AutedModPackKeys, AutedModPackMLWEKeys, InvAutKeys, MLWESwitchingKey, SwitchingKey,
};
