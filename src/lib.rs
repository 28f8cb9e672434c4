//! EVD: Encrypted Vector Database
//!
//! Similarity search where the server never sees vectors or queries in the
//! clear, built on RLWE/MLWE encryption over `Z_Q[X]/(X^N + 1)`.
//!
//! Key components:
//! - Client: key generation, encoding and MLWE encryption of keys and queries
//! - Server: query and key caching by automorphism plus mod-packing, then one
//!   relinearized inner product per block of N entries
//! - PIR: payload retrieval through server-side query expansion
//! - EvdClient / EvdService: collections, metrics and the wire protocol

pub mod client;
pub mod error;
pub mod evd;
pub mod ks;
pub mod math;
pub mod message;
pub mod params;
pub mod pir;
pub mod rlwe;
pub mod server;
pub mod topk;

pub use client::Client;
pub use error::{ErrorKind, EvdError, Result};
pub use evd::{CollectionInfo, EvdClient, EvdConfig, EvdService, LocalTransport, MetricType};
pub use message::Message;
pub use params::{EvdParams, RankLayout};
pub use server::{CachedKeys, CachedQuery, Server};
pub use topk::{get_top_k_indices, TopK};
