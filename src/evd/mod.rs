//! Encrypted vector database client
//!
//! [`EvdClient`] owns the secret key and drives every collection operation
//! over a [`Transport`]. Vectors and encrypted queries never leave the client
//! in the clear; the service only sees ciphertexts, public evaluation keys
//! and payloads sealed with the client's payload key.
//!
//! # Example
//!
//! ```ignore
//! use evd::evd::{EvdClient, EvdConfig, EvdService, LocalTransport, MetricType};
//!
//! let service = Arc::new(EvdService::new(params.clone())?);
//! let mut client = EvdClient::new(params, EvdConfig::from_env()?, Box::new(LocalTransport::new(service)))?;
//! client.setup_collection("memories", 384, MetricType::Cosine, true)?;
//! client.insert("memories", &rows, &payloads)?;
//! let hits = client.query_and_top_k_with_scores("memories", &query, 5)?;
//! let text = client.retrieve_pir("memories", hits[0].0)?;
//! ```

mod collection;
mod config;
#[cfg(feature = "server")]
pub mod http;
mod protocol;
mod service;
mod transport;

pub use collection::{validate_name, CollectionInfo, MetricType};
pub use config::{init_client_logging, EvdConfig, DEFAULT_TIMEOUT_MS};
pub use protocol::{
    decode_message, encode_message, Envelope, EvaluationKeys, OpCode, Reply, Request,
    SetupStatus, PROTOCOL_VERSION,
};
pub use service::EvdService;
#[cfg(feature = "server")]
pub use transport::HttpTransport;
pub use transport::{LocalTransport, Transport};

use std::collections::HashMap;
use std::time::Instant;
use tracing::{debug, info};

use crate::client::Client;
use crate::error::{network_err, resource_err, validation_err, EvdError, Result};
use crate::math::{RingContext, Sampler};
use crate::message::Message;
use crate::params::{EvdParams, RankLayout};
use crate::pir::{self, PayloadKey};
use crate::rlwe::SecretKey;
use crate::topk::{self, TopK};

/// Server-assigned collection id
pub type CollectionId = u32;

struct CollectionHandle {
    info: CollectionInfo,
    client: Client,
    size: usize,
}

/// Client side of an EVD session.
pub struct EvdClient {
    params: EvdParams,
    transport: Box<dyn Transport>,
    secret: SecretKey,
    payload_key: PayloadKey,
    collections: HashMap<String, CollectionHandle>,
    seed: Option<u64>,
    terminated: bool,
}

impl EvdClient {
    /// Opens a session over `transport`.
    ///
    /// The secret and payload keys are loaded from the paths in `config`
    /// when the files exist, otherwise generated and written there.
    pub fn new(params: EvdParams, config: EvdConfig, transport: Box<dyn Transport>) -> Result<Self> {
        params.validate()?;
        let ring = RingContext::new(params.degree, params.q, params.p);

        let secret = match &config.secret_key_path {
            Some(path) if path.exists() => {
                info!("loading secret key from {}", path.display());
                SecretKey::load(path, &ring)?
            }
            path => {
                let mut sampler = Sampler::new(params.sigma);
                let secret = SecretKey::generate(&params, &ring, &mut sampler);
                if let Some(path) = path {
                    secret.save(path, &ring)?;
                    info!("new secret key written to {}", path.display());
                }
                secret
            }
        };
        let payload_key = match &config.payload_key_path {
            Some(path) if path.exists() => PayloadKey::load(path)?,
            path => {
                let key = PayloadKey::generate();
                if let Some(path) = path {
                    key.save(path)?;
                }
                key
            }
        };

        Ok(Self {
            params,
            transport,
            secret,
            payload_key,
            collections: HashMap::new(),
            seed: None,
            terminated: false,
        })
    }

    /// Deterministic session for tests: keys and noise derive from `seed`.
    pub fn with_seed(params: EvdParams, transport: Box<dyn Transport>, seed: u64) -> Result<Self> {
        params.validate()?;
        let ring = RingContext::new(params.degree, params.q, params.p);
        let mut sampler = Sampler::with_seed(params.sigma, seed);
        let secret = SecretKey::generate(&params, &ring, &mut sampler);
        let mut key = [0u8; 32];
        key[..8].copy_from_slice(&seed.to_le_bytes());
        Ok(Self {
            params,
            transport,
            secret,
            payload_key: PayloadKey::from_bytes(key),
            collections: HashMap::new(),
            seed: Some(seed),
            terminated: false,
        })
    }

    /// Session over HTTP to `config.server_url`
    #[cfg(feature = "server")]
    pub fn connect(params: EvdParams, config: EvdConfig) -> Result<Self> {
        let url = config
            .server_url
            .clone()
            .ok_or_else(|| validation_err!("EVD_SERVER_URL is not set"))?;
        let transport = HttpTransport::new(url, params.degree, config.timeout())?;
        Self::new(params, config, Box::new(transport))
    }

    /// Parameters of the session
    pub fn params(&self) -> &EvdParams {
        &self.params
    }

    /// Descriptor of an attached collection
    pub fn collection(&self, name: &str) -> Option<&CollectionInfo> {
        self.collections.get(name).map(|h| &h.info)
    }

    /// Entry count of an attached collection as of the last round trip
    pub fn collection_size(&self, name: &str) -> Option<usize> {
        self.collections.get(name).map(|h| h.size)
    }

    /// Registers `name` on the server, or reattaches to it.
    ///
    /// A fresh collection takes two round trips: the server first asks for
    /// keys, then registers the collection once they arrive. An existing
    /// collection of the same shape is reattached after checking that this
    /// session holds the secret key that created it.
    pub fn setup_collection(
        &mut self,
        name: &str,
        dimension: usize,
        metric: MetricType,
        is_query_encrypt: bool,
    ) -> Result<CollectionId> {
        self.ensure_open()?;
        validate_name(name)?;
        if self.collections.contains_key(name) {
            return Err(validation_err!("collection {:?} is already set up", name));
        }
        if dimension == 0 {
            return Err(validation_err!("dimension must be positive"));
        }
        let layout = RankLayout::for_dimension(metric.reduced_dimension(dimension), self.params.degree)?;

        let request = |keys: Option<Box<EvaluationKeys>>| Request::Setup {
            name: name.to_string(),
            dimension,
            metric,
            is_query_encrypt,
            keys,
        };
        let mut client = self.new_client(&layout)?;
        let (info, size) = match self.setup_round(request(None))? {
            SetupStatus::NeedsKeys => {
                let start = Instant::now();
                let keys = EvaluationKeys {
                    log_rank: layout.log_rank,
                    relin: client.gen_relin_key(&self.secret)?,
                    mod_pack: client.gen_auted_mod_pack_keys(&self.secret)?,
                    mod_pack_mlwe: client.gen_inv_auted_mod_pack_keys(&self.secret)?,
                    inv_aut: client.gen_inv_aut_keys(&self.secret)?,
                    key_check: client.gen_key_check()?,
                };
                debug!("keys for {:?} generated in {:.2?}", name, start.elapsed());
                match self.setup_round(request(Some(Box::new(keys))))? {
                    SetupStatus::Created(info) => (info, 0),
                    SetupStatus::Existing {
                        info,
                        size,
                        key_check,
                    } => {
                        client.verify_key_check(&key_check)?;
                        (info, size)
                    }
                    other => return Err(unexpected_setup(name, &other)),
                }
            }
            SetupStatus::Existing {
                info,
                size,
                key_check,
            } => {
                client.verify_key_check(&key_check)?;
                (info, size)
            }
            other => return Err(unexpected_setup(name, &other)),
        };

        info!(
            "collection {:?} ready (id {}, dim {}, {}, {} entries)",
            name, info.id, dimension, metric, size
        );
        let id = info.id;
        self.collections
            .insert(name.to_string(), CollectionHandle { info, client, size });
        Ok(id)
    }

    /// Removes the collection and every entry on the server.
    ///
    /// Fails with a resource error when the collection does not exist.
    pub fn drop_collection(&mut self, name: &str) -> Result<()> {
        self.ensure_open()?;
        let reply = self.transport.round_trip(&Request::DropCollection {
            name: name.to_string(),
        });
        self.collections.remove(name);
        expect_ack(reply?)?;
        info!("dropped collection {:?}", name);
        Ok(())
    }

    /// Appends `rows` with their payloads, returning the new entry count.
    ///
    /// Entries are numbered in insertion order starting at the current size.
    /// When another session inserted in the meantime the server rejects the
    /// batch with a validation error; a query refreshes the size.
    pub fn insert<P: AsRef<[u8]>>(&mut self, name: &str, rows: &[Vec<f64>], payloads: &[P]) -> Result<usize> {
        self.ensure_open()?;
        let max_payload = pir::max_payload_len(self.params.degree);
        let handle = self.handle_mut(name)?;
        let info = handle.info.clone();
        if rows.len() != payloads.len() {
            return Err(validation_err!(
                "{} rows but {} payloads",
                rows.len(),
                payloads.len()
            ));
        }
        if let Some(row) = rows.iter().find(|r| r.len() != info.dimension) {
            return Err(validation_err!(
                "row of length {} in a collection of dimension {}",
                row.len(),
                info.dimension
            ));
        }
        if let Some(p) = payloads.iter().find(|p| p.as_ref().len() > max_payload) {
            return Err(validation_err!(
                "payload of {} bytes exceeds {} bytes",
                p.as_ref().len(),
                max_payload
            ));
        }

        let start = Instant::now();
        let scale = info.scales().key;
        let keys = rows
            .iter()
            .map(|row| {
                let reduced = Message::from(info.metric.reduce_key(row));
                handle.client.encrypt_key(&reduced, scale)
            })
            .collect::<Result<Vec<_>>>()?;
        let first = handle.size;
        let degree = self.params.degree;
        let sealed = payloads
            .iter()
            .enumerate()
            .map(|(i, p)| {
                let block = pir::pack_block(p.as_ref(), degree)?;
                Ok(self.payload_key.apply(info.id, (first + i) as u64, &block))
            })
            .collect::<Result<Vec<_>>>()?;
        debug!("{} rows encrypted in {:.2?}", rows.len(), start.elapsed());

        let reply = self.transport.round_trip(&Request::Insert {
            name: name.to_string(),
            first: first as u64,
            keys,
            payloads: sealed,
        })?;
        let size = match reply {
            Reply::Inserted { size } => size,
            other => return Err(unexpected(name, &other)),
        };
        self.handle_mut(name)?.size = size;
        info!("inserted {} rows into {:?} ({} total)", rows.len(), name, size);
        Ok(size)
    }

    /// Scores of `query` against every entry, in index order.
    pub fn query(&mut self, name: &str, query: &[f64]) -> Result<Vec<f64>> {
        self.ensure_open()?;
        let start = Instant::now();
        let handle = self.handle_mut(name)?;
        let info = handle.info.clone();
        if query.len() != info.dimension {
            return Err(validation_err!(
                "query of length {} in a collection of dimension {}",
                query.len(),
                info.dimension
            ));
        }
        let scales = info.scales();
        let reduced = info.metric.reduce_query(query);
        let request = if info.is_query_encrypt {
            Request::Query {
                name: name.to_string(),
                query: handle.client.encrypt_query(&Message::from(reduced), scales.query)?,
            }
        } else {
            Request::QueryPlain {
                name: name.to_string(),
                query: reduced,
            }
        };

        let (blocks, size) = match self.transport.round_trip(&request)? {
            Reply::Scores { blocks, size } => (blocks, size),
            other => return Err(unexpected(name, &other)),
        };
        let degree = self.params.degree;
        if blocks.len() != size.div_ceil(degree) {
            return Err(validation_err!(
                "{} score blocks for {} entries",
                blocks.len(),
                size
            ));
        }
        let handle = lookup(&mut self.collections, name)?;
        handle.size = size;
        let mut messages = vec![Message::default(); blocks.len()];
        handle
            .client
            .decrypt_score(&mut messages, &blocks, &self.secret, scales.output())?;
        let mut scores: Vec<f64> = messages.into_iter().flat_map(Message::into_vec).collect();
        scores.truncate(size);
        debug!("query on {:?} over {} entries in {:.2?}", name, size, start.elapsed());
        Ok(scores)
    }

    /// Runs [`EvdClient::query`] and ranks the scores into `out`.
    pub fn query_and_top_k(&mut self, out: &mut TopK, name: &str, query: &[f64]) -> Result<()> {
        let scores = self.query(name, query)?;
        let handle = self.handle_mut(name)?;
        handle.client.top_k_score(out, &[Message::from(scores)]);
        Ok(())
    }

    /// The `k` best entries with their scores, best first.
    pub fn query_and_top_k_with_scores(&mut self, name: &str, query: &[f64], k: usize) -> Result<Vec<(usize, f64)>> {
        let scores = self.query(name, query)?;
        Ok(topk::top_k_with_scores(&scores, k))
    }

    /// Payload of entry `index`. The server learns the index.
    pub fn retrieve(&mut self, name: &str, index: usize) -> Result<Vec<u8>> {
        self.ensure_open()?;
        let id = self.handle_mut(name)?.info.id;
        let reply = self.transport.round_trip(&Request::Retrieve {
            name: name.to_string(),
            index: index as u64,
        })?;
        match reply {
            Reply::Payload(sealed) => pir::unpack_block(&self.payload_key.apply(id, index as u64, &sealed)),
            other => Err(unexpected(name, &other)),
        }
    }

    /// Payload of entry `index` without revealing the index.
    ///
    /// Request and response sizes depend only on the collection size.
    pub fn retrieve_pir(&mut self, name: &str, index: usize) -> Result<Vec<u8>> {
        self.ensure_open()?;
        let start = Instant::now();
        let handle = self.handle_mut(name)?;
        let query = pir::build_query(&mut handle.client, index, handle.size)?;
        let id = handle.info.id;
        let reply = self.transport.round_trip(&Request::PirRetrieve {
            name: name.to_string(),
            query,
        })?;
        let response = match reply {
            Reply::Pir(response) => response,
            other => return Err(unexpected(name, &other)),
        };
        let handle = self.handle_mut(name)?;
        let sealed = pir::decode_response(&handle.client, &response)?;
        debug!("private retrieval from {:?} in {:.2?}", name, start.elapsed());
        pir::unpack_block(&self.payload_key.apply(id, index as u64, &sealed))
    }

    /// Ends the session; every later call fails with a network error.
    pub fn terminate(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.terminated = true;
        self.collections.clear();
        expect_ack(self.transport.round_trip(&Request::Terminate)?)?;
        info!("session terminated");
        Ok(())
    }

    /// Indices of the `k` largest scores, best first
    pub fn get_top_k_indices(scores: &[f64], k: usize) -> Vec<usize> {
        topk::get_top_k_indices(scores, k)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.terminated {
            return Err(network_err!("session is terminated"));
        }
        Ok(())
    }

    fn handle_mut(&mut self, name: &str) -> Result<&mut CollectionHandle> {
        lookup(&mut self.collections, name)
    }

    fn setup_round(&self, request: Request) -> Result<SetupStatus> {
        match self.transport.round_trip(&request)? {
            Reply::Setup(SetupStatus::Mismatch(info)) => Err(validation_err!(
                "collection {:?} exists with dimension {}, {}, encrypted queries {}",
                info.name,
                info.dimension,
                info.metric,
                info.is_query_encrypt
            )),
            Reply::Setup(status) => Ok(status),
            other => Err(unexpected(&request_name(&request), &other)),
        }
    }

    fn new_client(&mut self, layout: &RankLayout) -> Result<Client> {
        let mut client = match self.seed {
            Some(seed) => {
                let derived = seed.wrapping_add(1 + self.collections.len() as u64);
                Client::with_seed(self.params.clone(), layout.log_rank, derived)?
            }
            None => Client::new(self.params.clone(), layout.log_rank)?,
        };
        client.set_secret_key(self.secret.clone())?;
        Ok(client)
    }
}

fn lookup<'a>(
    collections: &'a mut HashMap<String, CollectionHandle>,
    name: &str,
) -> Result<&'a mut CollectionHandle> {
    collections
        .get_mut(name)
        .ok_or_else(|| resource_err!("collection {:?} is not set up", name))
}

fn request_name(request: &Request) -> String {
    match request {
        Request::Setup { name, .. } => name.clone(),
        _ => String::new(),
    }
}

fn expect_ack(reply: Reply) -> Result<()> {
    match reply {
        Reply::Ack => Ok(()),
        other => Err(unexpected("", &other)),
    }
}

fn unexpected_setup(name: &str, status: &SetupStatus) -> EvdError {
    network_err!("unexpected setup status for {:?}: {:?}", name, status)
}

fn unexpected(name: &str, reply: &Reply) -> EvdError {
    let kind = match reply {
        Reply::Setup(_) => "setup",
        Reply::Ack => "ack",
        Reply::Inserted { .. } => "insert",
        Reply::Scores { .. } => "scores",
        Reply::Payload(_) => "payload",
        Reply::Pir(_) => "pir",
        Reply::Error { .. } => "error",
    };
    network_err!("unexpected {} reply for {:?}", kind, name)
}
