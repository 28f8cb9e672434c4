//! Server side of the EVD protocol: a registry of collections.
//!
//! Each collection owns a [`Server`] built from the uploaded keys, its key
//! ciphertexts, sealed payloads and one [`CachedKeys`] per block of N
//! entries. Requests on one collection are serialized by its mutex; the
//! registry itself is behind a read-write lock.

use rayon::prelude::*;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::error::{crypto_err, resource_err, validation_err, Result};
use crate::ks::InvAutKeys;
use crate::math::{Polynomial, RingContext};
use crate::message::Message;
use crate::params::{EvdParams, RankLayout};
use crate::pir::{self, PirQuery, PirResponse};
use crate::rlwe::{Ciphertext, MLWECiphertext};
use crate::server::{CachedKeys, Server};

use super::collection::{validate_name, CollectionInfo, MetricType};
use super::protocol::{decode_message, encode_message, EvaluationKeys, Reply, Request, SetupStatus};

struct CollectionState {
    info: CollectionInfo,
    server: Server,
    inv_aut_keys: InvAutKeys,
    key_check: Ciphertext,
    keys: Vec<MLWECiphertext>,
    payloads: Vec<Vec<u8>>,
    payload_polys: Vec<Polynomial>,
    blocks: Vec<CachedKeys>,
}

/// Collection registry answering [`Request`]s.
pub struct EvdService {
    params: EvdParams,
    ring: RingContext,
    collections: RwLock<HashMap<String, Arc<Mutex<CollectionState>>>>,
    next_id: AtomicU32,
}

impl EvdService {
    /// Empty service for the given parameters
    pub fn new(params: EvdParams) -> Result<Self> {
        params.validate()?;
        Ok(Self {
            ring: RingContext::new(params.degree, params.q, params.p),
            params,
            collections: RwLock::new(HashMap::new()),
            next_id: AtomicU32::new(1),
        })
    }

    /// Parameters in use
    pub fn params(&self) -> &EvdParams {
        &self.params
    }

    /// Number of registered collections
    pub fn collection_count(&self) -> usize {
        self.collections.read().map(|c| c.len()).unwrap_or(0)
    }

    /// Decodes a framed request, answers it and frames the reply.
    pub fn handle_bytes(&self, bytes: &[u8]) -> Vec<u8> {
        let reply = match decode_message::<Request>(bytes, self.params.degree) {
            Ok(request) => self.handle(request),
            Err(err) => Reply::from(err),
        };
        encode_message(&reply, self.params.degree).unwrap_or_else(|err| {
            warn!("failed to encode reply: {}", err);
            Vec::new()
        })
    }

    /// Answers one request; failures come back as [`Reply::Error`].
    pub fn handle(&self, request: Request) -> Reply {
        let op = request.op();
        let start = Instant::now();
        let result = match request {
            Request::Setup {
                name,
                dimension,
                metric,
                is_query_encrypt,
                keys,
            } => self
                .setup(name, dimension, metric, is_query_encrypt, keys.map(|k| *k))
                .map(Reply::Setup),
            Request::DropCollection { name } => self.drop_collection(&name).map(|_| Reply::Ack),
            Request::Insert {
                name,
                first,
                keys,
                payloads,
            } => self
                .insert(&name, first, keys, payloads)
                .map(|size| Reply::Inserted { size }),
            Request::Query { name, query } => self
                .query(&name, &query)
                .map(|(blocks, size)| Reply::Scores { blocks, size }),
            Request::QueryPlain { name, query } => self
                .query_plain(&name, &query)
                .map(|(blocks, size)| Reply::Scores { blocks, size }),
            Request::Retrieve { name, index } => self.retrieve(&name, index).map(Reply::Payload),
            Request::PirRetrieve { name, query } => {
                self.pir_retrieve(&name, &query).map(Reply::Pir)
            }
            Request::Terminate => {
                info!("session terminated");
                Ok(Reply::Ack)
            }
        };
        debug!("{:?} handled in {:.2?}", op, start.elapsed());
        result.unwrap_or_else(|err| {
            debug!("{:?} failed: {}", op, err);
            Reply::from(err)
        })
    }

    fn collection(&self, name: &str) -> Result<Arc<Mutex<CollectionState>>> {
        let map = self
            .collections
            .read()
            .map_err(|_| resource_err!("collection registry poisoned"))?;
        map.get(name)
            .cloned()
            .ok_or_else(|| resource_err!("collection {:?} does not exist", name))
    }

    fn with_collection<T>(&self, name: &str, f: impl FnOnce(&mut CollectionState) -> Result<T>) -> Result<T> {
        let entry = self.collection(name)?;
        let mut state = entry
            .lock()
            .map_err(|_| resource_err!("collection {:?} poisoned", name))?;
        f(&mut state)
    }

    fn setup(
        &self,
        name: String,
        dimension: usize,
        metric: MetricType,
        is_query_encrypt: bool,
        keys: Option<EvaluationKeys>,
    ) -> Result<SetupStatus> {
        validate_name(&name)?;
        let reduced = metric.reduced_dimension(dimension);
        let layout = RankLayout::for_dimension(reduced, self.params.degree)?;

        let mut map = self
            .collections
            .write()
            .map_err(|_| resource_err!("collection registry poisoned"))?;
        if let Some(entry) = map.get(&name) {
            let state = entry
                .lock()
                .map_err(|_| resource_err!("collection {:?} poisoned", name))?;
            let info = state.info.clone();
            if info.dimension != dimension
                || info.metric != metric
                || info.is_query_encrypt != is_query_encrypt
            {
                return Ok(SetupStatus::Mismatch(info));
            }
            return Ok(SetupStatus::Existing {
                info,
                size: state.keys.len(),
                key_check: state.key_check.clone(),
            });
        }

        let Some(keys) = keys else {
            return Ok(SetupStatus::NeedsKeys);
        };
        if keys.log_rank != layout.log_rank {
            return Err(crypto_err!(
                "keys for log rank {}, collection needs {}",
                keys.log_rank,
                layout.log_rank
            ));
        }
        let (degree, q, p) = (self.params.degree, self.params.q, self.params.p);
        keys.relin.validate(degree, q, p)?;
        keys.inv_aut.validate(degree, q, p)?;
        if keys.key_check.is_extended() {
            return Err(validation_err!("key check must have two components"));
        }
        keys.key_check.validate(degree, q, false)?;
        let start = Instant::now();
        let server = Server::new(keys.log_rank, keys.relin, keys.mod_pack, keys.mod_pack_mlwe)?;
        debug!("keys for {:?} validated in {:.2?}", name, start.elapsed());

        let info = CollectionInfo {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            name: name.clone(),
            dimension,
            metric,
            is_query_encrypt,
        };
        info!(
            "created collection {:?} (id {}, dim {}, {}, rank {})",
            name, info.id, dimension, metric, layout.rank
        );
        map.insert(
            name,
            Arc::new(Mutex::new(CollectionState {
                info: info.clone(),
                server,
                inv_aut_keys: keys.inv_aut,
                key_check: keys.key_check,
                keys: Vec::new(),
                payloads: Vec::new(),
                payload_polys: Vec::new(),
                blocks: Vec::new(),
            })),
        );
        Ok(SetupStatus::Created(info))
    }

    fn drop_collection(&self, name: &str) -> Result<()> {
        let mut map = self
            .collections
            .write()
            .map_err(|_| resource_err!("collection registry poisoned"))?;
        map.remove(name)
            .ok_or_else(|| resource_err!("collection {:?} does not exist", name))?;
        info!("dropped collection {:?}", name);
        Ok(())
    }

    fn insert(
        &self,
        name: &str,
        first: u64,
        keys: Vec<MLWECiphertext>,
        payloads: Vec<Vec<u8>>,
    ) -> Result<usize> {
        let (degree, q) = (self.params.degree, self.params.q);
        if keys.len() != payloads.len() {
            return Err(validation_err!(
                "{} vectors but {} payloads",
                keys.len(),
                payloads.len()
            ));
        }
        let block_len = pir::block_len(degree);
        if let Some(p) = payloads.iter().find(|p| p.len() != block_len) {
            return Err(validation_err!(
                "sealed payload of {} bytes, expected a {} byte block",
                p.len(),
                block_len
            ));
        }
        self.with_collection(name, |state| {
            let first_index = state.keys.len();
            if first != first_index as u64 {
                return Err(validation_err!(
                    "payloads sealed from index {}, collection {:?} holds {} entries",
                    first,
                    name,
                    first_index
                ));
            }
            let layout = *state.server.layout();
            for key in &keys {
                key.validate(&layout, q)?;
            }
            let polys = payloads
                .par_iter()
                .map(|p| Ok(pir::block_polynomial(p, degree, q)?.to_ntt_new(&self.ring.q)))
                .collect::<Result<Vec<_>>>()?;

            let start = Instant::now();
            let block = state.server.block_size();
            let total = first_index + keys.len();
            let touched = first_index / block..total.div_ceil(block);
            state.keys.extend(keys);
            let rebuilt = touched
                .clone()
                .map(|b| {
                    let end = ((b + 1) * block).min(total);
                    state.server.cache_keys(&state.keys[b * block..end])
                })
                .collect::<Result<Vec<_>>>();
            let rebuilt = match rebuilt {
                Ok(rebuilt) => rebuilt,
                Err(err) => {
                    state.keys.truncate(first_index);
                    return Err(err);
                }
            };
            state.payloads.extend(payloads);
            state.payload_polys.extend(polys);
            state.blocks.truncate(touched.start);
            state.blocks.extend(rebuilt);
            debug!(
                "inserted {} entries into {:?} ({} total), cache in {:.2?}",
                total - first_index,
                name,
                total,
                start.elapsed()
            );
            Ok(total)
        })
    }

    fn query(&self, name: &str, query: &MLWECiphertext) -> Result<(Vec<Ciphertext>, usize)> {
        self.with_collection(name, |state| {
            if !state.info.is_query_encrypt {
                return Err(validation_err!("collection {:?} expects plaintext queries", name));
            }
            let start = Instant::now();
            let cached = state.server.cache_query(query)?;
            debug!("query cached in {:.2?}", start.elapsed());
            let blocks = state
                .blocks
                .par_iter()
                .map(|keys| state.server.inner_product(&cached, keys))
                .collect::<Result<Vec<_>>>()?;
            debug!("{} blocks scored in {:.2?}", blocks.len(), start.elapsed());
            Ok((blocks, state.keys.len()))
        })
    }

    fn query_plain(&self, name: &str, query: &[f64]) -> Result<(Vec<Ciphertext>, usize)> {
        self.with_collection(name, |state| {
            if state.info.is_query_encrypt {
                return Err(validation_err!("collection {:?} expects encrypted queries", name));
            }
            if query.len() != state.info.reduced_dimension() {
                return Err(validation_err!(
                    "query has {} slots, collection expects {}",
                    query.len(),
                    state.info.reduced_dimension()
                ));
            }
            let scale = state.info.scales().query;
            let cached = state
                .server
                .cache_query_plain(&Message::from(query), scale)?;
            let blocks = state
                .blocks
                .par_iter()
                .map(|keys| state.server.inner_product(&cached, keys))
                .collect::<Result<Vec<_>>>()?;
            Ok((blocks, state.keys.len()))
        })
    }

    fn retrieve(&self, name: &str, index: u64) -> Result<Vec<u8>> {
        self.with_collection(name, |state| {
            state
                .payloads
                .get(index as usize)
                .cloned()
                .ok_or_else(|| {
                    validation_err!(
                        "index {} out of range for {} entries",
                        index,
                        state.payloads.len()
                    )
                })
        })
    }

    fn pir_retrieve(&self, name: &str, query: &PirQuery) -> Result<PirResponse> {
        self.with_collection(name, |state| {
            let start = Instant::now();
            let response = pir::respond(query, &state.payload_polys, &state.inv_aut_keys, &self.ring)?;
            debug!("private retrieval over {} entries in {:.2?}", state.payload_polys.len(), start.elapsed());
            Ok(response)
        })
    }
}
