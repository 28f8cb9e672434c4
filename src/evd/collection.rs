//! Collection metadata and metric reductions
//!
//! The server only computes inner products. Other metrics are reduced to
//! one on the client before encryption:
//! - COSINE normalizes both sides to unit length
//! - L2 augments `key' = (y, |y|², 1)` and `query' = (2x, -1, -|x|²)`, so
//!   `<query', key'> = -|x - y|²`
//!
//! Every reduced score is "larger is closer".

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{validation_err, EvdError, Result};
use crate::params::ScalePair;

/// Similarity measure of a collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MetricType {
    /// Inner product
    Ip,
    /// Negated squared Euclidean distance
    L2,
    /// Cosine similarity
    Cosine,
}

impl MetricType {
    /// Slots a vector of `dimension` occupies after reduction
    pub fn reduced_dimension(&self, dimension: usize) -> usize {
        match self {
            Self::L2 => dimension + 2,
            Self::Ip | Self::Cosine => dimension,
        }
    }

    /// Query and key scales for the given query mode
    pub fn scales(&self, is_query_encrypt: bool) -> ScalePair {
        let (query, key) = match (self, is_query_encrypt) {
            (Self::Cosine, true) => (26.25, 26.25),
            (_, true) => (22.0, 22.0),
            (Self::Cosine, false) => (20.0, 32.5),
            (_, false) => (16.0, 27.0),
        };
        ScalePair {
            query: 2f64.powf(query),
            key: 2f64.powf(key),
        }
    }

    /// Database vector in inner-product form
    pub fn reduce_key(&self, key: &[f64]) -> Vec<f64> {
        match self {
            Self::Ip => key.to_vec(),
            Self::Cosine => normalized(key),
            Self::L2 => {
                let mut out = key.to_vec();
                out.push(squared_norm(key));
                out.push(1.0);
                out
            }
        }
    }

    /// Query vector in inner-product form
    pub fn reduce_query(&self, query: &[f64]) -> Vec<f64> {
        match self {
            Self::Ip => query.to_vec(),
            Self::Cosine => normalized(query),
            Self::L2 => {
                let mut out: Vec<f64> = query.iter().map(|v| 2.0 * v).collect();
                out.push(-1.0);
                out.push(-squared_norm(query));
                out
            }
        }
    }
}

fn squared_norm(v: &[f64]) -> f64 {
    v.iter().map(|x| x * x).sum()
}

fn normalized(v: &[f64]) -> Vec<f64> {
    let norm = squared_norm(v).sqrt();
    if norm == 0.0 {
        return v.to_vec();
    }
    v.iter().map(|x| x / norm).collect()
}

impl fmt::Display for MetricType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Ip => "IP",
            Self::L2 => "L2",
            Self::Cosine => "COSINE",
        })
    }
}

impl FromStr for MetricType {
    type Err = EvdError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "IP" => Ok(Self::Ip),
            "L2" => Ok(Self::L2),
            "COSINE" => Ok(Self::Cosine),
            other => Err(validation_err!("unknown metric type {:?}", other)),
        }
    }
}

/// Descriptor of a collection, shared by client and server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionInfo {
    /// Server-assigned id
    pub id: u32,
    /// Unique name
    pub name: String,
    /// Dimension of the vectors the application inserts
    pub dimension: usize,
    /// Similarity measure
    pub metric: MetricType,
    /// Queries travel encrypted when set, in plaintext otherwise
    pub is_query_encrypt: bool,
}

impl CollectionInfo {
    /// Query and key scales of this collection
    pub fn scales(&self) -> ScalePair {
        self.metric.scales(self.is_query_encrypt)
    }

    /// Slot count after metric reduction
    pub fn reduced_dimension(&self) -> usize {
        self.metric.reduced_dimension(self.dimension)
    }
}

/// Names are non-empty ASCII alphanumerics, `-` or `_`, at most 128 bytes.
pub fn validate_name(name: &str) -> Result<()> {
    let ok = !name.is_empty()
        && name.len() <= 128
        && name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_');
    if ok {
        Ok(())
    } else {
        Err(validation_err!("invalid collection name {:?}", name))
    }
}
