//! Wire protocol between [`super::EvdClient`] and [`super::EvdService`]
//!
//! Every message is a bincode [`Envelope`] tagged with the protocol version
//! and the ring degree. Receivers reject foreign versions and degrees before
//! looking at the body.

use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::error::{validation_err, ErrorKind, EvdError, Result};
use crate::ks::{AutedModPackKeys, AutedModPackMLWEKeys, InvAutKeys, SwitchingKey};
use crate::pir::{PirQuery, PirResponse};
use crate::rlwe::{Ciphertext, MLWECiphertext};

use super::collection::{CollectionInfo, MetricType};

/// Current wire version
pub const PROTOCOL_VERSION: u16 = 1;

/// Operation codes, one per request kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum OpCode {
    /// Register a collection, optionally uploading keys
    Setup = 0,
    /// Append key ciphertexts and payloads
    Insert = 1,
    /// Score an encrypted query
    Query = 2,
    /// Score a plaintext query
    QueryPlain = 3,
    /// End the session
    Terminate = 4,
    /// Fetch a payload by index
    Retrieve = 5,
    /// Fetch a payload privately
    PirRetrieve = 6,
    /// Remove a collection
    DropCollection = 7,
}

/// Framing of every message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope<T> {
    /// Protocol version of the sender
    pub version: u16,
    /// Ring degree of the sender
    pub degree: u32,
    /// Message body
    pub body: T,
}

/// Public keys uploaded with a collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationKeys {
    /// log2 of the MLWE rank the keys were generated for
    pub log_rank: u32,
    /// s² → s
    pub relin: SwitchingKey,
    /// Mod-pack keys for key ciphertexts
    pub mod_pack: AutedModPackKeys,
    /// Mod-pack keys for queries, component layout
    pub mod_pack_mlwe: AutedModPackMLWEKeys,
    /// PIR expansion keys
    pub inv_aut: InvAutKeys,
    /// Encryption of a fixed marker, handed back on reattach
    pub key_check: Ciphertext,
}

/// Client to server
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Request {
    /// Register or reattach a collection
    Setup {
        /// Collection name
        name: String,
        /// Vector dimension before metric reduction
        dimension: usize,
        /// Similarity measure
        metric: MetricType,
        /// Query mode
        is_query_encrypt: bool,
        /// Keys, present on the second round of a fresh setup
        keys: Option<Box<EvaluationKeys>>,
    },
    /// Remove a collection and all entries
    DropCollection {
        /// Collection name
        name: String,
    },
    /// Append entries
    Insert {
        /// Collection name
        name: String,
        /// Index the payloads were sealed for; must equal the collection size
        first: u64,
        /// One MLWE ciphertext per entry
        keys: Vec<MLWECiphertext>,
        /// One sealed payload block per entry
        payloads: Vec<Vec<u8>>,
    },
    /// Score an encrypted query against every entry
    Query {
        /// Collection name
        name: String,
        /// Encrypted reduced query
        query: MLWECiphertext,
    },
    /// Score a plaintext query against every entry
    QueryPlain {
        /// Collection name
        name: String,
        /// Reduced query slots
        query: Vec<f64>,
    },
    /// Payload by index
    Retrieve {
        /// Collection name
        name: String,
        /// Entry index
        index: u64,
    },
    /// Payload by encrypted selection
    PirRetrieve {
        /// Collection name
        name: String,
        /// Selection ciphertexts
        query: PirQuery,
    },
    /// End of session
    Terminate,
}

impl Request {
    /// Operation code of this request
    pub fn op(&self) -> OpCode {
        match self {
            Self::Setup { .. } => OpCode::Setup,
            Self::DropCollection { .. } => OpCode::DropCollection,
            Self::Insert { .. } => OpCode::Insert,
            Self::Query { .. } => OpCode::Query,
            Self::QueryPlain { .. } => OpCode::QueryPlain,
            Self::Retrieve { .. } => OpCode::Retrieve,
            Self::PirRetrieve { .. } => OpCode::PirRetrieve,
            Self::Terminate => OpCode::Terminate,
        }
    }
}

/// Outcome of a setup request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SetupStatus {
    /// Collection registered with the uploaded keys
    Created(CollectionInfo),
    /// Collection already exists with a matching shape
    Existing {
        /// Stored descriptor
        info: CollectionInfo,
        /// Number of entries
        size: usize,
        /// Key check uploaded at creation
        key_check: Ciphertext,
    },
    /// Collection is new; resend the setup with keys
    NeedsKeys,
    /// Collection exists with another dimension or metric
    Mismatch(CollectionInfo),
}

/// Server to client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Reply {
    /// Setup outcome
    Setup(SetupStatus),
    /// Success without data
    Ack,
    /// Number of entries after an insert
    Inserted {
        /// Collection size
        size: usize,
    },
    /// One score ciphertext per block of entries
    Scores {
        /// Score ciphertexts, coefficient `n` of block `b` for entry `b·N + n`
        blocks: Vec<Ciphertext>,
        /// Collection size
        size: usize,
    },
    /// Sealed payload block as stored
    Payload(Vec<u8>),
    /// Encrypted payload block
    Pir(PirResponse),
    /// Failure with its kind
    Error {
        /// Error class
        kind: ErrorKind,
        /// Description
        message: String,
    },
}

impl From<EvdError> for Reply {
    fn from(err: EvdError) -> Self {
        Self::Error {
            kind: err.kind(),
            message: err.message().to_string(),
        }
    }
}

impl Reply {
    /// Turns an error reply back into an error
    pub fn into_result(self) -> Result<Self> {
        match self {
            Self::Error { kind, message } => Err(EvdError::new(kind, message)),
            other => Ok(other),
        }
    }
}

/// Frames and serializes a message
pub fn encode_message<T: Serialize>(body: &T, degree: usize) -> Result<Vec<u8>> {
    let envelope = Envelope {
        version: PROTOCOL_VERSION,
        degree: degree as u32,
        body,
    };
    Ok(bincode::serialize(&envelope)?)
}

/// Parses a framed message, checking version and degree
pub fn decode_message<T: DeserializeOwned>(bytes: &[u8], degree: usize) -> Result<T> {
    let envelope: Envelope<T> = bincode::deserialize(bytes)?;
    if envelope.version != PROTOCOL_VERSION {
        return Err(validation_err!(
            "unsupported protocol version {} (expected {})",
            envelope.version,
            PROTOCOL_VERSION
        ));
    }
    if envelope.degree as usize != degree {
        return Err(validation_err!(
            "message for ring degree {}, this end runs {}",
            envelope.degree,
            degree
        ));
    }
    Ok(envelope.body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_checks() {
        let request = Request::Retrieve {
            name: "docs".into(),
            index: 3,
        };
        let bytes = encode_message(&request, 256).unwrap();
        match decode_message::<Request>(&bytes, 256).unwrap() {
            Request::Retrieve { name, index } => {
                assert_eq!(name, "docs");
                assert_eq!(index, 3);
            }
            other => panic!("unexpected {:?}", other),
        }

        let err = decode_message::<Request>(&bytes, 4096).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let foreign = bincode::serialize(&Envelope {
            version: 99,
            degree: 256,
            body: Request::Terminate,
        })
        .unwrap();
        let err = decode_message::<Request>(&foreign, 256).unwrap_err();
        assert!(err.message().contains("version"));

        assert!(decode_message::<Request>(&[1, 2, 3], 256).is_err());
    }

    #[test]
    fn test_error_reply_roundtrip() {
        let reply = Reply::from(EvdError::Resource("no such collection".into()));
        let bytes = encode_message(&reply, 256).unwrap();
        let err = decode_message::<Reply>(&bytes, 256)
            .unwrap()
            .into_result()
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Resource);
        assert_eq!(err.message(), "no such collection");
    }

    #[test]
    fn test_op_codes() {
        assert_eq!(OpCode::Setup as u8, 0);
        assert_eq!(OpCode::DropCollection as u8, 7);
        assert_eq!(Request::Terminate.op(), OpCode::Terminate);
    }
}
