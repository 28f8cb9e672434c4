//! Error handling for the EVD engine
//!
//! A single `EvdError` type is shared by the cryptographic core, the
//! collection service and the transports. Each variant carries a kind that
//! survives the wire, so a remote failure is reported with the same kind the
//! server raised.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Broad class of an [`EvdError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Malformed input: wrong dimension, bad index, corrupt encoding, duplicate name.
    Validation,
    /// Ring element or key used in the wrong domain, degree or rank.
    CryptoState,
    /// Transport failure or a closed session.
    Network,
    /// Collection absent or already dropped.
    Resource,
}

/// EVD operation error
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EvdError {
    /// See [`ErrorKind::Validation`].
    Validation(String),
    /// See [`ErrorKind::CryptoState`].
    CryptoState(String),
    /// See [`ErrorKind::Network`].
    Network(String),
    /// See [`ErrorKind::Resource`].
    Resource(String),
}

impl EvdError {
    /// Builds an error of the given kind.
    pub fn new(kind: ErrorKind, msg: impl Into<String>) -> Self {
        let msg = msg.into();
        match kind {
            ErrorKind::Validation => Self::Validation(msg),
            ErrorKind::CryptoState => Self::CryptoState(msg),
            ErrorKind::Network => Self::Network(msg),
            ErrorKind::Resource => Self::Resource(msg),
        }
    }

    /// The class of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::CryptoState(_) => ErrorKind::CryptoState,
            Self::Network(_) => ErrorKind::Network,
            Self::Resource(_) => ErrorKind::Resource,
        }
    }

    /// The human readable message without the kind prefix.
    pub fn message(&self) -> &str {
        match self {
            Self::Validation(m) | Self::CryptoState(m) | Self::Network(m) | Self::Resource(m) => m,
        }
    }
}

impl fmt::Display for EvdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Validation(m) => write!(f, "validation error: {}", m),
            Self::CryptoState(m) => write!(f, "crypto state error: {}", m),
            Self::Network(m) => write!(f, "network error: {}", m),
            Self::Resource(m) => write!(f, "resource error: {}", m),
        }
    }
}

impl std::error::Error for EvdError {}

impl From<std::io::Error> for EvdError {
    fn from(err: std::io::Error) -> Self {
        Self::Resource(err.to_string())
    }
}

impl From<bincode::Error> for EvdError {
    fn from(err: bincode::Error) -> Self {
        Self::Validation(format!("malformed encoding: {}", err))
    }
}

impl From<serde_json::Error> for EvdError {
    fn from(err: serde_json::Error) -> Self {
        Self::Validation(format!("malformed json: {}", err))
    }
}

/// Result type for EVD operations
pub type Result<T> = std::result::Result<T, EvdError>;

macro_rules! validation_err {
    ($($arg:tt)*) => {
        $crate::error::EvdError::Validation(format!($($arg)*))
    };
}

macro_rules! crypto_err {
    ($($arg:tt)*) => {
        $crate::error::EvdError::CryptoState(format!($($arg)*))
    };
}

macro_rules! network_err {
    ($($arg:tt)*) => {
        $crate::error::EvdError::Network(format!($($arg)*))
    };
}

macro_rules! resource_err {
    ($($arg:tt)*) => {
        $crate::error::EvdError::Resource(format!($($arg)*))
    };
}

pub(crate) use crypto_err;
pub(crate) use network_err;
pub(crate) use resource_err;
pub(crate) use validation_err;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_roundtrip() {
        for kind in [
            ErrorKind::Validation,
            ErrorKind::CryptoState,
            ErrorKind::Network,
            ErrorKind::Resource,
        ] {
            let err = EvdError::new(kind, "boom");
            assert_eq!(err.kind(), kind);
            assert_eq!(err.message(), "boom");
        }
    }

    #[test]
    fn test_macros_format() {
        let err = validation_err!("dimension {} != {}", 3, 4);
        assert_eq!(err, EvdError::Validation("dimension 3 != 4".to_string()));
        assert!(err.to_string().starts_with("validation error"));
    }

    #[test]
    fn test_bincode_error_is_validation() {
        let bad: std::result::Result<u64, bincode::Error> = bincode::deserialize(&[1, 2]);
        let err: EvdError = bad.unwrap_err().into();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }
}
