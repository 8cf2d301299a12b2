//! Error types for the CipherCraft library

use thiserror::Error;

pub type Result<T> = std::result::Result<T, HomomorphicError>;

#[derive(Error, Debug)]
pub enum HomomorphicError {
    #[error("Invalid key parameter: {0}")]
    KeyParamInvalid(String),

    #[error("Plaintext out of range: {value} not in [0, {bound})")]
    PlaintextOutOfRange { value: String, bound: String },

    #[error("Malformed ciphertext: {0}")]
    CiphertextMalformed(String),

    #[error("Protocol mismatch: {0}")]
    ProtocolMismatch(String),

    #[error("Peer closed the channel mid-protocol")]
    TransportClosed,

    #[error("Unsupported combination: {0}")]
    UnsupportedCombination(String),

    #[error("Internal invariant violated: {0}")]
    InternalInvariant(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
