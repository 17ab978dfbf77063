//! Error types for the Signal session engine.

use thiserror::Error;

use crate::store::StoreError;

/// Errors produced while building sessions, encrypting or decrypting.
#[derive(Debug, Error)]
pub enum SignalError {
    #[error("key derivation failed: requested {requested} bytes exceeds the HKDF limit")]
    KeyDerivation { requested: usize },
    #[error("invalid key: {0}")]
    InvalidKey(String),
    #[error("untrusted identity for {0}")]
    UntrustedIdentity(String),
    #[error("no session for {0}")]
    NoSession(String),
    #[error("no valid sessions for {address}: {reason}")]
    NoValidSessions { address: String, reason: String },
    #[error("invalid message: {0}")]
    InvalidMessage(String),
    #[error("duplicate message: chain is at index {chain_index}, message counter {counter}")]
    DuplicateMessage { chain_index: u32, counter: u32 },
    #[error("legacy message with unsupported version {0}")]
    LegacyMessage(u8),
    #[error("invalid prekey id {0}")]
    InvalidPreKeyId(u32),
    #[error("invalid signed prekey id {0}")]
    InvalidSignedPreKeyId(u32),
    #[error("no sender key state for {0}")]
    NoSenderKey(String),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("lock poisoned: {0}")]
    LockPoisoned(&'static str),
}

impl SignalError {
    /// Whether the error is a decryption failure the retry machine handles
    /// locally. Store and lock failures are surfaced to the caller instead.
    pub fn is_decrypt_failure(&self) -> bool {
        !matches!(self, SignalError::Store(_) | SignalError::LockPoisoned(_))
    }
}

impl From<prost::DecodeError> for SignalError {
    fn from(err: prost::DecodeError) -> Self {
        SignalError::InvalidMessage(format!("malformed protobuf: {err}"))
    }
}

pub type Result<T> = std::result::Result<T, SignalError>;
