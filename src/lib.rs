//! whatsmeow-signal: Signal protocol sessions for a WhatsApp client
//!
//! The double ratchet and sender-key engine behind
//! [whatsmeow](https://github.com/tulir/whatsmeow)-style clients. It turns
//! plaintext into the `msg`/`pkmsg`/`skmsg` payloads carried by the binary
//! node protocol and back.
//!
//! ## Modules
//!
//! - `crypto` - Curve25519, XEdDSA, HKDF/HMAC and AES-CBC primitives
//! - `ratchet` - Root/chain/message keys and initial key agreement
//! - `state` - Session records, sender-key records and bundles
//! - `protocol` - Wire messages
//! - `session` / `group` - 1:1 and group builders and ciphers
//! - `store` - Persistence traits and an in-memory store
//! - `manager` - Per-account facade with padding and cipher caches
//! - `retry` - Decrypt-failure retry state machine

pub mod consts;
pub mod crypto;
pub mod group;
pub mod manager;
pub mod proto;
pub mod protocol;
pub mod ratchet;
pub mod retry;
pub mod session;
pub mod state;
pub mod store;
pub mod types;

mod config;
mod error;

pub use config::{ConfigError, EngineConfig};
pub use error::{Result, SignalError};
pub use manager::SessionManager;
pub use protocol::{CiphertextMessage, EncType};
pub use retry::{DecryptOutcome, IncomingEnvelope, KeyFetcher, RetryInfo, RetryManager};
pub use state::PreKeyBundle;
pub use store::{MemoryStore, SignalStore, StoreError};
pub use types::{Event, ProtocolAddress, SenderKeyName, JID};
