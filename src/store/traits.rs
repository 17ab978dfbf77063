//! Store traits for Signal protocol persistence.
//!
//! The session engine only talks to these traits; a relational backend can
//! implement them the same way [`MemoryStore`](crate::store::MemoryStore) does.

use thiserror::Error;

use crate::crypto::KeyPair;
use crate::state::{SenderKeyRecord, SessionRecord};
use crate::store::{PreKeyRecord, SignedPreKeyRecord};
use crate::types::{ProtocolAddress, SenderKeyName};

/// Error type for store operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("not found")]
    NotFound,
    #[error("database error: {0}")]
    DatabaseError(String),
    #[error("serialization error: {0}")]
    SerializationError(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Our own identity and the identities of the devices we talk to.
pub trait IdentityKeyStore: Send + Sync {
    /// The account's long-term identity key pair.
    fn get_identity_key_pair(&self) -> StoreResult<KeyPair>;

    /// The account's registration id.
    fn get_local_registration_id(&self) -> StoreResult<u32>;

    /// Remember `identity` for `address`. Returns true when a different key
    /// was stored before.
    fn save_identity(&self, address: &ProtocolAddress, identity: &[u8; 32]) -> StoreResult<bool>;

    /// Whether `identity` may be used for `address`.
    fn is_trusted_identity(&self, address: &ProtocolAddress, identity: &[u8; 32]) -> StoreResult<bool>;

    fn get_identity(&self, address: &ProtocolAddress) -> StoreResult<Option<[u8; 32]>>;
}

/// Session store for 1:1 session records.
pub trait SessionStore: Send + Sync {
    fn load_session(&self, address: &ProtocolAddress) -> StoreResult<Option<SessionRecord>>;

    fn store_session(&self, address: &ProtocolAddress, record: &SessionRecord) -> StoreResult<()>;

    fn contains_session(&self, address: &ProtocolAddress) -> StoreResult<bool>;

    fn delete_session(&self, address: &ProtocolAddress) -> StoreResult<()>;
}

/// One-time prekeys, with the sent/unsent bookkeeping used for uploads.
pub trait PreKeyStore: Send + Sync {
    fn load_pre_key(&self, id: u32) -> StoreResult<Option<PreKeyRecord>>;

    fn store_pre_key(&self, record: &PreKeyRecord) -> StoreResult<()>;

    fn contains_pre_key(&self, id: u32) -> StoreResult<bool>;

    fn remove_pre_key(&self, id: u32) -> StoreResult<()>;

    /// Prekeys not yet uploaded to the server, ordered by id.
    fn unsent_pre_keys(&self) -> StoreResult<Vec<PreKeyRecord>>;

    fn mark_pre_keys_sent(&self, ids: &[u32]) -> StoreResult<()>;

    /// The id the next generated prekey should use.
    fn next_pre_key_id(&self) -> StoreResult<u32>;
}

pub trait SignedPreKeyStore: Send + Sync {
    fn load_signed_pre_key(&self, id: u32) -> StoreResult<Option<SignedPreKeyRecord>>;

    fn store_signed_pre_key(&self, record: &SignedPreKeyRecord) -> StoreResult<()>;

    /// The signed prekey currently published in our bundle.
    fn active_signed_pre_key(&self) -> StoreResult<Option<SignedPreKeyRecord>>;
}

/// Sender key store for group messaging.
pub trait SenderKeyStore: Send + Sync {
    fn load_sender_key(&self, name: &SenderKeyName) -> StoreResult<Option<SenderKeyRecord>>;

    fn store_sender_key(&self, name: &SenderKeyName, record: &SenderKeyRecord) -> StoreResult<()>;
}

/// Combined store interface the session engine is built over.
pub trait SignalStore: IdentityKeyStore + SessionStore + PreKeyStore + SignedPreKeyStore + SenderKeyStore {}

// Blanket implementation for any type that implements all store traits
impl<T> SignalStore for T where
    T: IdentityKeyStore + SessionStore + PreKeyStore + SignedPreKeyStore + SenderKeyStore + ?Sized
{
}
