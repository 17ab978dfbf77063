//! Account key material: identity, registration id and prekeys.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::consts::MAX_PRE_KEY_ID;
use crate::crypto::KeyPair;

/// The local device whose sessions the engine manages.
#[derive(Debug, Clone, Default)]
pub struct Device {
    /// Signal identity key pair
    pub identity_key: Option<KeyPair>,
    /// Signed pre-key published in our bundle
    pub signed_pre_key: Option<SignedPreKeyRecord>,
    /// Registration ID (14 bits)
    pub registration_id: u32,
    /// Whether the device has been initialized
    pub initialized: bool,
}

impl Device {
    /// Create a new uninitialized device.
    pub fn new() -> Self {
        Self::default()
    }

    /// Initialize device with fresh keys.
    pub fn initialize(&mut self) {
        let identity = KeyPair::generate();
        self.signed_pre_key = Some(SignedPreKeyRecord::generate(1, &identity));
        self.identity_key = Some(identity);
        self.registration_id = rand::random::<u32>() & 0x3FFF; // 14 bits
        self.initialized = true;
    }
}

/// A one-time prekey.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreKeyRecord {
    pub id: u32,
    pub key_pair: KeyPair,
    /// Whether the public half has been uploaded.
    pub sent: bool,
}

impl PreKeyRecord {
    pub fn generate(id: u32) -> Self {
        Self {
            id,
            key_pair: KeyPair::generate(),
            sent: false,
        }
    }
}

/// Generate `count` prekeys with consecutive ids starting at `start_id`.
/// Ids are 24 bits and wrap around to 1.
pub fn generate_pre_keys(start_id: u32, count: u32) -> Vec<PreKeyRecord> {
    let mut id = start_id.clamp(1, MAX_PRE_KEY_ID);
    let mut keys = Vec::with_capacity(count as usize);
    for _ in 0..count {
        keys.push(PreKeyRecord::generate(id));
        id = next_pre_key_id(id);
    }
    keys
}

/// The id following `id`, skipping 0.
pub fn next_pre_key_id(id: u32) -> u32 {
    if id >= MAX_PRE_KEY_ID {
        1
    } else {
        id + 1
    }
}

/// A medium-term prekey signed by the identity key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedPreKeyRecord {
    pub id: u32,
    pub key_pair: KeyPair,
    pub signature: Vec<u8>,
    pub timestamp: DateTime<Utc>,
}

impl SignedPreKeyRecord {
    /// Generate a prekey and sign its serialized public key with `identity`.
    pub fn generate(id: u32, identity: &KeyPair) -> Self {
        let key_pair = KeyPair::generate();
        let signature = identity.sign_public_key(&key_pair.public).to_vec();
        Self {
            id,
            key_pair,
            signature,
            timestamp: Utc::now(),
        }
    }
}
