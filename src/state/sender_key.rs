//! Sender-key state for group messaging.
//!
//! Each group sender owns a hash-only ratchet; receivers hold a copy of the
//! chain plus the sender's signing public key.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::consts::limits::{MAX_MESSAGE_KEYS, MAX_SENDER_KEY_STATES};
use crate::crypto::{hkdf_expand, hmac_sha256, KeyPair};
use crate::error::{Result, SignalError};
use crate::store::{StoreError, StoreResult};

const MESSAGE_KEY_SEED: [u8; 1] = [0x01];
const CHAIN_KEY_SEED: [u8; 1] = [0x02];

/// Keys for one group message.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SenderMessageKey {
    pub iteration: u32,
    pub iv: [u8; 16],
    pub cipher_key: [u8; 32],
}

impl SenderMessageKey {
    pub fn derive(iteration: u32, seed: &[u8; 32]) -> Result<Self> {
        let derived = hkdf_expand(seed, None, b"WhisperGroup", 48)?;
        let mut key = Self {
            iteration,
            iv: [0u8; 16],
            cipher_key: [0u8; 32],
        };
        key.iv.copy_from_slice(&derived[..16]);
        key.cipher_key.copy_from_slice(&derived[16..48]);
        Ok(key)
    }
}

impl std::fmt::Debug for SenderMessageKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SenderMessageKey")
            .field("iteration", &self.iteration)
            .finish_non_exhaustive()
    }
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SenderChainKey {
    pub iteration: u32,
    pub seed: [u8; 32],
}

impl SenderChainKey {
    pub fn new(iteration: u32, seed: [u8; 32]) -> Self {
        Self { iteration, seed }
    }

    pub fn message_key(&self) -> Result<SenderMessageKey> {
        SenderMessageKey::derive(self.iteration, &hmac_sha256(&self.seed, &MESSAGE_KEY_SEED))
    }

    /// The chain key for the following iteration. Fails once the iteration
    /// counter is exhausted.
    pub fn next(&self) -> Result<Self> {
        let iteration = self
            .iteration
            .checked_add(1)
            .ok_or_else(|| SignalError::InvalidMessage("sender chain iteration overflow".to_string()))?;
        Ok(Self {
            iteration,
            seed: hmac_sha256(&self.seed, &CHAIN_KEY_SEED),
        })
    }
}

impl std::fmt::Debug for SenderChainKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SenderChainKey")
            .field("iteration", &self.iteration)
            .finish_non_exhaustive()
    }
}

/// Signing key of a sender chain. Only the owner holds the private half.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SigningKey {
    Public([u8; 32]),
    Private(KeyPair),
}

impl SigningKey {
    pub fn public_key(&self) -> &[u8; 32] {
        match self {
            SigningKey::Public(key) => key,
            SigningKey::Private(pair) => &pair.public,
        }
    }

    pub fn private_key(&self) -> Option<&KeyPair> {
        match self {
            SigningKey::Public(_) => None,
            SigningKey::Private(pair) => Some(pair),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SenderKeyState {
    key_id: u32,
    chain_key: SenderChainKey,
    signing_key: SigningKey,
    message_keys: Vec<SenderMessageKey>,
}

impl SenderKeyState {
    pub fn new(key_id: u32, chain_key: SenderChainKey, signing_key: SigningKey) -> Self {
        Self {
            key_id,
            chain_key,
            signing_key,
            message_keys: Vec::new(),
        }
    }

    pub fn key_id(&self) -> u32 {
        self.key_id
    }

    pub fn chain_key(&self) -> &SenderChainKey {
        &self.chain_key
    }

    pub fn set_chain_key(&mut self, chain_key: SenderChainKey) {
        self.chain_key = chain_key;
    }

    pub fn signing_key(&self) -> &SigningKey {
        &self.signing_key
    }

    pub fn add_message_key(&mut self, key: SenderMessageKey) {
        self.message_keys.push(key);
        if self.message_keys.len() > MAX_MESSAGE_KEYS {
            let excess = self.message_keys.len() - MAX_MESSAGE_KEYS;
            self.message_keys.drain(..excess);
        }
    }

    pub fn remove_message_key(&mut self, iteration: u32) -> Option<SenderMessageKey> {
        let position = self.message_keys.iter().position(|key| key.iteration == iteration)?;
        Some(self.message_keys.remove(position))
    }
}

/// All retained chains of one group sender, newest first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SenderKeyRecord {
    states: VecDeque<SenderKeyState>,
}

impl SenderKeyRecord {
    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    /// The newest state.
    pub fn sender_key_state(&self) -> Option<&SenderKeyState> {
        self.states.front()
    }

    pub fn sender_key_state_mut(&mut self) -> Option<&mut SenderKeyState> {
        self.states.front_mut()
    }

    pub fn sender_key_state_by_id(&self, key_id: u32) -> Option<&SenderKeyState> {
        self.states.iter().find(|state| state.key_id == key_id)
    }

    pub fn sender_key_state_by_id_mut(&mut self, key_id: u32) -> Option<&mut SenderKeyState> {
        self.states.iter_mut().find(|state| state.key_id == key_id)
    }

    /// Prepend a state. A state with the same key id is replaced; the oldest
    /// state is dropped once the bound is exceeded.
    pub fn add_sender_key_state(&mut self, state: SenderKeyState) {
        self.states.retain(|existing| existing.key_id != state.key_id);
        self.states.push_front(state);
        self.states.truncate(MAX_SENDER_KEY_STATES);
    }

    pub fn serialize(&self) -> StoreResult<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| StoreError::SerializationError(e.to_string()))
    }

    pub fn deserialize(bytes: &[u8]) -> StoreResult<Self> {
        serde_json::from_slice(bytes).map_err(|e| StoreError::SerializationError(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(key_id: u32) -> SenderKeyState {
        SenderKeyState::new(
            key_id,
            SenderChainKey::new(0, [key_id as u8; 32]),
            SigningKey::Public([9; 32]),
        )
    }

    #[test]
    fn test_sender_chain_key_ratchets() {
        let chain = SenderChainKey::new(0, [1; 32]);
        let next = chain.next().unwrap();

        assert_eq!(next.iteration, 1);
        assert_ne!(next.seed, chain.seed);
        assert_ne!(
            chain.message_key().unwrap().cipher_key,
            next.message_key().unwrap().cipher_key
        );
    }

    #[test]
    fn test_sender_chain_key_stops_at_last_iteration() {
        let chain = SenderChainKey::new(u32::MAX, [1; 32]);
        assert!(matches!(chain.next(), Err(SignalError::InvalidMessage(_))));
        assert_eq!(chain.message_key().unwrap().iteration, u32::MAX);
    }

    #[test]
    fn test_record_keeps_newest_first_and_bounded() {
        let mut record = SenderKeyRecord::default();
        for id in 0..(MAX_SENDER_KEY_STATES as u32 + 2) {
            record.add_sender_key_state(state(id));
        }

        assert_eq!(record.len(), MAX_SENDER_KEY_STATES);
        assert_eq!(record.sender_key_state().unwrap().key_id(), MAX_SENDER_KEY_STATES as u32 + 1);
        assert!(record.sender_key_state_by_id(0).is_none());
        assert!(record.sender_key_state_by_id(2).is_some());
    }

    #[test]
    fn test_same_key_id_replaces() {
        let mut record = SenderKeyRecord::default();
        record.add_sender_key_state(state(1));
        record.add_sender_key_state(state(1));
        assert_eq!(record.len(), 1);
    }

    #[test]
    fn test_message_key_consumed_once() {
        let mut state = state(1);
        let chain = state.chain_key().clone();
        state.add_message_key(chain.message_key().unwrap());

        assert!(state.remove_message_key(0).is_some());
        assert!(state.remove_message_key(0).is_none());
    }

    #[test]
    fn test_skipped_keys_evict_oldest_first() {
        let mut state = state(1);
        let mut chain = state.chain_key().clone();
        for _ in 0..(MAX_MESSAGE_KEYS + 3) {
            state.add_message_key(chain.message_key().unwrap());
            chain = chain.next().unwrap();
        }

        assert!(state.remove_message_key(2).is_none());
        assert!(state.remove_message_key(3).is_some());
        assert!(state.remove_message_key(MAX_MESSAGE_KEYS as u32 + 2).is_some());
        assert!(state.remove_message_key(MAX_MESSAGE_KEYS as u32 + 3).is_none());
    }
}
