//! Root, chain and message keys of the double ratchet.

use serde::{Deserialize, Serialize};

use crate::crypto::{derive_key_pair, hkdf_expand, hmac_sha256, KeyPair};
use crate::error::{Result, SignalError};

const MESSAGE_KEY_SEED: [u8; 1] = [0x01];
const CHAIN_KEY_SEED: [u8; 1] = [0x02];

/// Per-message keys derived from one chain step.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageKeys {
    pub cipher_key: [u8; 32],
    pub mac_key: [u8; 32],
    pub iv: [u8; 16],
    pub counter: u32,
}

impl MessageKeys {
    /// Expand a message key seed into cipher key, MAC key and IV.
    pub fn derive(seed: &[u8; 32], counter: u32) -> Result<Self> {
        let derived = hkdf_expand(seed, None, b"WhisperMessageKeys", 80)?;
        let mut keys = Self {
            cipher_key: [0u8; 32],
            mac_key: [0u8; 32],
            iv: [0u8; 16],
            counter,
        };
        keys.cipher_key.copy_from_slice(&derived[..32]);
        keys.mac_key.copy_from_slice(&derived[32..64]);
        keys.iv.copy_from_slice(&derived[64..80]);
        Ok(keys)
    }
}

impl std::fmt::Debug for MessageKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageKeys")
            .field("counter", &self.counter)
            .finish_non_exhaustive()
    }
}

/// Symmetric chain key, ratcheted once per message.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainKey {
    pub key: [u8; 32],
    pub index: u32,
}

impl ChainKey {
    pub fn new(key: [u8; 32], index: u32) -> Self {
        Self { key, index }
    }

    /// The chain key for the following message. Fails once the index is
    /// exhausted.
    pub fn next(&self) -> Result<Self> {
        let index = self
            .index
            .checked_add(1)
            .ok_or_else(|| SignalError::InvalidMessage("chain index overflow".to_string()))?;
        Ok(Self {
            key: hmac_sha256(&self.key, &CHAIN_KEY_SEED),
            index,
        })
    }

    /// Message keys for the current index.
    pub fn message_keys(&self) -> Result<MessageKeys> {
        MessageKeys::derive(&hmac_sha256(&self.key, &MESSAGE_KEY_SEED), self.index)
    }
}

impl std::fmt::Debug for ChainKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChainKey")
            .field("index", &self.index)
            .finish_non_exhaustive()
    }
}

/// Root key, advanced on every DH ratchet step.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RootKey {
    pub key: [u8; 32],
}

impl RootKey {
    pub fn new(key: [u8; 32]) -> Self {
        Self { key }
    }

    /// Mix a fresh DH output into the root, yielding the next root and a new
    /// chain starting at index 0.
    pub fn create_chain(&self, their_ratchet_key: &[u8; 32], our_ratchet_key: &KeyPair) -> Result<(RootKey, ChainKey)> {
        let shared = our_ratchet_key.dh(their_ratchet_key);
        let (root, chain) = derive_key_pair(&shared, Some(&self.key), b"WhisperRatchet")?;
        Ok((RootKey::new(root), ChainKey::new(chain, 0)))
    }
}

impl std::fmt::Debug for RootKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("RootKey([REDACTED])")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chain_key_advances() {
        let chain = ChainKey::new([0x42; 32], 0);
        let next = chain.next().unwrap();

        assert_eq!(next.index, 1);
        assert_ne!(next.key, chain.key);
        assert_eq!(next, chain.next().unwrap());
    }

    #[test]
    fn test_chain_key_stops_at_last_index() {
        let chain = ChainKey::new([0x42; 32], u32::MAX);
        assert!(matches!(chain.next(), Err(SignalError::InvalidMessage(_))));
    }

    #[test]
    fn test_message_keys_differ_per_step() {
        let chain = ChainKey::new([0x42; 32], 7);
        let first = chain.message_keys().unwrap();
        let second = chain.next().unwrap().message_keys().unwrap();

        assert_eq!(first.counter, 7);
        assert_eq!(second.counter, 8);
        assert_ne!(first.cipher_key, second.cipher_key);
        assert_ne!(first.cipher_key, first.mac_key);
    }

    #[test]
    fn test_create_chain_agrees_on_both_sides() {
        let root = RootKey::new([0x11; 32]);
        let alice = KeyPair::generate();
        let bob = KeyPair::generate();

        let (alice_root, alice_chain) = root.create_chain(&bob.public, &alice).unwrap();
        let (bob_root, bob_chain) = root.create_chain(&alice.public, &bob).unwrap();

        assert_eq!(alice_root, bob_root);
        assert_eq!(alice_chain, bob_chain);
        assert_ne!(alice_root, root);
        assert_eq!(alice_chain.index, 0);
    }
}
