//! Session state: one epoch of the double ratchet with a remote device.

use serde::{Deserialize, Serialize};

use crate::consts::limits::{MAX_MESSAGE_KEYS, MAX_RECEIVER_CHAINS};
use crate::crypto::KeyPair;
use crate::ratchet::{ChainKey, MessageKeys, RootKey};

/// Our sending chain and the ratchet key pair it was derived with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SenderChain {
    pub ratchet_key: KeyPair,
    pub chain_key: ChainKey,
}

/// A receiving chain for one remote ratchet key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiverChain {
    pub ratchet_key: [u8; 32],
    pub chain_key: ChainKey,
    /// Keys skipped over while walking the chain, oldest first.
    pub message_keys: Vec<MessageKeys>,
}

/// Marker for a session we initiated that the peer has not answered yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingPreKey {
    pub pre_key_id: Option<u32>,
    pub signed_pre_key_id: u32,
    pub base_key: [u8; 32],
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionState {
    version: u8,
    local_identity: [u8; 32],
    remote_identity: [u8; 32],
    root_key: RootKey,
    previous_counter: u32,
    sender_chain: SenderChain,
    receiver_chains: Vec<ReceiverChain>,
    pending_pre_key: Option<PendingPreKey>,
    local_registration_id: u32,
    remote_registration_id: u32,
    alice_base_key: [u8; 32],
    needs_refresh: bool,
}

impl SessionState {
    pub fn new(
        version: u8,
        local_identity: [u8; 32],
        remote_identity: [u8; 32],
        root_key: RootKey,
        sender_chain: SenderChain,
        alice_base_key: [u8; 32],
    ) -> Self {
        Self {
            version,
            local_identity,
            remote_identity,
            root_key,
            previous_counter: 0,
            sender_chain,
            receiver_chains: Vec::new(),
            pending_pre_key: None,
            local_registration_id: 0,
            remote_registration_id: 0,
            alice_base_key,
            needs_refresh: false,
        }
    }

    pub fn session_version(&self) -> u8 {
        self.version
    }

    pub fn local_identity_key(&self) -> &[u8; 32] {
        &self.local_identity
    }

    pub fn remote_identity_key(&self) -> &[u8; 32] {
        &self.remote_identity
    }

    pub fn root_key(&self) -> &RootKey {
        &self.root_key
    }

    pub fn set_root_key(&mut self, root_key: RootKey) {
        self.root_key = root_key;
    }

    pub fn previous_counter(&self) -> u32 {
        self.previous_counter
    }

    pub fn set_previous_counter(&mut self, counter: u32) {
        self.previous_counter = counter;
    }

    pub fn sender_ratchet_key(&self) -> &KeyPair {
        &self.sender_chain.ratchet_key
    }

    pub fn sender_chain_key(&self) -> &ChainKey {
        &self.sender_chain.chain_key
    }

    pub fn set_sender_chain_key(&mut self, chain_key: ChainKey) {
        self.sender_chain.chain_key = chain_key;
    }

    pub fn set_sender_chain(&mut self, ratchet_key: KeyPair, chain_key: ChainKey) {
        self.sender_chain = SenderChain {
            ratchet_key,
            chain_key,
        };
    }

    pub fn receiver_chains(&self) -> &[ReceiverChain] {
        &self.receiver_chains
    }

    fn receiver_chain_mut(&mut self, their_ratchet_key: &[u8; 32]) -> Option<&mut ReceiverChain> {
        self.receiver_chains
            .iter_mut()
            .find(|chain| &chain.ratchet_key == their_ratchet_key)
    }

    pub fn receiver_chain_key(&self, their_ratchet_key: &[u8; 32]) -> Option<&ChainKey> {
        self.receiver_chains
            .iter()
            .find(|chain| &chain.ratchet_key == their_ratchet_key)
            .map(|chain| &chain.chain_key)
    }

    /// Track a new remote ratchet key. The oldest chain is dropped once the
    /// bound is exceeded.
    pub fn add_receiver_chain(&mut self, their_ratchet_key: [u8; 32], chain_key: ChainKey) {
        self.receiver_chains.push(ReceiverChain {
            ratchet_key: their_ratchet_key,
            chain_key,
            message_keys: Vec::new(),
        });
        if self.receiver_chains.len() > MAX_RECEIVER_CHAINS {
            let excess = self.receiver_chains.len() - MAX_RECEIVER_CHAINS;
            self.receiver_chains.drain(..excess);
        }
    }

    pub fn set_receiver_chain_key(&mut self, their_ratchet_key: &[u8; 32], chain_key: ChainKey) -> bool {
        match self.receiver_chain_mut(their_ratchet_key) {
            Some(chain) => {
                chain.chain_key = chain_key;
                true
            }
            None => false,
        }
    }

    /// Take a cached message key so it cannot be used twice.
    pub fn remove_message_keys(&mut self, their_ratchet_key: &[u8; 32], counter: u32) -> Option<MessageKeys> {
        let chain = self.receiver_chain_mut(their_ratchet_key)?;
        let position = chain.message_keys.iter().position(|keys| keys.counter == counter)?;
        Some(chain.message_keys.remove(position))
    }

    pub fn set_message_keys(&mut self, their_ratchet_key: &[u8; 32], keys: MessageKeys) -> bool {
        let Some(chain) = self.receiver_chain_mut(their_ratchet_key) else {
            return false;
        };
        chain.message_keys.push(keys);
        if chain.message_keys.len() > MAX_MESSAGE_KEYS {
            let excess = chain.message_keys.len() - MAX_MESSAGE_KEYS;
            chain.message_keys.drain(..excess);
        }
        true
    }

    pub fn pending_pre_key(&self) -> Option<&PendingPreKey> {
        self.pending_pre_key.as_ref()
    }

    pub fn set_pending_pre_key(&mut self, pre_key_id: Option<u32>, signed_pre_key_id: u32, base_key: [u8; 32]) {
        self.pending_pre_key = Some(PendingPreKey {
            pre_key_id,
            signed_pre_key_id,
            base_key,
        });
    }

    pub fn clear_pending_pre_key(&mut self) {
        self.pending_pre_key = None;
    }

    pub fn local_registration_id(&self) -> u32 {
        self.local_registration_id
    }

    pub fn set_local_registration_id(&mut self, id: u32) {
        self.local_registration_id = id;
    }

    pub fn remote_registration_id(&self) -> u32 {
        self.remote_registration_id
    }

    pub fn set_remote_registration_id(&mut self, id: u32) {
        self.remote_registration_id = id;
    }

    pub fn alice_base_key(&self) -> &[u8; 32] {
        &self.alice_base_key
    }

    /// Set when this state was revived from the archive because the peer
    /// kept using it after we had moved on.
    pub fn needs_refresh(&self) -> bool {
        self.needs_refresh
    }

    pub fn set_needs_refresh(&mut self, needs_refresh: bool) {
        self.needs_refresh = needs_refresh;
    }
}
