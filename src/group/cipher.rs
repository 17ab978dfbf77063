//! Group encryption with sender keys: hash ratchet only, signed per message.

use std::sync::Arc;

use log::debug;

use crate::consts::limits::MAX_FORWARD_JUMPS;
use crate::crypto::Cipher;
use crate::error::{Result, SignalError};
use crate::protocol::SenderKeyMessage;
use crate::state::{SenderKeyState, SenderMessageKey};
use crate::store::SignalStore;
use crate::types::SenderKeyName;

pub struct GroupCipher<S: SignalStore + ?Sized> {
    store: Arc<S>,
    name: SenderKeyName,
}

impl<S: SignalStore + ?Sized> GroupCipher<S> {
    pub fn new(store: Arc<S>, name: SenderKeyName) -> Self {
        Self { store, name }
    }

    pub fn sender_key_name(&self) -> &SenderKeyName {
        &self.name
    }

    /// Encrypt on our newest chain and sign the result.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<SenderKeyMessage> {
        let mut record = self
            .store
            .load_sender_key(&self.name)?
            .ok_or_else(|| SignalError::NoSenderKey(self.name.to_string()))?;
        let state = record
            .sender_key_state_mut()
            .ok_or_else(|| SignalError::NoSenderKey(self.name.to_string()))?;

        let signing_key = state
            .signing_key()
            .private_key()
            .ok_or_else(|| SignalError::InvalidKey(format!("{}: no private signing key", self.name)))?
            .clone();

        let chain_key = state.chain_key().clone();
        let message_key = chain_key.message_key()?;
        let ciphertext = Cipher::new(message_key.cipher_key, message_key.iv)
            .encrypt(plaintext)
            .map_err(|e| SignalError::InvalidKey(e.to_string()))?;

        let message = SenderKeyMessage::new(state.key_id(), message_key.iteration, ciphertext, &signing_key);
        state.set_chain_key(chain_key.next()?);

        self.store.store_sender_key(&self.name, &record)?;
        Ok(message)
    }

    /// Verify and decrypt a group message. The stored chain only moves when
    /// both the signature and the payload check out.
    pub fn decrypt(&self, message: &SenderKeyMessage) -> Result<Vec<u8>> {
        let mut record = self
            .store
            .load_sender_key(&self.name)?
            .ok_or_else(|| SignalError::NoSenderKey(self.name.to_string()))?;
        let mut state = record
            .sender_key_state_by_id(message.key_id())
            .cloned()
            .ok_or_else(|| SignalError::NoSenderKey(format!("{} key id {}", self.name, message.key_id())))?;

        if !message.verify_signature(state.signing_key().public_key()) {
            return Err(SignalError::InvalidMessage("signature verification failed".to_string()));
        }

        let message_key = sender_message_key(&mut state, message.iteration())?;
        let plaintext = Cipher::new(message_key.cipher_key, message_key.iv)
            .decrypt(message.ciphertext())
            .map_err(|e| SignalError::InvalidMessage(e.to_string()))?;

        if let Some(slot) = record.sender_key_state_by_id_mut(message.key_id()) {
            *slot = state;
        }
        self.store.store_sender_key(&self.name, &record)?;
        Ok(plaintext)
    }
}

fn sender_message_key(state: &mut SenderKeyState, iteration: u32) -> Result<SenderMessageKey> {
    let chain_key = state.chain_key().clone();

    if chain_key.iteration > iteration {
        return state.remove_message_key(iteration).ok_or(SignalError::DuplicateMessage {
            chain_index: chain_key.iteration,
            counter: iteration,
        });
    }

    if iteration - chain_key.iteration > MAX_FORWARD_JUMPS {
        return Err(SignalError::InvalidMessage(format!(
            "sender key iteration {iteration} is too far ahead of {}",
            chain_key.iteration
        )));
    }

    let mut chain_key = chain_key;
    if chain_key.iteration < iteration {
        debug!("Fast-forwarding sender chain from {} to {iteration}", chain_key.iteration);
    }
    while chain_key.iteration < iteration {
        state.add_message_key(chain_key.message_key()?);
        chain_key = chain_key.next()?;
    }

    state.set_chain_key(chain_key.next()?);
    chain_key.message_key()
}
