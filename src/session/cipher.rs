//! Encryption and decryption of 1:1 messages.
//!
//! Every decrypt works on a copy of the session state; the copy is written
//! back only once the MAC has verified and the payload decrypted, so a
//! rejected message never moves a chain.

use std::sync::Arc;

use log::{debug, warn};

use crate::consts::limits::MAX_FORWARD_JUMPS;
use crate::crypto::{Cipher, KeyPair};
use crate::error::{Result, SignalError};
use crate::protocol::{CiphertextMessage, PreKeyWhisperMessage, WhisperMessage};
use crate::ratchet::{ChainKey, MessageKeys};
use crate::session::SessionBuilder;
use crate::state::{SessionRecord, SessionState};
use crate::store::SignalStore;
use crate::types::ProtocolAddress;

pub struct SessionCipher<S: SignalStore + ?Sized> {
    store: Arc<S>,
    remote: ProtocolAddress,
    builder: SessionBuilder<S>,
}

impl<S: SignalStore + ?Sized> SessionCipher<S> {
    pub fn new(store: Arc<S>, remote: ProtocolAddress) -> Self {
        let builder = SessionBuilder::new(store.clone(), remote.clone());
        Self { store, remote, builder }
    }

    pub fn remote_address(&self) -> &ProtocolAddress {
        &self.remote
    }

    pub fn builder(&self) -> &SessionBuilder<S> {
        &self.builder
    }

    /// Encrypt with the current sending chain. While the session is still
    /// pending the result is a prekey message.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<CiphertextMessage> {
        let mut record = self
            .store
            .load_session(&self.remote)?
            .ok_or_else(|| SignalError::NoSession(self.remote.to_string()))?;
        let state = record
            .session_state_mut()
            .ok_or_else(|| SignalError::NoSession(self.remote.to_string()))?;

        let remote_identity = *state.remote_identity_key();
        if !self.store.is_trusted_identity(&self.remote, &remote_identity)? {
            return Err(SignalError::UntrustedIdentity(self.remote.to_string()));
        }

        let chain_key = state.sender_chain_key().clone();
        let keys = chain_key.message_keys()?;
        let ciphertext = Cipher::new(keys.cipher_key, keys.iv)
            .encrypt(plaintext)
            .map_err(|e| SignalError::InvalidKey(e.to_string()))?;

        let message = WhisperMessage::new(
            state.session_version(),
            &keys.mac_key,
            state.sender_ratchet_key().public,
            chain_key.index,
            state.previous_counter(),
            ciphertext,
            state.local_identity_key(),
            state.remote_identity_key(),
        );

        let message = match state.pending_pre_key() {
            Some(pending) => CiphertextMessage::PreKey(PreKeyWhisperMessage::new(
                state.session_version(),
                state.local_registration_id(),
                pending.pre_key_id,
                pending.signed_pre_key_id,
                pending.base_key,
                *state.local_identity_key(),
                message,
            )),
            None => CiphertextMessage::Whisper(message),
        };

        state.set_sender_chain_key(chain_key.next()?);

        self.store.save_identity(&self.remote, &remote_identity)?;
        self.store.store_session(&self.remote, &record)?;
        Ok(message)
    }

    /// Decrypt a message sent on an established session.
    pub fn decrypt_message(&self, message: &WhisperMessage) -> Result<Vec<u8>> {
        let mut record = self
            .store
            .load_session(&self.remote)?
            .ok_or_else(|| SignalError::NoSession(self.remote.to_string()))?;

        let plaintext = self.decrypt_with_record(&mut record, message)?;
        self.commit(&record)?;
        Ok(plaintext)
    }

    /// Decrypt a prekey message, establishing the session it announces
    /// first. The one-time prekey it used is removed afterwards.
    pub fn decrypt_pre_key_message(&self, message: &PreKeyWhisperMessage) -> Result<Vec<u8>> {
        let mut record = self
            .store
            .load_session(&self.remote)?
            .unwrap_or_else(SessionRecord::new_fresh);

        let used_pre_key = self.builder.process_pre_key_message(&mut record, message)?;
        let plaintext = self.decrypt_with_record(&mut record, message.message())?;
        self.commit(&record)?;

        if let Some(id) = used_pre_key {
            self.store.remove_pre_key(id)?;
            debug!("Removed consumed one-time prekey {id}");
        }
        Ok(plaintext)
    }

    fn commit(&self, record: &SessionRecord) -> Result<()> {
        let state = record
            .session_state()
            .ok_or_else(|| SignalError::NoSession(self.remote.to_string()))?;
        let remote_identity = state.remote_identity_key();
        if !self.store.is_trusted_identity(&self.remote, remote_identity)? {
            return Err(SignalError::UntrustedIdentity(self.remote.to_string()));
        }
        self.store.save_identity(&self.remote, remote_identity)?;
        self.store.store_session(&self.remote, record)?;
        Ok(())
    }

    /// Try the current state, then each archived state. A state that
    /// decrypts is written back; an archived one is promoted to current.
    fn decrypt_with_record(&self, record: &mut SessionRecord, message: &WhisperMessage) -> Result<Vec<u8>> {
        let mut errors = Vec::new();

        if let Some(current) = record.session_state() {
            let mut state = current.clone();
            match decrypt_with_state(&mut state, message) {
                Ok(plaintext) => {
                    record.set_session_state(state);
                    return Ok(plaintext);
                }
                Err(err @ SignalError::DuplicateMessage { .. }) => return Err(err),
                Err(err) => errors.push(err),
            }
        }

        for index in 0..record.previous_state_count() {
            let Some(previous) = record.previous_state(index) else {
                break;
            };
            let mut state = previous.clone();
            match decrypt_with_state(&mut state, message) {
                Ok(plaintext) => {
                    debug!("Promoting archived session state {index} for {}", self.remote);
                    record.promote_old_session(index, state);
                    return Ok(plaintext);
                }
                Err(err @ SignalError::DuplicateMessage { .. }) => return Err(err),
                Err(err) => errors.push(err),
            }
        }

        if errors.is_empty() {
            return Err(SignalError::NoSession(self.remote.to_string()));
        }
        let reason = errors.iter().map(ToString::to_string).collect::<Vec<_>>().join("; ");
        warn!("No session state for {} decrypted the message: {reason}", self.remote);
        Err(SignalError::NoValidSessions {
            address: self.remote.to_string(),
            reason,
        })
    }
}

fn decrypt_with_state(state: &mut SessionState, message: &WhisperMessage) -> Result<Vec<u8>> {
    if message.message_version() != state.session_version() {
        return Err(SignalError::InvalidMessage(format!(
            "message version {} does not match session version {}",
            message.message_version(),
            state.session_version()
        )));
    }

    let their_ratchet_key = message.sender_ratchet_key();
    let chain_key = get_or_create_chain_key(state, their_ratchet_key)?;
    let keys = get_or_create_message_keys(state, their_ratchet_key, &chain_key, message.counter())?;

    if !message.verify_mac(state.remote_identity_key(), state.local_identity_key(), &keys.mac_key) {
        return Err(SignalError::InvalidMessage("MAC verification failed".to_string()));
    }

    let plaintext = Cipher::new(keys.cipher_key, keys.iv)
        .decrypt(message.body())
        .map_err(|e| SignalError::InvalidMessage(e.to_string()))?;

    state.clear_pending_pre_key();
    Ok(plaintext)
}

/// The receiving chain for `their_ratchet_key`, stepping the DH ratchet when
/// the key is new.
fn get_or_create_chain_key(state: &mut SessionState, their_ratchet_key: &[u8; 32]) -> Result<ChainKey> {
    if let Some(chain_key) = state.receiver_chain_key(their_ratchet_key) {
        return Ok(chain_key.clone());
    }

    let our_ratchet_key = state.sender_ratchet_key().clone();
    let (receiver_root, receiver_chain) = state.root_key().create_chain(their_ratchet_key, &our_ratchet_key)?;

    let our_new_ratchet_key = KeyPair::generate();
    let (sender_root, sender_chain) = receiver_root.create_chain(their_ratchet_key, &our_new_ratchet_key)?;

    let previous_counter = state.sender_chain_key().index.saturating_sub(1);
    state.set_root_key(sender_root);
    state.add_receiver_chain(*their_ratchet_key, receiver_chain.clone());
    state.set_previous_counter(previous_counter);
    state.set_sender_chain(our_new_ratchet_key, sender_chain);

    debug!("Stepped DH ratchet, previous sending chain ended at {previous_counter}");
    Ok(receiver_chain)
}

/// Message keys for `counter`, either from the skipped-key cache or by
/// walking the chain forward and caching every key passed over.
fn get_or_create_message_keys(
    state: &mut SessionState,
    their_ratchet_key: &[u8; 32],
    chain_key: &ChainKey,
    counter: u32,
) -> Result<MessageKeys> {
    if chain_key.index > counter {
        return state
            .remove_message_keys(their_ratchet_key, counter)
            .ok_or(SignalError::DuplicateMessage {
                chain_index: chain_key.index,
                counter,
            });
    }

    if counter - chain_key.index > MAX_FORWARD_JUMPS {
        return Err(SignalError::InvalidMessage(format!(
            "message counter {counter} is too far ahead of chain index {}",
            chain_key.index
        )));
    }

    let mut chain_key = chain_key.clone();
    while chain_key.index < counter {
        state.set_message_keys(their_ratchet_key, chain_key.message_keys()?);
        chain_key = chain_key.next()?;
    }

    let keys = chain_key.message_keys()?;
    state.set_receiver_chain_key(their_ratchet_key, chain_key.next()?);
    Ok(keys)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::PreKeyBundle;
    use crate::store::{IdentityKeyStore, MemoryStore, PreKeyRecord, PreKeyStore, SessionStore, SignedPreKeyStore};

    struct Pair {
        alice: Arc<MemoryStore>,
        bob: Arc<MemoryStore>,
        alice_to_bob: SessionCipher<MemoryStore>,
        bob_to_alice: SessionCipher<MemoryStore>,
    }

    fn pair(with_one_time_pre_key: bool) -> Pair {
        let alice = Arc::new(MemoryStore::new());
        let bob = Arc::new(MemoryStore::new());

        let signed = bob.active_signed_pre_key().unwrap().unwrap();
        let one_time = PreKeyRecord::generate(31);
        bob.store_pre_key(&one_time).unwrap();

        let bundle = PreKeyBundle {
            registration_id: bob.get_local_registration_id().unwrap(),
            device_id: 0,
            pre_key_id: with_one_time_pre_key.then_some(one_time.id),
            pre_key_public: with_one_time_pre_key.then_some(one_time.key_pair.public),
            signed_pre_key_id: signed.id,
            signed_pre_key_public: signed.key_pair.public,
            signed_pre_key_signature: signed.signature,
            identity_key: bob.get_identity_key_pair().unwrap().public,
        };

        let alice_to_bob = SessionCipher::new(alice.clone(), ProtocolAddress::new("bob", 0));
        alice_to_bob.builder().process_bundle(&bundle).unwrap();
        let bob_to_alice = SessionCipher::new(bob.clone(), ProtocolAddress::new("alice", 0));

        Pair {
            alice,
            bob,
            alice_to_bob,
            bob_to_alice,
        }
    }

    fn deliver(cipher: &SessionCipher<MemoryStore>, message: &CiphertextMessage) -> Result<Vec<u8>> {
        match message {
            CiphertextMessage::Whisper(m) => cipher.decrypt_message(&WhisperMessage::deserialize(m.serialized())?),
            CiphertextMessage::PreKey(m) => {
                cipher.decrypt_pre_key_message(&PreKeyWhisperMessage::deserialize(m.serialized())?)
            }
            other => panic!("unexpected message {other:?}"),
        }
    }

    #[test]
    fn test_first_message_is_prekey_message() {
        let pair = pair(true);
        let message = pair.alice_to_bob.encrypt(b"hello").unwrap();
        assert!(matches!(message, CiphertextMessage::PreKey(_)));

        assert_eq!(deliver(&pair.bob_to_alice, &message).unwrap(), b"hello");
        assert!(!pair.bob.contains_pre_key(31).unwrap());
    }

    #[test]
    fn test_reply_clears_pending_pre_key() {
        let pair = pair(false);
        let hello = pair.alice_to_bob.encrypt(b"hello").unwrap();
        deliver(&pair.bob_to_alice, &hello).unwrap();

        let reply = pair.bob_to_alice.encrypt(b"hi").unwrap();
        assert!(matches!(reply, CiphertextMessage::Whisper(_)));
        assert_eq!(deliver(&pair.alice_to_bob, &reply).unwrap(), b"hi");

        let next = pair.alice_to_bob.encrypt(b"how are you").unwrap();
        assert!(matches!(next, CiphertextMessage::Whisper(_)));
        assert_eq!(deliver(&pair.bob_to_alice, &next).unwrap(), b"how are you");
    }

    #[test]
    fn test_redelivered_prekey_message_is_duplicate() {
        let pair = pair(true);
        let hello = pair.alice_to_bob.encrypt(b"hello").unwrap();
        deliver(&pair.bob_to_alice, &hello).unwrap();

        let result = deliver(&pair.bob_to_alice, &hello);
        assert!(matches!(result, Err(SignalError::DuplicateMessage { counter: 0, .. })));
    }

    #[test]
    fn test_missing_one_time_pre_key() {
        let pair = pair(true);
        pair.bob.remove_pre_key(31).unwrap();
        let hello = pair.alice_to_bob.encrypt(b"hello").unwrap();

        assert!(matches!(
            deliver(&pair.bob_to_alice, &hello),
            Err(SignalError::InvalidPreKeyId(31))
        ));
        assert!(!pair.bob.contains_session(&ProtocolAddress::new("alice", 0)).unwrap());
    }

    #[test]
    fn test_tampered_message_leaves_state_untouched() {
        let pair = pair(false);
        let hello = pair.alice_to_bob.encrypt(b"hello").unwrap();
        deliver(&pair.bob_to_alice, &hello).unwrap();
        let reply = pair.bob_to_alice.encrypt(b"hi").unwrap();

        let alice_address = ProtocolAddress::new("bob", 0);
        let before = pair.alice.load_session(&alice_address).unwrap();

        let mut bytes = reply.serialize().to_vec();
        let last = bytes.len() - 1;
        bytes[last] ^= 0x01;
        let result = pair
            .alice_to_bob
            .decrypt_message(&WhisperMessage::deserialize(&bytes).unwrap());

        assert!(matches!(result, Err(SignalError::NoValidSessions { .. })));
        assert_eq!(pair.alice.load_session(&alice_address).unwrap(), before);
        assert_eq!(deliver(&pair.alice_to_bob, &reply).unwrap(), b"hi");
    }

    #[test]
    fn test_no_session() {
        let store = Arc::new(MemoryStore::new());
        let cipher = SessionCipher::new(store, ProtocolAddress::new("nobody", 0));
        assert!(matches!(cipher.encrypt(b"x"), Err(SignalError::NoSession(_))));
    }

    #[test]
    fn test_counter_jump_is_bounded() {
        let pair = pair(false);
        let hello = pair.alice_to_bob.encrypt(b"hello").unwrap();
        deliver(&pair.bob_to_alice, &hello).unwrap();

        let record = pair
            .alice
            .load_session(&ProtocolAddress::new("bob", 0))
            .unwrap()
            .unwrap();
        let mut state = record.session_state().unwrap().clone();
        let chain = state.sender_chain_key().clone();
        let far = ChainKey::new(chain.key, chain.index + MAX_FORWARD_JUMPS + 5);
        state.set_sender_chain_key(far);
        pair.alice
            .store_session(&ProtocolAddress::new("bob", 0), &SessionRecord::from_state(state))
            .unwrap();

        let message = pair.alice_to_bob.encrypt(b"late").unwrap();
        assert!(matches!(
            deliver(&pair.bob_to_alice, &message),
            Err(SignalError::NoValidSessions { .. })
        ));
    }
}
