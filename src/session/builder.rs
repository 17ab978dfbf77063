//! Session establishment from a fetched bundle or an inbound prekey message.

use std::sync::Arc;

use log::debug;

use crate::crypto::KeyPair;
use crate::error::{Result, SignalError};
use crate::protocol::PreKeyWhisperMessage;
use crate::ratchet::{initialize_alice_session, initialize_bob_session, AliceParameters, BobParameters};
use crate::state::{PreKeyBundle, SessionRecord};
use crate::store::SignalStore;
use crate::types::ProtocolAddress;

/// Builds sessions with one remote device.
pub struct SessionBuilder<S: SignalStore + ?Sized> {
    store: Arc<S>,
    remote: ProtocolAddress,
}

impl<S: SignalStore + ?Sized> SessionBuilder<S> {
    pub fn new(store: Arc<S>, remote: ProtocolAddress) -> Self {
        Self { store, remote }
    }

    pub fn remote_address(&self) -> &ProtocolAddress {
        &self.remote
    }

    /// Start a session from the remote device's published bundle.
    ///
    /// The new state becomes current and is marked pending, so outgoing
    /// messages are sent as prekey messages until the peer answers. Nothing
    /// is persisted when the bundle fails verification.
    pub fn process_bundle(&self, bundle: &PreKeyBundle) -> Result<()> {
        if !bundle.has_valid_signature() {
            return Err(SignalError::UntrustedIdentity(format!(
                "{}: invalid signed prekey signature",
                self.remote
            )));
        }
        if !self.store.is_trusted_identity(&self.remote, &bundle.identity_key)? {
            return Err(SignalError::UntrustedIdentity(self.remote.to_string()));
        }

        let one_time_pre_key = match (bundle.pre_key_id, bundle.pre_key_public.as_ref()) {
            (Some(id), Some(key)) => Some((id, key)),
            (None, None) => None,
            _ => return Err(SignalError::InvalidKey("bundle prekey id and key must come together".to_string())),
        };

        let our_identity = self.store.get_identity_key_pair()?;
        let base_key = KeyPair::generate();

        let mut state = initialize_alice_session(&AliceParameters {
            our_identity_key: &our_identity,
            our_base_key: &base_key,
            their_identity_key: &bundle.identity_key,
            their_signed_pre_key: &bundle.signed_pre_key_public,
            their_one_time_pre_key: one_time_pre_key.map(|(_, key)| key),
            their_ratchet_key: &bundle.signed_pre_key_public,
        })?;
        state.set_pending_pre_key(
            one_time_pre_key.map(|(id, _)| id),
            bundle.signed_pre_key_id,
            base_key.public,
        );
        state.set_local_registration_id(self.store.get_local_registration_id()?);
        state.set_remote_registration_id(bundle.registration_id);

        let mut record = self
            .store
            .load_session(&self.remote)?
            .unwrap_or_else(SessionRecord::new_fresh);
        record.promote_state(state);

        self.store.save_identity(&self.remote, &bundle.identity_key)?;
        self.store.store_session(&self.remote, &record)?;

        debug!(
            "Created session with {} from bundle (signed prekey {}, one-time prekey {:?})",
            self.remote, bundle.signed_pre_key_id, bundle.pre_key_id
        );
        Ok(())
    }

    /// Install the responder state for an inbound prekey message into
    /// `record`. Returns the one-time prekey the message consumed, if any.
    ///
    /// A message whose base key already has a state in the record is a
    /// re-delivery and leaves the record untouched.
    pub(crate) fn process_pre_key_message(
        &self,
        record: &mut SessionRecord,
        message: &PreKeyWhisperMessage,
    ) -> Result<Option<u32>> {
        if !self.store.is_trusted_identity(&self.remote, message.identity_key())? {
            return Err(SignalError::UntrustedIdentity(self.remote.to_string()));
        }

        if record.has_session_state(message.message_version(), message.base_key()) {
            debug!("Prekey message from {} matches an existing session state", self.remote);
            return Ok(None);
        }

        let signed_pre_key = self
            .store
            .load_signed_pre_key(message.signed_pre_key_id())?
            .ok_or(SignalError::InvalidSignedPreKeyId(message.signed_pre_key_id()))?;
        let one_time_pre_key = match message.pre_key_id() {
            Some(id) => Some(self.store.load_pre_key(id)?.ok_or(SignalError::InvalidPreKeyId(id))?),
            None => None,
        };

        let our_identity = self.store.get_identity_key_pair()?;
        let mut state = initialize_bob_session(&BobParameters {
            our_identity_key: &our_identity,
            our_signed_pre_key: &signed_pre_key.key_pair,
            our_one_time_pre_key: one_time_pre_key.as_ref().map(|record| &record.key_pair),
            our_ratchet_key: &signed_pre_key.key_pair,
            their_identity_key: message.identity_key(),
            their_base_key: message.base_key(),
        })?;
        state.set_local_registration_id(self.store.get_local_registration_id()?);
        state.set_remote_registration_id(message.registration_id());
        record.promote_state(state);

        debug!(
            "Created session with {} from prekey message (signed prekey {}, one-time prekey {:?})",
            self.remote,
            message.signed_pre_key_id(),
            message.pre_key_id()
        );
        Ok(message.pre_key_id())
    }
}
