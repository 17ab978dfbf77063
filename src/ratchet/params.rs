//! Initial key agreement for both sides of a new session.

use crate::consts::CIPHERTEXT_MESSAGE_CURRENT_VERSION;
use crate::crypto::{derive_key_pair, KeyPair};
use crate::error::Result;
use crate::ratchet::{ChainKey, RootKey};
use crate::state::{SenderChain, SessionState};

/// Domain separation prefix for the initial shared secret.
const DISCONTINUITY_BYTES: [u8; 32] = [0xFF; 32];

/// Key material held by the initiator.
pub struct AliceParameters<'a> {
    pub our_identity_key: &'a KeyPair,
    pub our_base_key: &'a KeyPair,
    pub their_identity_key: &'a [u8; 32],
    pub their_signed_pre_key: &'a [u8; 32],
    pub their_one_time_pre_key: Option<&'a [u8; 32]>,
    pub their_ratchet_key: &'a [u8; 32],
}

/// Key material held by the responder.
pub struct BobParameters<'a> {
    pub our_identity_key: &'a KeyPair,
    pub our_signed_pre_key: &'a KeyPair,
    pub our_one_time_pre_key: Option<&'a KeyPair>,
    pub our_ratchet_key: &'a KeyPair,
    pub their_identity_key: &'a [u8; 32],
    pub their_base_key: &'a [u8; 32],
}

fn derive_keys(secrets: &[u8]) -> Result<(RootKey, ChainKey)> {
    let (root, chain) = derive_key_pair(secrets, None, b"WhisperText")?;
    Ok((RootKey::new(root), ChainKey::new(chain, 0)))
}

/// Build the initiator's first session state.
pub fn initialize_alice_session(params: &AliceParameters<'_>) -> Result<SessionState> {
    let mut secrets = Vec::with_capacity(32 * 5);
    secrets.extend_from_slice(&DISCONTINUITY_BYTES);
    secrets.extend_from_slice(&params.our_identity_key.dh(params.their_signed_pre_key));
    secrets.extend_from_slice(&params.our_base_key.dh(params.their_identity_key));
    secrets.extend_from_slice(&params.our_base_key.dh(params.their_signed_pre_key));
    if let Some(one_time) = params.their_one_time_pre_key {
        secrets.extend_from_slice(&params.our_base_key.dh(one_time));
    }

    let (root_key, chain_key) = derive_keys(&secrets)?;

    let sending_ratchet_key = KeyPair::generate();
    let (sending_root, sending_chain) = root_key.create_chain(params.their_ratchet_key, &sending_ratchet_key)?;

    let mut state = SessionState::new(
        CIPHERTEXT_MESSAGE_CURRENT_VERSION,
        params.our_identity_key.public,
        *params.their_identity_key,
        sending_root,
        SenderChain {
            ratchet_key: sending_ratchet_key,
            chain_key: sending_chain,
        },
        params.our_base_key.public,
    );
    state.add_receiver_chain(*params.their_ratchet_key, chain_key);

    Ok(state)
}

/// Build the responder's first session state.
pub fn initialize_bob_session(params: &BobParameters<'_>) -> Result<SessionState> {
    let mut secrets = Vec::with_capacity(32 * 5);
    secrets.extend_from_slice(&DISCONTINUITY_BYTES);
    secrets.extend_from_slice(&params.our_signed_pre_key.dh(params.their_identity_key));
    secrets.extend_from_slice(&params.our_identity_key.dh(params.their_base_key));
    secrets.extend_from_slice(&params.our_signed_pre_key.dh(params.their_base_key));
    if let Some(one_time) = params.our_one_time_pre_key {
        secrets.extend_from_slice(&one_time.dh(params.their_base_key));
    }

    let (root_key, chain_key) = derive_keys(&secrets)?;

    Ok(SessionState::new(
        CIPHERTEXT_MESSAGE_CURRENT_VERSION,
        params.our_identity_key.public,
        *params.their_identity_key,
        root_key,
        SenderChain {
            ratchet_key: params.our_ratchet_key.clone(),
            chain_key,
        },
        *params.their_base_key,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn agree(with_one_time: bool) -> (SessionState, SessionState) {
        let alice_identity = KeyPair::generate();
        let alice_base = KeyPair::generate();
        let bob_identity = KeyPair::generate();
        let bob_signed = KeyPair::generate();
        let bob_one_time = KeyPair::generate();

        let alice = initialize_alice_session(&AliceParameters {
            our_identity_key: &alice_identity,
            our_base_key: &alice_base,
            their_identity_key: &bob_identity.public,
            their_signed_pre_key: &bob_signed.public,
            their_one_time_pre_key: with_one_time.then_some(&bob_one_time.public),
            their_ratchet_key: &bob_signed.public,
        })
        .unwrap();

        let bob = initialize_bob_session(&BobParameters {
            our_identity_key: &bob_identity,
            our_signed_pre_key: &bob_signed,
            our_one_time_pre_key: with_one_time.then_some(&bob_one_time),
            our_ratchet_key: &bob_signed,
            their_identity_key: &alice_identity.public,
            their_base_key: &alice_base.public,
        })
        .unwrap();

        (alice, bob)
    }

    #[test]
    fn test_initial_chains_match() {
        for with_one_time in [true, false] {
            let (alice, bob) = agree(with_one_time);
            let bob_ratchet = bob.sender_ratchet_key().public;

            assert_eq!(alice.receiver_chain_key(&bob_ratchet), Some(bob.sender_chain_key()));
            assert_eq!(alice.alice_base_key(), bob.alice_base_key());
            assert_eq!(alice.remote_identity_key(), bob.local_identity_key());
        }
    }

    #[test]
    fn test_alice_sending_chain_matches_bob_ratchet() {
        let (alice, bob) = agree(true);
        let alice_ratchet = alice.sender_ratchet_key().public;

        let (root, chain) = bob
            .root_key()
            .create_chain(&alice_ratchet, bob.sender_ratchet_key())
            .unwrap();
        assert_eq!(&root, alice.root_key());
        assert_eq!(&chain, alice.sender_chain_key());
    }
}
