//! Per-account facade over the session and group ciphers.
//!
//! Ciphers are built lazily on first use and cached for the manager's
//! lifetime. The cache locks only guard the maps; cryptographic work runs
//! outside them. Callers must still serialize work for a single peer, since
//! ratchet steps do not commute.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use log::{debug, info};
use rand::Rng;

use crate::config::EngineConfig;
use crate::error::{Result, SignalError};
use crate::group::{GroupCipher, GroupSessionBuilder};
use crate::protocol::{
    CiphertextMessage, EncType, PreKeyWhisperMessage, SenderKeyDistributionMessage, SenderKeyMessage,
    WhisperMessage,
};
use crate::state::PreKeyBundle;
use crate::store::{generate_pre_keys, PreKeyRecord, SignalStore, StoreError};
use crate::session::SessionCipher;
use crate::types::{ProtocolAddress, SenderKeyName, JID};

pub struct SessionManager<S: SignalStore + ?Sized> {
    store: Arc<S>,
    config: EngineConfig,
    session_ciphers: RwLock<HashMap<ProtocolAddress, Arc<SessionCipher<S>>>>,
    group_ciphers: RwLock<HashMap<SenderKeyName, Arc<GroupCipher<S>>>>,
}

impl<S: SignalStore + ?Sized> SessionManager<S> {
    pub fn new(store: Arc<S>, config: EngineConfig) -> Self {
        Self {
            store,
            config,
            session_ciphers: RwLock::new(HashMap::new()),
            group_ciphers: RwLock::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The cached cipher for `address`, created on first use.
    pub fn session_cipher(&self, address: &ProtocolAddress) -> Result<Arc<SessionCipher<S>>> {
        {
            let ciphers = self
                .session_ciphers
                .read()
                .map_err(|_| SignalError::LockPoisoned("session ciphers"))?;
            if let Some(cipher) = ciphers.get(address) {
                return Ok(cipher.clone());
            }
        }

        let mut ciphers = self
            .session_ciphers
            .write()
            .map_err(|_| SignalError::LockPoisoned("session ciphers"))?;
        let cipher = ciphers.entry(address.clone()).or_insert_with(|| {
            debug!("Creating session cipher for {address}");
            Arc::new(SessionCipher::new(self.store.clone(), address.clone()))
        });
        Ok(cipher.clone())
    }

    /// The cached group cipher for `name`, created on first use.
    pub fn group_cipher(&self, name: &SenderKeyName) -> Result<Arc<GroupCipher<S>>> {
        {
            let ciphers = self
                .group_ciphers
                .read()
                .map_err(|_| SignalError::LockPoisoned("group ciphers"))?;
            if let Some(cipher) = ciphers.get(name) {
                return Ok(cipher.clone());
            }
        }

        let mut ciphers = self
            .group_ciphers
            .write()
            .map_err(|_| SignalError::LockPoisoned("group ciphers"))?;
        let cipher = ciphers.entry(name.clone()).or_insert_with(|| {
            debug!("Creating group cipher for {name}");
            Arc::new(GroupCipher::new(self.store.clone(), name.clone()))
        });
        Ok(cipher.clone())
    }

    /// Encrypt `data` for a peer, or for a group when `is_group` is set. Group
    /// messages are sent on our own chain, so `participant` must be our JID.
    pub fn encrypt(
        &self,
        to: &JID,
        data: &[u8],
        is_group: bool,
        participant: Option<&JID>,
    ) -> Result<CiphertextMessage> {
        let plaintext = if self.config.pad_messages {
            pad_message(data)
        } else {
            data.to_vec()
        };

        if is_group {
            let name = group_sender(to, participant)?;
            let message = self.group_cipher(&name)?.encrypt(&plaintext)?;
            return Ok(CiphertextMessage::SenderKey(message));
        }

        self.session_cipher(&ProtocolAddress::from(to))?.encrypt(&plaintext)
    }

    /// Decrypt an inbound payload, dispatching on its encryption type. For
    /// messages in a group chat `participant` is the sending device.
    pub fn decrypt(&self, from: &JID, participant: Option<&JID>, data: &[u8], enc_type: EncType) -> Result<Vec<u8>> {
        let plaintext = match enc_type {
            EncType::Msg => {
                let message = WhisperMessage::deserialize(data)?;
                let address = ProtocolAddress::from(participant.unwrap_or(from));
                self.session_cipher(&address)?.decrypt_message(&message)?
            }
            EncType::PkMsg => {
                let message = PreKeyWhisperMessage::deserialize(data)?;
                let address = ProtocolAddress::from(participant.unwrap_or(from));
                self.session_cipher(&address)?.decrypt_pre_key_message(&message)?
            }
            EncType::SkMsg => {
                let message = SenderKeyMessage::deserialize(data)?;
                let name = group_sender(from, participant)?;
                self.group_cipher(&name)?.decrypt(&message)?
            }
        };

        if self.config.pad_messages {
            Ok(unpad_message(plaintext))
        } else {
            Ok(plaintext)
        }
    }

    /// Build a session with `id` from its published bundle.
    pub fn create_session(&self, id: &JID, bundle: &PreKeyBundle) -> Result<()> {
        self.session_cipher(&ProtocolAddress::from(id))?
            .builder()
            .process_bundle(bundle)
    }

    /// Start a new sending chain in `group` for our device `participant`.
    pub fn create_group_session(&self, group: &JID, participant: &JID) -> Result<SenderKeyDistributionMessage> {
        let name = SenderKeyName::new(group.to_string(), ProtocolAddress::from(participant));
        GroupSessionBuilder::new(self.store.clone()).create(&name)
    }

    /// Store the sending chain `participant` announced for `group`.
    pub fn process_group_session(&self, group: &JID, participant: &JID, distribution: &[u8]) -> Result<()> {
        let message = SenderKeyDistributionMessage::deserialize(distribution)?;
        let name = SenderKeyName::new(group.to_string(), ProtocolAddress::from(participant));
        GroupSessionBuilder::new(self.store.clone()).process(&name, &message)
    }

    pub fn contains_session(&self, id: &JID) -> Result<bool> {
        Ok(self.store.contains_session(&ProtocolAddress::from(id))?)
    }

    /// Whether the current session with `id` was revived from the archive.
    /// Fetching a fresh bundle and calling [`Self::create_session`] clears it.
    pub fn session_needs_refresh(&self, id: &JID) -> Result<bool> {
        let record = self.store.load_session(&ProtocolAddress::from(id))?;
        Ok(record
            .as_ref()
            .and_then(|record| record.session_state())
            .is_some_and(|state| state.needs_refresh()))
    }

    /// Delete the stored session with `id` and drop its cached cipher.
    pub fn delete_session(&self, id: &JID) -> Result<()> {
        let address = ProtocolAddress::from(id);
        self.store.delete_session(&address)?;
        self.session_ciphers
            .write()
            .map_err(|_| SignalError::LockPoisoned("session ciphers"))?
            .remove(&address);
        debug!("Deleted session with {address}");
        Ok(())
    }

    pub fn has_unsent_pre_keys(&self) -> Result<bool> {
        Ok(!self.store.unsent_pre_keys()?.is_empty())
    }

    /// Top up one-time prekeys when fewer than the low-water mark are left
    /// unsent, then return every unsent prekey for upload.
    pub fn generate_pre_keys(&self) -> Result<Vec<PreKeyRecord>> {
        let unsent = self.store.unsent_pre_keys()?;
        if unsent.len() >= self.config.pre_key_low_water_mark as usize {
            return Ok(unsent);
        }

        let start_id = self.store.next_pre_key_id()?;
        let generated = generate_pre_keys(start_id, self.config.pre_key_batch_size);
        for record in &generated {
            self.store.store_pre_key(record)?;
        }
        info!(
            "Generated {} prekeys starting at id {start_id} ({} were unsent)",
            generated.len(),
            unsent.len()
        );
        Ok(self.store.unsent_pre_keys()?)
    }

    pub fn mark_pre_keys_sent(&self, ids: &[u32]) -> Result<()> {
        Ok(self.store.mark_pre_keys_sent(ids)?)
    }

    /// Our public bundle with one freshly generated one-time prekey. The
    /// prekey is stored as sent since it leaves with the bundle.
    pub fn local_pre_key_bundle(&self) -> Result<PreKeyBundle> {
        let identity = self.store.get_identity_key_pair()?;
        let signed_pre_key = self.store.active_signed_pre_key()?.ok_or(StoreError::NotFound)?;

        let mut pre_key = PreKeyRecord::generate(self.store.next_pre_key_id()?);
        pre_key.sent = true;
        self.store.store_pre_key(&pre_key)?;

        Ok(PreKeyBundle {
            registration_id: self.store.get_local_registration_id()?,
            device_id: 0,
            pre_key_id: Some(pre_key.id),
            pre_key_public: Some(pre_key.key_pair.public),
            signed_pre_key_id: signed_pre_key.id,
            signed_pre_key_public: signed_pre_key.key_pair.public,
            signed_pre_key_signature: signed_pre_key.signature,
            identity_key: identity.public,
        })
    }
}

fn group_sender(group: &JID, participant: Option<&JID>) -> Result<SenderKeyName> {
    let participant = participant
        .ok_or_else(|| SignalError::InvalidMessage(format!("group message in {group} without participant")))?;
    Ok(SenderKeyName::new(group.to_string(), ProtocolAddress::from(participant)))
}

/// Append 1-15 bytes, each equal to the padding length.
pub fn pad_message(data: &[u8]) -> Vec<u8> {
    let pad = rand::thread_rng().gen_range(1..=15u8);
    let mut padded = Vec::with_capacity(data.len() + pad as usize);
    padded.extend_from_slice(data);
    padded.resize(data.len() + pad as usize, pad);
    padded
}

/// Strip valid padding. Anything that does not look like padding is
/// returned unchanged.
pub fn unpad_message(mut data: Vec<u8>) -> Vec<u8> {
    let Some(&pad) = data.last() else {
        return data;
    };
    let pad_len = pad as usize;
    if pad == 0 || pad_len > data.len() {
        return data;
    }
    if data[data.len() - pad_len..].iter().all(|&byte| byte == pad) {
        data.truncate(data.len() - pad_len);
    }
    data
}
