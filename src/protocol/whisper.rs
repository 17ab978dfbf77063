//! WhisperMessage and PreKeyWhisperMessage envelopes.
//!
//! ```text
//! WhisperMessage:       [version] [protobuf] [8-byte truncated HMAC]
//! PreKeyWhisperMessage: [version] [protobuf carrying a serialized WhisperMessage]
//! ```

use prost::Message;

use crate::consts::{CIPHERTEXT_MESSAGE_CURRENT_VERSION, MAC_LENGTH};
use crate::crypto::{decode_public_key, hmac_sha256, serialize_public_key, verify_truncated_mac};
use crate::error::{Result, SignalError};
use crate::proto::signal as proto;
use crate::protocol::check_version;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WhisperMessage {
    version: u8,
    ratchet_key: [u8; 32],
    counter: u32,
    previous_counter: u32,
    ciphertext: Vec<u8>,
    serialized: Vec<u8>,
}

impl WhisperMessage {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        version: u8,
        mac_key: &[u8; 32],
        ratchet_key: [u8; 32],
        counter: u32,
        previous_counter: u32,
        ciphertext: Vec<u8>,
        sender_identity: &[u8; 32],
        receiver_identity: &[u8; 32],
    ) -> Self {
        let body = proto::WhisperMessage {
            ratchet_key: Some(serialize_public_key(&ratchet_key).to_vec()),
            counter: Some(counter),
            previous_counter: Some(previous_counter),
            ciphertext: Some(ciphertext.clone()),
        };

        let mut serialized = Vec::with_capacity(1 + body.encoded_len() + MAC_LENGTH);
        serialized.push((version << 4) | CIPHERTEXT_MESSAGE_CURRENT_VERSION);
        serialized.extend(body.encode_to_vec());
        let mac = hmac_sha256(mac_key, &mac_input(sender_identity, receiver_identity, &serialized));
        serialized.extend_from_slice(&mac[..MAC_LENGTH]);

        Self {
            version,
            ratchet_key,
            counter,
            previous_counter,
            ciphertext,
            serialized,
        }
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < 1 + MAC_LENGTH {
            return Err(SignalError::InvalidMessage("whisper message too short".to_string()));
        }
        let version = check_version(bytes[0])?;
        let body = proto::WhisperMessage::decode(&bytes[1..bytes.len() - MAC_LENGTH])?;

        let ratchet_key = body
            .ratchet_key
            .ok_or_else(|| SignalError::InvalidMessage("missing ratchet key".to_string()))?;
        let counter = body
            .counter
            .ok_or_else(|| SignalError::InvalidMessage("missing counter".to_string()))?;
        let ciphertext = body
            .ciphertext
            .ok_or_else(|| SignalError::InvalidMessage("missing ciphertext".to_string()))?;

        Ok(Self {
            version,
            ratchet_key: decode_public_key(&ratchet_key)?,
            counter,
            previous_counter: body.previous_counter.unwrap_or(0),
            ciphertext,
            serialized: bytes.to_vec(),
        })
    }

    pub fn message_version(&self) -> u8 {
        self.version
    }

    pub fn sender_ratchet_key(&self) -> &[u8; 32] {
        &self.ratchet_key
    }

    pub fn counter(&self) -> u32 {
        self.counter
    }

    pub fn previous_counter(&self) -> u32 {
        self.previous_counter
    }

    pub fn body(&self) -> &[u8] {
        &self.ciphertext
    }

    pub fn serialized(&self) -> &[u8] {
        &self.serialized
    }

    /// Check the truncated MAC with the keys of the chain this message claims.
    pub fn verify_mac(&self, sender_identity: &[u8; 32], receiver_identity: &[u8; 32], mac_key: &[u8; 32]) -> bool {
        let (content, their_mac) = self.serialized.split_at(self.serialized.len() - MAC_LENGTH);
        verify_truncated_mac(mac_key, &mac_input(sender_identity, receiver_identity, content), their_mac)
    }
}

/// `sender identity || receiver identity || version || protobuf`
fn mac_input(sender_identity: &[u8; 32], receiver_identity: &[u8; 32], content: &[u8]) -> Vec<u8> {
    let mut data = Vec::with_capacity(66 + content.len());
    data.extend_from_slice(&serialize_public_key(sender_identity));
    data.extend_from_slice(&serialize_public_key(receiver_identity));
    data.extend_from_slice(content);
    data
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreKeyWhisperMessage {
    version: u8,
    registration_id: u32,
    pre_key_id: Option<u32>,
    signed_pre_key_id: u32,
    base_key: [u8; 32],
    identity_key: [u8; 32],
    message: WhisperMessage,
    serialized: Vec<u8>,
}

impl PreKeyWhisperMessage {
    pub fn new(
        version: u8,
        registration_id: u32,
        pre_key_id: Option<u32>,
        signed_pre_key_id: u32,
        base_key: [u8; 32],
        identity_key: [u8; 32],
        message: WhisperMessage,
    ) -> Self {
        let body = proto::PreKeyWhisperMessage {
            registration_id: Some(registration_id),
            pre_key_id,
            signed_pre_key_id: Some(signed_pre_key_id),
            base_key: Some(serialize_public_key(&base_key).to_vec()),
            identity_key: Some(serialize_public_key(&identity_key).to_vec()),
            message: Some(message.serialized().to_vec()),
        };

        let mut serialized = Vec::with_capacity(1 + body.encoded_len());
        serialized.push((version << 4) | CIPHERTEXT_MESSAGE_CURRENT_VERSION);
        serialized.extend(body.encode_to_vec());

        Self {
            version,
            registration_id,
            pre_key_id,
            signed_pre_key_id,
            base_key,
            identity_key,
            message,
            serialized,
        }
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Self> {
        let (&first, rest) = bytes
            .split_first()
            .ok_or_else(|| SignalError::InvalidMessage("empty prekey message".to_string()))?;
        let version = check_version(first)?;
        let body = proto::PreKeyWhisperMessage::decode(rest)?;

        let missing = |field: &str| SignalError::InvalidMessage(format!("prekey message missing {field}"));
        let base_key = body.base_key.ok_or_else(|| missing("base key"))?;
        let identity_key = body.identity_key.ok_or_else(|| missing("identity key"))?;
        let message = body.message.ok_or_else(|| missing("message"))?;
        let signed_pre_key_id = body.signed_pre_key_id.ok_or_else(|| missing("signed prekey id"))?;

        Ok(Self {
            version,
            registration_id: body.registration_id.unwrap_or(0),
            pre_key_id: body.pre_key_id,
            signed_pre_key_id,
            base_key: decode_public_key(&base_key)?,
            identity_key: decode_public_key(&identity_key)?,
            message: WhisperMessage::deserialize(&message)?,
            serialized: bytes.to_vec(),
        })
    }

    pub fn message_version(&self) -> u8 {
        self.version
    }

    pub fn registration_id(&self) -> u32 {
        self.registration_id
    }

    pub fn pre_key_id(&self) -> Option<u32> {
        self.pre_key_id
    }

    pub fn signed_pre_key_id(&self) -> u32 {
        self.signed_pre_key_id
    }

    pub fn base_key(&self) -> &[u8; 32] {
        &self.base_key
    }

    pub fn identity_key(&self) -> &[u8; 32] {
        &self.identity_key
    }

    pub fn message(&self) -> &WhisperMessage {
        &self.message
    }

    pub fn serialized(&self) -> &[u8] {
        &self.serialized
    }
}
