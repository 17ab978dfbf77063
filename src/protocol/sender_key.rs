//! Group messages: SenderKeyMessage and SenderKeyDistributionMessage.
//!
//! ```text
//! SenderKeyMessage:             [version] [protobuf] [64-byte signature]
//! SenderKeyDistributionMessage: [version] [protobuf]
//! ```

use prost::Message;

use crate::consts::{CIPHERTEXT_MESSAGE_CURRENT_VERSION, SIGNATURE_LENGTH};
use crate::crypto::{decode_public_key, serialize_public_key, verify_signature, KeyPair};
use crate::error::{Result, SignalError};
use crate::proto::signal as proto;
use crate::protocol::check_version;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SenderKeyMessage {
    version: u8,
    key_id: u32,
    iteration: u32,
    ciphertext: Vec<u8>,
    serialized: Vec<u8>,
}

impl SenderKeyMessage {
    /// Build and sign a message with the sender chain's signing key.
    pub fn new(key_id: u32, iteration: u32, ciphertext: Vec<u8>, signing_key: &KeyPair) -> Self {
        let version = CIPHERTEXT_MESSAGE_CURRENT_VERSION;
        let body = proto::SenderKeyMessage {
            id: Some(key_id),
            iteration: Some(iteration),
            ciphertext: Some(ciphertext.clone()),
        };

        let mut serialized = Vec::with_capacity(1 + body.encoded_len() + SIGNATURE_LENGTH);
        serialized.push((version << 4) | CIPHERTEXT_MESSAGE_CURRENT_VERSION);
        serialized.extend(body.encode_to_vec());
        let signature = signing_key.calculate_signature(&serialized);
        serialized.extend_from_slice(&signature);

        Self {
            version,
            key_id,
            iteration,
            ciphertext,
            serialized,
        }
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < 1 + SIGNATURE_LENGTH {
            return Err(SignalError::InvalidMessage("sender key message too short".to_string()));
        }
        let version = check_version(bytes[0])?;
        let body = proto::SenderKeyMessage::decode(&bytes[1..bytes.len() - SIGNATURE_LENGTH])?;

        let missing = |field: &str| SignalError::InvalidMessage(format!("sender key message missing {field}"));
        Ok(Self {
            version,
            key_id: body.id.ok_or_else(|| missing("key id"))?,
            iteration: body.iteration.ok_or_else(|| missing("iteration"))?,
            ciphertext: body.ciphertext.ok_or_else(|| missing("ciphertext"))?,
            serialized: bytes.to_vec(),
        })
    }

    pub fn message_version(&self) -> u8 {
        self.version
    }

    pub fn key_id(&self) -> u32 {
        self.key_id
    }

    pub fn iteration(&self) -> u32 {
        self.iteration
    }

    pub fn ciphertext(&self) -> &[u8] {
        &self.ciphertext
    }

    pub fn serialized(&self) -> &[u8] {
        &self.serialized
    }

    pub fn verify_signature(&self, signing_key: &[u8; 32]) -> bool {
        let (content, signature) = self.serialized.split_at(self.serialized.len() - SIGNATURE_LENGTH);
        verify_signature(signing_key, content, signature)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SenderKeyDistributionMessage {
    key_id: u32,
    iteration: u32,
    chain_key: [u8; 32],
    signing_key: [u8; 32],
    serialized: Vec<u8>,
}

impl SenderKeyDistributionMessage {
    pub fn new(key_id: u32, iteration: u32, chain_key: [u8; 32], signing_key: [u8; 32]) -> Self {
        let body = proto::SenderKeyDistributionMessage {
            id: Some(key_id),
            iteration: Some(iteration),
            chain_key: Some(chain_key.to_vec()),
            signing_key: Some(serialize_public_key(&signing_key).to_vec()),
        };

        let mut serialized = Vec::with_capacity(1 + body.encoded_len());
        serialized.push((CIPHERTEXT_MESSAGE_CURRENT_VERSION << 4) | CIPHERTEXT_MESSAGE_CURRENT_VERSION);
        serialized.extend(body.encode_to_vec());

        Self {
            key_id,
            iteration,
            chain_key,
            signing_key,
            serialized,
        }
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Self> {
        let (&first, rest) = bytes
            .split_first()
            .ok_or_else(|| SignalError::InvalidMessage("empty distribution message".to_string()))?;
        check_version(first)?;
        let body = proto::SenderKeyDistributionMessage::decode(rest)?;

        let missing = |field: &str| SignalError::InvalidMessage(format!("distribution message missing {field}"));
        let chain_key = body.chain_key.ok_or_else(|| missing("chain key"))?;
        let chain_key: [u8; 32] = chain_key
            .as_slice()
            .try_into()
            .map_err(|_| SignalError::InvalidKey(format!("bad chain key length {}", chain_key.len())))?;
        let signing_key = body.signing_key.ok_or_else(|| missing("signing key"))?;

        Ok(Self {
            key_id: body.id.ok_or_else(|| missing("key id"))?,
            iteration: body.iteration.ok_or_else(|| missing("iteration"))?,
            chain_key,
            signing_key: decode_public_key(&signing_key)?,
            serialized: bytes.to_vec(),
        })
    }

    pub fn key_id(&self) -> u32 {
        self.key_id
    }

    pub fn iteration(&self) -> u32 {
        self.iteration
    }

    pub fn chain_key(&self) -> &[u8; 32] {
        &self.chain_key
    }

    pub fn signing_key(&self) -> &[u8; 32] {
        &self.signing_key
    }

    pub fn serialized(&self) -> &[u8] {
        &self.serialized
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sender_key_message_signature() {
        let signing = KeyPair::generate();
        let message = SenderKeyMessage::new(7, 3, vec![1, 2, 3, 4], &signing);

        let parsed = SenderKeyMessage::deserialize(message.serialized()).unwrap();
        assert_eq!(parsed.key_id(), 7);
        assert_eq!(parsed.iteration(), 3);
        assert_eq!(parsed.ciphertext(), &[1, 2, 3, 4]);
        assert!(parsed.verify_signature(&signing.public));
        assert!(!parsed.verify_signature(&KeyPair::generate().public));
    }

    #[test]
    fn test_sender_key_message_bit_flip() {
        let signing = KeyPair::generate();
        let mut bytes = SenderKeyMessage::new(7, 3, vec![1, 2, 3, 4], &signing).serialized().to_vec();
        let last = bytes.len() - 1;
        bytes[last] ^= 0x01;

        let parsed = SenderKeyMessage::deserialize(&bytes).unwrap();
        assert!(!parsed.verify_signature(&signing.public));
    }

    #[test]
    fn test_distribution_message() {
        let signing = KeyPair::generate();
        let message = SenderKeyDistributionMessage::new(42, 0, [9; 32], signing.public);
        assert_eq!(message.serialized()[0], 0x33);

        let parsed = SenderKeyDistributionMessage::deserialize(message.serialized()).unwrap();
        assert_eq!(parsed, message);
        assert_eq!(parsed.signing_key(), &signing.public);
    }

    #[test]
    fn test_distribution_message_bad_chain_key() {
        let body = proto::SenderKeyDistributionMessage {
            id: Some(1),
            iteration: Some(0),
            chain_key: Some(vec![1; 16]),
            signing_key: Some(serialize_public_key(&[2; 32]).to_vec()),
        };
        let mut bytes = vec![0x33];
        bytes.extend(body.encode_to_vec());

        assert!(matches!(
            SenderKeyDistributionMessage::deserialize(&bytes),
            Err(SignalError::InvalidKey(_))
        ));
    }
}
