//! Signal wire messages exchanged with the binary node codec.

mod sender_key;
mod whisper;

use std::fmt;
use std::str::FromStr;

pub use sender_key::{SenderKeyDistributionMessage, SenderKeyMessage};
pub use whisper::{PreKeyWhisperMessage, WhisperMessage};

use crate::consts::{enc_types, CIPHERTEXT_MESSAGE_CURRENT_VERSION};
use crate::error::{Result, SignalError};

/// Parse the version nibble of a message's first byte.
pub(crate) fn check_version(byte: u8) -> Result<u8> {
    let version = byte >> 4;
    if version < CIPHERTEXT_MESSAGE_CURRENT_VERSION {
        return Err(SignalError::LegacyMessage(version));
    }
    if version > CIPHERTEXT_MESSAGE_CURRENT_VERSION {
        return Err(SignalError::InvalidMessage(format!("unknown message version {version}")));
    }
    Ok(version)
}

/// Encryption type attribute carried next to a ciphertext node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EncType {
    Msg,
    PkMsg,
    SkMsg,
}

impl EncType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EncType::Msg => enc_types::MSG,
            EncType::PkMsg => enc_types::PKMSG,
            EncType::SkMsg => enc_types::SKMSG,
        }
    }
}

impl fmt::Display for EncType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EncType {
    type Err = SignalError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            enc_types::MSG => Ok(EncType::Msg),
            enc_types::PKMSG => Ok(EncType::PkMsg),
            enc_types::SKMSG => Ok(EncType::SkMsg),
            other => Err(SignalError::InvalidMessage(format!("unknown encryption type {other:?}"))),
        }
    }
}

/// Any ciphertext the engine produces or consumes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CiphertextMessage {
    Whisper(WhisperMessage),
    PreKey(PreKeyWhisperMessage),
    SenderKey(SenderKeyMessage),
    SenderKeyDistribution(SenderKeyDistributionMessage),
}

impl CiphertextMessage {
    pub fn serialize(&self) -> &[u8] {
        match self {
            CiphertextMessage::Whisper(m) => m.serialized(),
            CiphertextMessage::PreKey(m) => m.serialized(),
            CiphertextMessage::SenderKey(m) => m.serialized(),
            CiphertextMessage::SenderKeyDistribution(m) => m.serialized(),
        }
    }

    /// The dispatcher tag for this message. Distribution messages travel
    /// inside another encrypted message and have none.
    pub fn enc_type(&self) -> Option<EncType> {
        match self {
            CiphertextMessage::Whisper(_) => Some(EncType::Msg),
            CiphertextMessage::PreKey(_) => Some(EncType::PkMsg),
            CiphertextMessage::SenderKey(_) => Some(EncType::SkMsg),
            CiphertextMessage::SenderKeyDistribution(_) => None,
        }
    }
}
