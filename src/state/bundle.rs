//! Public key material a device publishes so peers can start sessions.

use serde::{Deserialize, Serialize};

use crate::crypto::{serialize_public_key, verify_signature};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreKeyBundle {
    pub registration_id: u32,
    pub device_id: u32,
    pub pre_key_id: Option<u32>,
    pub pre_key_public: Option<[u8; 32]>,
    pub signed_pre_key_id: u32,
    pub signed_pre_key_public: [u8; 32],
    pub signed_pre_key_signature: Vec<u8>,
    pub identity_key: [u8; 32],
}

impl PreKeyBundle {
    /// Whether the signed prekey carries a valid signature by the identity key.
    pub fn has_valid_signature(&self) -> bool {
        verify_signature(
            &self.identity_key,
            &serialize_public_key(&self.signed_pre_key_public),
            &self.signed_pre_key_signature,
        )
    }
}
