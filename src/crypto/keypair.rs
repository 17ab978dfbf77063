//! Curve25519 key pairs for the Signal protocol.
//!
//! One key format serves both X25519 agreement and signing: signatures are
//! XEdDSA, computed from the Montgomery private key and verified against the
//! Montgomery public key converted to its Edwards form.

use curve25519_dalek::constants::ED25519_BASEPOINT_TABLE;
use curve25519_dalek::{MontgomeryPoint, Scalar};
use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha512};
use x25519_dalek::{PublicKey, StaticSecret};

use crate::consts::SIGNATURE_LENGTH;
use crate::error::{Result, SignalError};

/// Type byte prefixed to serialized Curve25519 public keys.
pub const DJB_TYPE: u8 = 0x05;

/// Hash1 prefix from the XEdDSA construction (0xFE followed by 31 x 0xFF).
const HASH_1_PREFIX: [u8; 32] = {
    let mut prefix = [0xFFu8; 32];
    prefix[0] = 0xFE;
    prefix
};

/// A Curve25519 key pair for Signal Protocol operations.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyPair {
    /// Public key (32 bytes)
    pub public: [u8; 32],
    /// Private key (32 bytes)
    pub private: [u8; 32],
}

impl KeyPair {
    /// Generate a new random key pair.
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        let mut private = [0u8; 32];
        rng.fill_bytes(&mut private);
        Self::from_private_key(clamp(private))
    }

    /// Create a key pair from an existing private key.
    pub fn from_private_key(private: [u8; 32]) -> Self {
        let secret = StaticSecret::from(private);
        let public = PublicKey::from(&secret);

        Self {
            public: *public.as_bytes(),
            private,
        }
    }

    /// Get the public key as bytes.
    pub fn public_key(&self) -> &[u8; 32] {
        &self.public
    }

    /// Get the private key as bytes.
    pub fn private_key(&self) -> &[u8; 32] {
        &self.private
    }

    /// Public key in its 33-byte wire form.
    pub fn serialized_public(&self) -> [u8; 33] {
        serialize_public_key(&self.public)
    }

    /// Perform X25519 Diffie-Hellman key agreement.
    pub fn dh(&self, their_public: &[u8; 32]) -> [u8; 32] {
        let secret = StaticSecret::from(self.private);
        let their_key = PublicKey::from(*their_public);
        let shared = secret.diffie_hellman(&their_key);
        *shared.as_bytes()
    }

    /// Compute an XEdDSA signature over `message`.
    pub fn calculate_signature(&self, message: &[u8]) -> [u8; SIGNATURE_LENGTH] {
        let mut random = [0u8; 64];
        rand::thread_rng().fill_bytes(&mut random);

        let k = Scalar::from_bytes_mod_order(clamp(self.private));
        let edwards = &k * ED25519_BASEPOINT_TABLE;
        let mut cap_a = edwards.compress().to_bytes();
        let sign_bit = cap_a[31] >> 7;
        cap_a[31] &= 0x7F;
        // The Edwards key must have a zero sign bit, so negate the scalar when needed.
        let a = if sign_bit == 1 { -k } else { k };

        let r = Scalar::from_bytes_mod_order_wide(&sha512(&[
            &HASH_1_PREFIX,
            a.as_bytes(),
            message,
            &random,
        ]));
        let cap_r = (&r * ED25519_BASEPOINT_TABLE).compress();
        let h = Scalar::from_bytes_mod_order_wide(&sha512(&[cap_r.as_bytes(), &cap_a, message]));
        let s = r + h * a;

        let mut signature = [0u8; SIGNATURE_LENGTH];
        signature[..32].copy_from_slice(cap_r.as_bytes());
        signature[32..].copy_from_slice(s.as_bytes());
        signature
    }

    /// Sign another public key in its serialized (0x05-prefixed) form.
    pub fn sign_public_key(&self, key_to_sign: &[u8; 32]) -> [u8; SIGNATURE_LENGTH] {
        self.calculate_signature(&serialize_public_key(key_to_sign))
    }
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair")
            .field("public", &hex::encode(self.public))
            .field("private", &"[REDACTED]")
            .finish()
    }
}

/// Serialize a Curve25519 public key as `0x05 || key`.
pub fn serialize_public_key(key: &[u8; 32]) -> [u8; 33] {
    let mut out = [0u8; 33];
    out[0] = DJB_TYPE;
    out[1..].copy_from_slice(key);
    out
}

/// Decode a 33-byte serialized public key.
pub fn decode_public_key(bytes: &[u8]) -> Result<[u8; 32]> {
    match bytes.split_first() {
        Some((&DJB_TYPE, key)) if key.len() == 32 => {
            let mut out = [0u8; 32];
            out.copy_from_slice(key);
            Ok(out)
        }
        Some((&DJB_TYPE, key)) => Err(SignalError::InvalidKey(format!(
            "bad public key length {}",
            key.len()
        ))),
        Some((kind, _)) => Err(SignalError::InvalidKey(format!("bad key type {kind:#04x}"))),
        None => Err(SignalError::InvalidKey("empty public key".to_string())),
    }
}

/// Verify an XEdDSA signature made by the owner of `public_key`.
pub fn verify_signature(public_key: &[u8; 32], message: &[u8], signature: &[u8]) -> bool {
    let Ok(signature) = <[u8; SIGNATURE_LENGTH]>::try_from(signature) else {
        return false;
    };

    let sign_bit = signature[SIGNATURE_LENGTH - 1] >> 7;
    let mut normalized = signature;
    normalized[SIGNATURE_LENGTH - 1] &= 0x7F;

    let Some(edwards) = MontgomeryPoint(*public_key).to_edwards(sign_bit) else {
        return false;
    };
    let Ok(verifying_key) = VerifyingKey::from_bytes(&edwards.compress().to_bytes()) else {
        return false;
    };
    verifying_key
        .verify(message, &Signature::from_bytes(&normalized))
        .is_ok()
}

fn clamp(mut private: [u8; 32]) -> [u8; 32] {
    private[0] &= 248;
    private[31] &= 127;
    private[31] |= 64;
    private
}

fn sha512(parts: &[&[u8]]) -> [u8; 64] {
    let mut hasher = Sha512::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().into()
}
