//! Cryptographic primitives for the Signal protocol.
//!
//! This module provides:
//! - Curve25519 key pairs, X25519 agreement and XEdDSA signatures
//! - HKDF-SHA256 and HMAC-SHA256
//! - AES-256-CBC payload encryption

mod keypair;
mod hkdf;
mod cipher;

pub use keypair::{
    decode_public_key, serialize_public_key, verify_signature, KeyPair, DJB_TYPE,
};
pub use hkdf::{
    derive_key_pair, hkdf_expand, hmac_sha256, verify_truncated_mac, Hkdf, MAX_OUTPUT_LENGTH,
};
pub use cipher::{Cipher, CipherError};
