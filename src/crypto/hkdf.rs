//! HKDF (HMAC-based Key Derivation Function) and HMAC-SHA256.
//!
//! Every chain, root and message key in the ratchet is derived here.

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::{Result, SignalError};

type HmacSha256 = Hmac<Sha256>;

/// Output length of one HMAC-SHA256 block.
pub const HASH_OUTPUT_SIZE: usize = 32;

/// Longest output HKDF can produce (255 blocks).
pub const MAX_OUTPUT_LENGTH: usize = 255 * HASH_OUTPUT_SIZE;

/// HKDF-SHA256 key derivation.
pub struct Hkdf {
    prk: [u8; 32],
}

impl Hkdf {
    /// Create a new HKDF instance with the given input key material and salt.
    pub fn new(salt: Option<&[u8]>, ikm: &[u8]) -> Self {
        // HKDF-Extract
        let salt = salt.unwrap_or(&[0u8; HASH_OUTPUT_SIZE]);
        Self {
            prk: hmac_sha256(salt, ikm),
        }
    }

    /// Expand the key to the desired length with optional info.
    pub fn expand(&self, info: &[u8], length: usize) -> Result<Vec<u8>> {
        if length > MAX_OUTPUT_LENGTH {
            return Err(SignalError::KeyDerivation { requested: length });
        }

        let mut output = Vec::with_capacity(length);
        let mut t: Vec<u8> = Vec::new();
        let mut counter = 1u8;

        while output.len() < length {
            let mut mac = new_mac(&self.prk);
            mac.update(&t);
            mac.update(info);
            mac.update(&[counter]);
            t = mac.finalize().into_bytes().to_vec();

            let remaining = length - output.len();
            output.extend_from_slice(&t[..remaining.min(t.len())]);

            counter = counter.wrapping_add(1);
        }

        Ok(output)
    }

    /// Convenience function to extract and expand in one call.
    pub fn derive(salt: Option<&[u8]>, ikm: &[u8], info: &[u8], length: usize) -> Result<Vec<u8>> {
        Self::new(salt, ikm).expand(info, length)
    }
}

/// Extract-and-expand `ikm` into `out_len` bytes.
pub fn hkdf_expand(ikm: &[u8], salt: Option<&[u8]>, info: &[u8], out_len: usize) -> Result<Vec<u8>> {
    Hkdf::derive(salt, ikm, info, out_len)
}

/// Derive two 32-byte keys from one HKDF call.
pub fn derive_key_pair(ikm: &[u8], salt: Option<&[u8]>, info: &[u8]) -> Result<([u8; 32], [u8; 32])> {
    let derived = hkdf_expand(ikm, salt, info, 64)?;
    let mut first = [0u8; 32];
    let mut second = [0u8; 32];
    first.copy_from_slice(&derived[..32]);
    second.copy_from_slice(&derived[32..]);
    Ok((first, second))
}

/// HMAC-SHA256 of `data` under `key`.
pub fn hmac_sha256(key: &[u8], data: &[u8]) -> [u8; 32] {
    let mut mac = new_mac(key);
    mac.update(data);
    mac.finalize().into_bytes().into()
}

/// Check a left-truncated HMAC-SHA256 tag in constant time.
pub fn verify_truncated_mac(key: &[u8], data: &[u8], tag: &[u8]) -> bool {
    if tag.is_empty() {
        return false;
    }
    let mut mac = new_mac(key);
    mac.update(data);
    mac.verify_truncated_left(tag).is_ok()
}

fn new_mac(key: &[u8]) -> HmacSha256 {
    HmacSha256::new_from_slice(key).expect("HMAC can take key of any size")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hkdf_rfc5869_case_1() {
        let ikm = [0x0b; 22];
        let salt: Vec<u8> = (0x00..=0x0c).collect();
        let info: Vec<u8> = (0xf0..=0xf9).collect();

        let output = Hkdf::derive(Some(&salt), &ikm, &info, 42).unwrap();
        assert_eq!(
            hex::encode(output),
            "3cb25f25faacd57a90434f64d0362f2a2d2d0a90cf1a5a4c5db02d56ecc4c5bf34007208d5b887185865"
        );
    }

    #[test]
    fn test_hkdf_no_salt() {
        let output = Hkdf::derive(None, b"input key material", b"info", 32).unwrap();
        assert_eq!(output.len(), 32);
        assert_eq!(output, Hkdf::derive(Some(&[0u8; 32]), b"input key material", b"info", 32).unwrap());
    }

    #[test]
    fn test_hkdf_output_limit() {
        assert_eq!(hkdf_expand(b"ikm", None, b"", MAX_OUTPUT_LENGTH).unwrap().len(), MAX_OUTPUT_LENGTH);
        assert!(matches!(
            hkdf_expand(b"ikm", None, b"", MAX_OUTPUT_LENGTH + 1),
            Err(SignalError::KeyDerivation { requested }) if requested == MAX_OUTPUT_LENGTH + 1
        ));
    }

    #[test]
    fn test_derive_key_pair() {
        let (first, second) = derive_key_pair(&[0xab; 32], Some(&[0xcd; 32]), b"WhisperRatchet").unwrap();
        assert_ne!(first, [0u8; 32]);
        assert_ne!(first, second);
    }

    #[test]
    fn test_verify_truncated_mac() {
        let full = hmac_sha256(b"key", b"data");
        assert!(verify_truncated_mac(b"key", b"data", &full[..8]));
        assert!(!verify_truncated_mac(b"key", b"datA", &full[..8]));
        assert!(!verify_truncated_mac(b"key", b"data", &[]));
    }

    #[test]
    fn test_hmac_sha256_rfc4231_case_2() {
        let mac = hmac_sha256(b"Jefe", b"what do ya want for nothing?");
        assert_eq!(
            hex::encode(mac),
            "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
    }
}
