//! AES-256-CBC cipher for Signal message payloads.
//!
//! Whisper and sender-key messages both encrypt with PKCS#7-padded CBC; the
//! integrity check (MAC or signature) lives in the message layer.

use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

/// AES-256-CBC cipher bound to one key and IV.
pub struct Cipher {
    key: [u8; 32],
    iv: [u8; 16],
}

impl Cipher {
    /// Create a new cipher with the given key and IV.
    pub fn new(key: [u8; 32], iv: [u8; 16]) -> Self {
        Self { key, iv }
    }

    /// Encrypt and pad `plaintext`.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, CipherError> {
        let encryptor =
            Aes256CbcEnc::new_from_slices(&self.key, &self.iv).map_err(|_| CipherError::InvalidKey)?;
        Ok(encryptor.encrypt_padded_vec_mut::<Pkcs7>(plaintext))
    }

    /// Decrypt `ciphertext` and strip its padding.
    pub fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, CipherError> {
        if ciphertext.is_empty() || ciphertext.len() % 16 != 0 {
            return Err(CipherError::DecryptionFailed);
        }
        let decryptor =
            Aes256CbcDec::new_from_slices(&self.key, &self.iv).map_err(|_| CipherError::InvalidKey)?;
        decryptor
            .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
            .map_err(|_| CipherError::DecryptionFailed)
    }
}

/// Cipher errors.
#[derive(Debug, Clone, PartialEq)]
pub enum CipherError {
    InvalidKey,
    DecryptionFailed,
}

impl std::fmt::Display for CipherError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CipherError::InvalidKey => write!(f, "invalid key"),
            CipherError::DecryptionFailed => write!(f, "decryption failed"),
        }
    }
}

impl std::error::Error for CipherError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encrypt_decrypt() {
        let cipher = Cipher::new([0xab; 32], [0x01; 16]);

        let plaintext = b"Hello, WhatsApp!";
        let ciphertext = cipher.encrypt(plaintext).unwrap();
        assert_eq!(ciphertext.len(), 32);

        assert_eq!(cipher.decrypt(&ciphertext).unwrap(), plaintext);
    }

    #[test]
    fn test_empty_plaintext_pads_one_block() {
        let cipher = Cipher::new([0x11; 32], [0x22; 16]);
        let ciphertext = cipher.encrypt(b"").unwrap();
        assert_eq!(ciphertext.len(), 16);
        assert!(cipher.decrypt(&ciphertext).unwrap().is_empty());
    }

    #[test]
    fn test_decrypt_wrong_key_fails() {
        let ciphertext = Cipher::new([0xab; 32], [0x01; 16]).encrypt(b"secret").unwrap();

        let result = Cipher::new([0xac; 32], [0x01; 16]).decrypt(&ciphertext);
        // A wrong key almost always breaks the padding; if it happens to
        // parse, the plaintext still differs.
        assert!(result.map(|p| p != b"secret").unwrap_or(true));
    }

    #[test]
    fn test_decrypt_rejects_partial_block() {
        let cipher = Cipher::new([0xab; 32], [0x01; 16]);
        assert_eq!(cipher.decrypt(&[0u8; 15]), Err(CipherError::DecryptionFailed));
        assert_eq!(cipher.decrypt(&[]), Err(CipherError::DecryptionFailed));
    }
}
