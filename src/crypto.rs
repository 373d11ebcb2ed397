//! Phone-number encryption with AES-256-GCM
//!
//! Recipient and customer phone numbers are stored encrypted and only
//! decrypted on read paths that return them to an authorized caller.
//!
//! Format: base64(nonce_12bytes || ciphertext || tag_16bytes)

use aes_gcm::aead::Aead;
use aes_gcm::{Aes256Gcm, KeyInit, Nonce};
use base64::Engine;
use zeroize::Zeroize;

use crate::error::BoxError;

const NONCE_LEN: usize = 12;
const KEY_LEN: usize = 32;

/// Encryption key for stored phone numbers (32 bytes for AES-256-GCM)
#[derive(Clone)]
pub struct PhoneKey {
    key: [u8; KEY_LEN],
}

impl Drop for PhoneKey {
    fn drop(&mut self) {
        self.key.zeroize();
    }
}

impl PhoneKey {
    /// Load the key from its base64 form (env: PHONE_ENC_KEY)
    pub fn from_base64(b64: &str) -> Result<Self, BoxError> {
        let bytes = base64::engine::general_purpose::STANDARD.decode(b64.trim())?;
        if bytes.len() != KEY_LEN {
            return Err(format!(
                "Phone key wrong length: {} (expected {KEY_LEN})",
                bytes.len()
            )
            .into());
        }
        let mut key = [0u8; KEY_LEN];
        key.copy_from_slice(&bytes);
        Ok(Self { key })
    }

    /// Generate a random key (tests and dev bootstrap)
    pub fn generate() -> Self {
        let mut key = [0u8; KEY_LEN];
        rand::RngCore::fill_bytes(&mut rand::thread_rng(), &mut key);
        Self { key }
    }

    /// Encrypt plaintext → base64(nonce || ciphertext || tag)
    pub fn encrypt(&self, plaintext: &str) -> Result<String, &'static str> {
        let cipher = Aes256Gcm::new_from_slice(&self.key).map_err(|_| "Invalid key")?;

        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::RngCore::fill_bytes(&mut rand::thread_rng(), &mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|_| "Encryption failed")?;

        // nonce || ciphertext (includes tag)
        let mut result = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        result.extend_from_slice(&nonce_bytes);
        result.extend_from_slice(&ciphertext);

        Ok(base64::engine::general_purpose::STANDARD.encode(&result))
    }

    /// Decrypt base64(nonce || ciphertext || tag) → plaintext
    pub fn decrypt(&self, encrypted_b64: &str) -> Result<String, &'static str> {
        let data = base64::engine::general_purpose::STANDARD
            .decode(encrypted_b64)
            .map_err(|_| "Invalid base64")?;

        if data.len() < NONCE_LEN + 16 {
            return Err("Ciphertext too short");
        }

        let cipher = Aes256Gcm::new_from_slice(&self.key).map_err(|_| "Invalid key")?;
        let nonce = Nonce::from_slice(&data[..NONCE_LEN]);
        let ciphertext = &data[NONCE_LEN..];

        let plaintext = cipher
            .decrypt(nonce, ciphertext)
            .map_err(|_| "Decryption failed (wrong key or tampered data)")?;

        String::from_utf8(plaintext).map_err(|_| "Decrypted data is not valid UTF-8")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encrypt_decrypt_round_trip() {
        let key = PhoneKey::generate();
        let encrypted = key.encrypt("010-1234-5678").unwrap();
        assert_ne!(encrypted, "010-1234-5678");
        assert_eq!(key.decrypt(&encrypted).unwrap(), "010-1234-5678");
    }

    #[test]
    fn test_nonce_varies_per_encryption() {
        let key = PhoneKey::generate();
        let a = key.encrypt("010-1234-5678").unwrap();
        let b = key.encrypt("010-1234-5678").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_tampered_ciphertext_rejected() {
        let key = PhoneKey::generate();
        let encrypted = key.encrypt("010-1234-5678").unwrap();
        let mut raw = base64::engine::general_purpose::STANDARD
            .decode(&encrypted)
            .unwrap();
        let last = raw.len() - 1;
        raw[last] ^= 0x01;
        let tampered = base64::engine::general_purpose::STANDARD.encode(&raw);
        assert!(key.decrypt(&tampered).is_err());
    }

    #[test]
    fn test_wrong_key_rejected() {
        let encrypted = PhoneKey::generate().encrypt("010-1234-5678").unwrap();
        assert!(PhoneKey::generate().decrypt(&encrypted).is_err());
    }

    #[test]
    fn test_key_length_enforced() {
        let short = base64::engine::general_purpose::STANDARD.encode([0u8; 16]);
        assert!(PhoneKey::from_base64(&short).is_err());
    }
}
