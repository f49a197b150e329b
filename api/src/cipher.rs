//! AES-256-GCM content cipher. Blobs are `nonce || ciphertext`.

use aes_gcm::aead::Aead;
use aes_gcm::{Aes256Gcm, Key, KeyInit, Nonce};
use beacon_core::error::CrisisError;
use beacon_core::store::ContentCipher;
use rand::RngCore;
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};

const NONCE_LEN: usize = 12;

pub struct AesGcmCipher {
    cipher: Aes256Gcm,
}

impl AesGcmCipher {
    pub fn from_key(key: [u8; 32]) -> Self {
        Self {
            cipher: Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key)),
        }
    }

    /// A 64-character hex string is used as the raw key; anything else is
    /// treated as a passphrase and hashed with SHA-256.
    pub fn from_secret(secret: &str) -> Self {
        let secret = secret.trim();
        if secret.len() == 64 {
            if let Ok(bytes) = hex::decode(secret) {
                let mut key = [0u8; 32];
                key.copy_from_slice(&bytes);
                return Self::from_key(key);
            }
        }
        let digest = Sha256::digest(secret.as_bytes());
        let mut key = [0u8; 32];
        key.copy_from_slice(&digest);
        Self::from_key(key)
    }

    /// Random per-process key. Content written with it cannot be read after a restart.
    pub fn ephemeral() -> Self {
        let mut key = [0u8; 32];
        OsRng.fill_bytes(&mut key);
        Self::from_key(key)
    }
}

impl ContentCipher for AesGcmCipher {
    fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, CrisisError> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);
        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext)
            .map_err(|_| CrisisError::Cipher("encryption failed".to_string()))?;

        let mut blob = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        blob.extend_from_slice(&nonce_bytes);
        blob.extend_from_slice(&ciphertext);
        Ok(blob)
    }

    fn decrypt(&self, blob: &[u8]) -> Result<Vec<u8>, CrisisError> {
        if blob.len() <= NONCE_LEN {
            return Err(CrisisError::Cipher("ciphertext too short".to_string()));
        }
        let (nonce_raw, ciphertext) = blob.split_at(NONCE_LEN);
        self.cipher
            .decrypt(Nonce::from_slice(nonce_raw), ciphertext)
            .map_err(|_| CrisisError::Cipher("decryption failed".to_string()))
    }
}
