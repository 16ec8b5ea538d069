//! Crypto provider stand-ins

use chacha20poly1305::aead::{Aead, KeyInit, Payload};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use rand::RngCore;
use squid_core::{AuditSigner, HookError, IdentityId, PayloadSealer};

const NONCE_LEN: usize = 12;

/// ChaCha20-Poly1305 sealer with a random per-instance key; the identity DID is bound as AAD.
pub struct TestSealer {
    cipher: ChaCha20Poly1305,
}

impl TestSealer {
    /// Create a sealer with a fresh random key
    pub fn new() -> Self {
        let mut key = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut key);
        Self {
            cipher: ChaCha20Poly1305::new(Key::from_slice(&key)),
        }
    }
}

impl Default for TestSealer {
    fn default() -> Self {
        Self::new()
    }
}

impl PayloadSealer for TestSealer {
    fn seal(&self, identity: &IdentityId, plaintext: &[u8]) -> Result<Vec<u8>, HookError> {
        let mut nonce = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce);
        let ciphertext = self
            .cipher
            .encrypt(
                Nonce::from_slice(&nonce),
                Payload {
                    msg: plaintext,
                    aad: identity.as_str().as_bytes(),
                },
            )
            .map_err(|_| HookError::rejected("seal failed"))?;
        let mut out = nonce.to_vec();
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }

    fn open(&self, identity: &IdentityId, sealed: &[u8]) -> Result<Vec<u8>, HookError> {
        if sealed.len() < NONCE_LEN {
            return Err(HookError::rejected("sealed payload too short"));
        }
        let (nonce, ciphertext) = sealed.split_at(NONCE_LEN);
        self.cipher
            .decrypt(
                Nonce::from_slice(nonce),
                Payload {
                    msg: ciphertext,
                    aad: identity.as_str().as_bytes(),
                },
            )
            .map_err(|_| HookError::rejected("open failed"))
    }
}

/// Keyed BLAKE3 MAC standing in for an audit signing provider.
pub struct KeyedBlake3Signer {
    key: [u8; 32],
}

impl KeyedBlake3Signer {
    /// Create a signer from a fixed key
    pub fn new(key: [u8; 32]) -> Self {
        Self { key }
    }
}

impl AuditSigner for KeyedBlake3Signer {
    fn sign(&self, message: &[u8]) -> Result<Vec<u8>, HookError> {
        Ok(blake3::keyed_hash(&self.key, message).as_bytes().to_vec())
    }

    fn verify(&self, message: &[u8], signature: &[u8]) -> bool {
        let Ok(bytes) = <[u8; 32]>::try_from(signature) else {
            return false;
        };
        blake3::keyed_hash(&self.key, message) == blake3::Hash::from(bytes)
    }
}
