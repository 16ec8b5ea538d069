//! Signing/encryption provider interfaces
//!
//! The core performs no cryptography itself. Collaborators plug in a sealer
//! for ephemeral payloads and a signer for audit entries.

use crate::errors::HookError;
use crate::identifiers::IdentityId;

/// Encrypts ephemeral payloads on behalf of one identity.
pub trait PayloadSealer: Send + Sync {
    /// Seal `plaintext` for `identity`.
    fn seal(&self, identity: &IdentityId, plaintext: &[u8]) -> Result<Vec<u8>, HookError>;

    /// Open bytes previously sealed for `identity`.
    fn open(&self, identity: &IdentityId, sealed: &[u8]) -> Result<Vec<u8>, HookError>;
}

/// Produces detached signatures over audit entries.
pub trait AuditSigner: Send + Sync {
    /// Sign `message`.
    fn sign(&self, message: &[u8]) -> Result<Vec<u8>, HookError>;

    /// Check a signature produced by [`AuditSigner::sign`].
    fn verify(&self, message: &[u8], signature: &[u8]) -> bool;
}
