//! Ephemeral item data model

use crate::identifiers::IdentityId;
use crate::time::PhysicalTime;
use serde::{Deserialize, Serialize};

/// Stored payload bytes, sealed by the crypto provider when encryption was requested.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "bytes", rename_all = "snake_case")]
pub enum EphemeralPayload {
    /// Bytes as supplied by the caller
    Plain(Vec<u8>),
    /// Bytes sealed by a [`crate::effects::PayloadSealer`]
    Sealed(Vec<u8>),
}

impl EphemeralPayload {
    /// Stored size in bytes.
    pub fn len(&self) -> usize {
        match self {
            EphemeralPayload::Plain(b) | EphemeralPayload::Sealed(b) => b.len(),
        }
    }

    /// True for an empty payload.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True when the payload is sealed.
    pub fn is_sealed(&self) -> bool {
        matches!(self, EphemeralPayload::Sealed(_))
    }
}

/// Transient value owned by one identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EphemeralItem {
    /// Caller-chosen key, unique per identity
    pub key: String,
    /// Owning identity
    pub identity_id: IdentityId,
    /// Stored bytes
    pub payload: EphemeralPayload,
    /// Creation time
    pub created_at: PhysicalTime,
    /// Never retrievable at or after this instant
    pub expires_at: PhysicalTime,
    /// Destroyed on session loss regardless of TTL
    pub auto_destruct: bool,
}

impl EphemeralItem {
    /// True once `now` reaches `expires_at`.
    pub fn is_expired(&self, now: PhysicalTime) -> bool {
        now >= self.expires_at
    }

    /// Storage key `identityId:key` shared by all durable backends.
    pub fn storage_key(&self) -> String {
        storage_key(&self.identity_id, &self.key)
    }
}

/// Storage key `identityId:key`.
pub fn storage_key(identity_id: &IdentityId, key: &str) -> String {
    format!("{identity_id}:{key}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expiry_is_inclusive() {
        let item = EphemeralItem {
            key: "k".into(),
            identity_id: IdentityId::new("did:squid:a"),
            payload: EphemeralPayload::Plain(vec![1, 2]),
            created_at: PhysicalTime::from_millis(0),
            expires_at: PhysicalTime::from_millis(100),
            auto_destruct: false,
        };
        assert!(!item.is_expired(PhysicalTime::from_millis(99)));
        assert!(item.is_expired(PhysicalTime::from_millis(100)));
        assert_eq!(item.storage_key(), "did:squid:a:k");
        assert_eq!(item.payload.len(), 2);
    }
}
