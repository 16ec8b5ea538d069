//! Identifier types
//!
//! Identities are addressed by DID strings. Every other record in the core
//! (audit entries, security flags, correlation groups) uses a UUID newtype.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// DID method prefix for identities minted by this core.
pub const DID_PREFIX: &str = "did:squid:";

/// Decentralized identifier of a node in the identity tree.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdentityId(String);

impl IdentityId {
    /// Mint a fresh `did:squid:<uuid>` identifier.
    pub fn generate() -> Self {
        Self(format!("{DID_PREFIX}{}", Uuid::new_v4()))
    }

    /// Wrap an existing DID string (no validation; collaborators may use other methods).
    pub fn new(did: impl Into<String>) -> Self {
        Self(did.into())
    }

    /// The raw DID string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IdentityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for IdentityId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Generate a new random identifier.
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Build from an existing UUID.
            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// The underlying UUID.
            pub fn uuid(&self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

uuid_id!(
    /// Identifier of one appended audit entry.
    AuditEntryId
);
uuid_id!(
    /// Identifier of a raised security flag.
    SecurityFlagId
);
uuid_id!(
    /// Links every audit entry produced by one logical operation.
    CorrelationId
);
