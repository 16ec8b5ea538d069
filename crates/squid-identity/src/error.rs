//! Identity store errors

use squid_core::{IdentityId, IdentityStatus, IdentityType, StorageError, TimeError};
use thiserror::Error;

/// Structural violation of the identity tree. The tree is unchanged when one is returned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// Creating the child would exceed the root's maximum depth.
    #[error("depth {requested} exceeds max depth {max_depth} under {parent}")]
    DepthExceeded {
        /// Prospective parent
        parent: IdentityId,
        /// Depth the new node would have
        requested: u8,
        /// Limit declared by the root
        max_depth: u8,
    },

    /// The parent does not allow children of this type.
    #[error("{parent_type} identity cannot create a {requested} child")]
    TypeNotAllowed {
        /// Type of the prospective parent
        parent_type: IdentityType,
        /// Requested child type
        requested: IdentityType,
    },

    /// The parent is not ACTIVE.
    #[error("parent {parent} is {status:?}")]
    ParentInactive {
        /// Prospective parent
        parent: IdentityId,
        /// Its current status
        status: IdentityStatus,
    },

    /// A move would cross into another tree.
    #[error("identity belongs to root {expected}, target belongs to {actual}")]
    RootMismatch {
        /// Root of the moved identity
        expected: IdentityId,
        /// Root of the target parent
        actual: IdentityId,
    },

    /// A ROOT has no parent and cannot be moved.
    #[error("root identity {identity} cannot be reparented")]
    RootImmovable {
        /// The root
        identity: IdentityId,
    },

    /// A move would place an identity beneath itself.
    #[error("moving {identity} would create a cycle")]
    CycleDetected {
        /// Identity being moved
        identity: IdentityId,
    },
}

/// Errors from identity store operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentityError {
    /// Structural violation.
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// Identity does not exist.
    #[error("identity {0} not found")]
    NotFound(IdentityId),

    /// Identity exists but cannot become active.
    #[error("identity {id} is {status:?}")]
    Inactive {
        /// The identity
        id: IdentityId,
        /// Its current status
        status: IdentityStatus,
    },

    /// Identity still has children and cannot be deleted.
    #[error("identity {id} still has {count} children")]
    HasChildren {
        /// The identity
        id: IdentityId,
        /// Number of remaining children
        count: usize,
    },

    /// Repository failure.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Clock failure.
    #[error(transparent)]
    Time(#[from] TimeError),
}

impl IdentityError {
    /// The structural violation, if this is one.
    pub fn as_validation(&self) -> Option<&ValidationError> {
        match self {
            Self::Validation(v) => Some(v),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err: IdentityError = ValidationError::TypeNotAllowed {
            parent_type: IdentityType::Aid,
            requested: IdentityType::Dao,
        }
        .into();
        assert!(err.to_string().contains("aid identity cannot create a dao child"));
        assert!(err.as_validation().is_some());

        let err = IdentityError::NotFound(IdentityId::new("did:squid:x"));
        assert!(err.to_string().contains("did:squid:x"));
        assert!(err.as_validation().is_none());
    }
}
