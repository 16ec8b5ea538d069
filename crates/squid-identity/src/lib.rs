//! sQuid Identity - identity store and tree
//!
//! Holds the identity tree and the active-identity pointer. Every structural
//! mutation goes through [`IdentityStore`], which enforces:
//!
//! - `depth(child) = depth(parent) + 1`
//! - `depth(identity) <= maxDepth` declared by the root
//! - `type(child)` is in the parent's allowed child types
//! - children can only be created under an ACTIVE parent
//! - `rootId` is shared by an entire subtree
//!
//! Violations are returned as [`ValidationError`] and leave the tree unchanged.

pub mod config;
pub mod error;
pub mod policy;
pub mod repository;
pub mod store;
pub mod tree;

pub use config::IdentityConfig;
pub use error::{IdentityError, ValidationError};
pub use policy::{RootAttributes, SubIdentityAttributes};
pub use repository::{KvIdentityRepository, MemoryIdentityRepository};
pub use store::IdentityStore;
pub use tree::IdentityTree;
