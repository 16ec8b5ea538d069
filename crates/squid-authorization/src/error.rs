//! Resolver errors
//!
//! Only capability summaries can fail; single decisions never do.

use squid_core::RegistryError;
use thiserror::Error;

/// Failure computing a capability summary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolverError {
    /// The module registry could not be listed.
    #[error("capability summary unavailable: {0}")]
    Registry(#[from] RegistryError),
}
