//! sQuid Ephemeral - TTL-bound storage with session-loss cleanup
//!
//! [`EphemeralStore`] holds per-identity items that expire after a TTL and,
//! when marked auto-destruct, are destroyed as soon as the session is lost
//! (logout, page unload, prolonged visibility loss). Listeners subscribe to
//! [`EphemeralEvent`]s; [`spawn_sweeper`] evicts expired items periodically.

pub mod config;
pub mod error;
pub mod events;
pub mod repository;
pub mod store;
pub mod sweeper;

pub use config::EphemeralConfig;
pub use error::EphemeralError;
pub use events::{CleanupTrigger, EphemeralEvent, LifecycleSignal};
pub use repository::{KvEphemeralRepository, MemoryEphemeralRepository};
pub use store::{should_use_ephemeral_storage, EphemeralStore, StorageStats, StoreOptions};
pub use sweeper::{spawn_sweeper, SweeperHandle};
