//! Typed storage dispatcher for Stow.
//!
//! A [`Storage`] routes generic operations to one backend per entity type,
//! created lazily by a [`BackendFactory`] the first time the type is used.
//! It counts reads and writes, can stamp writes with a [`LogicalClock`], and
//! exposes change notification for backends that declare a [`SyncSource`].

pub mod clock;
pub mod config;
pub mod error;
pub mod memory;
pub mod range;
pub mod registry;
pub mod storage;
pub mod sync;
pub mod traits;
pub mod watch;

pub use clock::LogicalClock;
pub use config::StorageConfig;
pub use error::{StoreError, StoreResult};
pub use memory::{MemoryBackend, MemoryBackendFactory};
pub use range::{Paged, DEFAULT_BATCH_SIZE};
pub use registry::BackendRegistry;
pub use storage::Storage;
pub use sync::{
    dispatch_queue, DeltaCallback, DispatchQueue, DispatchTarget, DispatchWorker, Immediate,
    Subscription, SubscriptionRegistry, SubscriptionState,
};
pub use traits::{Backend, BackendFactory, SyncSource};
pub use watch::Target;
