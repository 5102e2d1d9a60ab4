//! caucus-session: the live side of a committee session.
//! Session channel (WebSocket transport with heartbeat and reconnect),
//! committee session store, delegation identity resolver, and the
//! resource API client they depend on.

pub mod api;
pub mod channel;
pub mod config;
pub mod error;
pub mod resolver;
pub mod store;

use std::sync::{Mutex, MutexGuard, PoisonError, TryLockError};

pub use api::{HttpResourceApi, ResourceApi};
pub use channel::{ChannelHandler, SessionChannel};
pub use config::{Feed, SessionConfig};
pub use error::{ApiError, ChannelError, ConfigError, StoreError};
pub use resolver::DelegationResolver;
pub use store::{CommitteeStore, Listener, SnapshotState, StoreReader, SubscriptionId};

/// A panicking subscriber must not wedge the session, so poisoned locks
/// are recovered rather than propagated.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn try_lock<T>(mutex: &Mutex<T>) -> Option<MutexGuard<'_, T>> {
    match mutex.try_lock() {
        Ok(guard) => Some(guard),
        Err(TryLockError::Poisoned(poisoned)) => Some(poisoned.into_inner()),
        Err(TryLockError::WouldBlock) => None,
    }
}
