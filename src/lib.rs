//! Per-connection scratch memory for HTTP servers.
//!
//! A [`MemoryPool`] is a fixed-capacity region serving two allocation
//! streams from opposite ends of one buffer: resizable head-end scratch and
//! persistent tail-end reservations.  The whole region is recycled between
//! request cycles with [`MemoryPool::reset`], which can carry one live block
//! (typically the partially received next request) over to the new cycle.
//!
//! Pools are single-owner: no locking, no atomics on the allocation path.
//! Backing memory comes from an anonymous mapping for large pools and from
//! the heap for small ones; teardown goes through whichever path the buffer
//! came from.

pub(crate) mod sync;

pub mod auth;
pub mod pool;

// pool surface
pub use pool::PoolError;
pub use pool::arena::MemoryPool;

// diagnostics
pub use pool::stats::{PoolStats, pool_stats};

// consumers
pub use auth::{AuthError, BasicCredentials, challenge, decode_credentials};
