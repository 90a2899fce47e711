use std::fmt;
use std::io;

pub(crate) mod align;
pub(crate) mod arena;
pub(crate) mod backing;
pub(crate) mod stats;

/// Failure of a pool operation.
///
/// A failing operation leaves the pool exactly as it was before the call;
/// the caller decides whether to retry, answer with an error status, or
/// close the connection.
#[derive(Debug)]
pub enum PoolError {
    /// The free region between the two cursors cannot fit the request.
    Exhausted { requested: usize, free: usize },
    /// The size does not survive alignment rounding.
    SizeOverflow(usize),
    /// Neither the mapping facility nor the heap could provide the buffer.
    CreationFailed(io::Error),
}

impl fmt::Display for PoolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PoolError::Exhausted { requested, free } => {
                write!(f, "pool exhausted: requested {requested} bytes, {free} free")
            }
            PoolError::SizeOverflow(size) => {
                write!(f, "size {size} overflows alignment rounding")
            }
            PoolError::CreationFailed(e) => write!(f, "pool creation failed: {e}"),
        }
    }
}

impl std::error::Error for PoolError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PoolError::CreationFailed(e) => Some(e),
            PoolError::Exhausted { .. } | PoolError::SizeOverflow(_) => None,
        }
    }
}

#[cfg(test)]
crate::sync::static_rwlock! {
    pub static TEST_MUTEX: crate::sync::RwLock<()> = crate::sync::RwLock::new(());
}
