// Synchronization primitive shim.
//
// Under `cfg(loom)`, re-exports from the `loom` crate so the diagnostic
// gauges stay model-checkable.  Otherwise, re-exports from `std`.
//
// **Every** file in the crate must import sync primitives through this
// module.  A single direct `use std::sync::atomic::*` would bypass loom's
// scheduler and silently break exhaustive testing.
#![allow(unused_imports, unused_macros)]

// ---------------------------------------------------------------------------
// atomic
// ---------------------------------------------------------------------------
pub(crate) mod atomic {
    #[cfg(loom)]
    pub(crate) use loom::sync::atomic::{AtomicIsize, Ordering};

    #[cfg(not(loom))]
    pub(crate) use std::sync::atomic::{AtomicIsize, Ordering};
}

// ---------------------------------------------------------------------------
// sync (Arc, RwLock)
// ---------------------------------------------------------------------------
#[cfg(loom)]
pub(crate) use loom::sync::{Arc, RwLock};

#[cfg(not(loom))]
pub(crate) use std::sync::{Arc, RwLock};

// ---------------------------------------------------------------------------
// Static initialisation helpers
//
// loom atomics and locks are not const-constructible.  These macros create
// statics that work under both loom and std.
// ---------------------------------------------------------------------------

/// Declare a `static` atomic.  Under std, uses `const` init.  Under loom,
/// uses `loom::lazy_static!` so the value is re-created for each model run.
///
/// Usage: `static_atomic! { [pub] static NAME: Type = init_expr; }`
#[allow(unused_macro_rules)]
macro_rules! static_atomic {
    (pub static $NAME:ident : $Ty:ty = $init:expr ;) => {
        #[cfg(not(loom))]
        pub static $NAME: $Ty = $init;

        #[cfg(loom)]
        loom::lazy_static! {
            pub static ref $NAME: $Ty = $init;
        }
    };
    (static $NAME:ident : $Ty:ty = $init:expr ;) => {
        #[cfg(not(loom))]
        static $NAME: $Ty = $init;

        #[cfg(loom)]
        loom::lazy_static! {
            static ref $NAME: $Ty = $init;
        }
    };
}
pub(crate) use static_atomic;

/// Declare a `static` `RwLock`.  Under std, uses `const` init.  Under loom,
/// uses `loom::lazy_static!`.
#[allow(unused_macro_rules)]
macro_rules! static_rwlock {
    (pub static $NAME:ident : $Ty:ty = $init:expr ;) => {
        #[cfg(not(loom))]
        pub static $NAME: $Ty = $init;

        #[cfg(loom)]
        loom::lazy_static! {
            pub static ref $NAME: $Ty = $init;
        }
    };
    (static $NAME:ident : $Ty:ty = $init:expr ;) => {
        #[cfg(not(loom))]
        static $NAME: $Ty = $init;

        #[cfg(loom)]
        loom::lazy_static! {
            static ref $NAME: $Ty = $init;
        }
    };
}
pub(crate) use static_rwlock;
