use std::alloc::Layout;
use std::io;
use std::ptr::NonNull;

use super::PoolError;
use super::align::ALIGN_SIZE;
use super::stats;

/// Pools at or below this capacity stay on the heap.  An anonymous mapping
/// pays a page-granular setup cost that only amortises for larger regions;
/// past the threshold it wins with zero-initialised pages and a cheaper
/// release.
pub(crate) const MMAP_THRESHOLD: usize = 32 * 1024;

/// Which release primitive teardown must use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BackingKind {
    /// Anonymous private read/write mapping; released with the OS unmapping
    /// call.
    Mapped,
    /// Heap allocation; released through the global allocator.
    Heap,
}

/// Owned raw buffer behind a pool.
pub(crate) struct Backing {
    ptr: NonNull<u8>,
    size: usize,
    kind: BackingKind,
}

// Safety: Backing owns its region exclusively; moving the value moves
// ownership of the region.
unsafe impl Send for Backing {}

impl Backing {
    /// Acquire `size` bytes, preferring an anonymous mapping for large
    /// regions and falling back to the heap when mapping is unavailable or
    /// refused.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::CreationFailed`] when no backing path can
    /// provide the region.
    pub(crate) fn acquire(size: usize) -> Result<Self, PoolError> {
        debug_assert!(
            size.is_multiple_of(ALIGN_SIZE),
            "backing size {size} must be pre-rounded to the alignment quantum"
        );
        let backing = if map::available() && size > MMAP_THRESHOLD {
            match map::acquire(size) {
                Ok(b) => b,
                Err(_) => Self::heap(size)?,
            }
        } else {
            Self::heap(size)?
        };

        match backing.kind {
            BackingKind::Mapped => stats::MAPPED_BYTES.add(backing.size),
            BackingKind::Heap => stats::HEAP_BYTES.add(backing.size),
        }
        stats::POOLS_LIVE.add(1);
        Ok(backing)
    }

    fn heap(size: usize) -> Result<Self, PoolError> {
        if size == 0 {
            // A zero-capacity pool never dereferences its base; a dangling
            // aligned pointer is enough.
            return Ok(Self {
                ptr: dangling_aligned(),
                size: 0,
                kind: BackingKind::Heap,
            });
        }
        let layout = Layout::from_size_align(size, ALIGN_SIZE).map_err(|e| {
            PoolError::CreationFailed(io::Error::new(io::ErrorKind::InvalidInput, e.to_string()))
        })?;
        // Zeroed so heap-backed pools start with the same contents as mapped
        // ones.
        // Safety: layout has non-zero size.
        let raw = unsafe { std::alloc::alloc_zeroed(layout) };
        match NonNull::new(raw) {
            Some(ptr) => Ok(Self {
                ptr,
                size,
                kind: BackingKind::Heap,
            }),
            None => Err(PoolError::CreationFailed(io::Error::new(
                io::ErrorKind::OutOfMemory,
                "heap allocation returned null",
            ))),
        }
    }

    #[inline]
    pub(crate) fn as_ptr(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.size
    }

    #[inline]
    pub(crate) fn kind(&self) -> BackingKind {
        self.kind
    }
}

impl Drop for Backing {
    fn drop(&mut self) {
        match self.kind {
            BackingKind::Mapped => {
                // Safety: pointer and size are the ones the mapping was
                // created with.
                unsafe { map::release(self.ptr, self.size) };
                stats::MAPPED_BYTES.sub(self.size);
            }
            BackingKind::Heap => {
                if self.size != 0 {
                    // Safety: allocated in `heap` with this exact layout.
                    unsafe {
                        std::alloc::dealloc(
                            self.ptr.as_ptr(),
                            Layout::from_size_align_unchecked(self.size, ALIGN_SIZE),
                        );
                    }
                }
                stats::HEAP_BYTES.sub(self.size);
            }
        }
        stats::POOLS_LIVE.sub(1);
    }
}

fn dangling_aligned() -> NonNull<u8> {
    // Safety: ALIGN_SIZE is non-zero.
    unsafe { NonNull::new_unchecked(std::ptr::without_provenance_mut(ALIGN_SIZE)) }
}

#[cfg(all(unix, not(miri)))]
mod map {
    use std::io;
    use std::ptr::NonNull;

    use super::{Backing, BackingKind, PoolError};

    pub(super) fn available() -> bool {
        true
    }

    pub(super) fn acquire(size: usize) -> Result<Backing, PoolError> {
        // Safety: FFI call to mmap.
        let raw = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                size,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_PRIVATE | libc::MAP_ANON,
                -1,
                0,
            )
        };
        if raw == libc::MAP_FAILED {
            return Err(PoolError::CreationFailed(io::Error::last_os_error()));
        }
        match NonNull::new(raw.cast::<u8>()) {
            Some(ptr) => Ok(Backing {
                ptr,
                size,
                kind: BackingKind::Mapped,
            }),
            None => Err(PoolError::CreationFailed(io::Error::other(
                "mmap returned null",
            ))),
        }
    }

    pub(super) unsafe fn release(ptr: NonNull<u8>, size: usize) {
        // Safety: FFI call to munmap; the caller owns the mapping.
        unsafe { libc::munmap(ptr.as_ptr().cast::<libc::c_void>(), size) };
    }
}

#[cfg(all(windows, not(miri)))]
mod map {
    use std::io;
    use std::ptr::NonNull;

    use super::{Backing, BackingKind, PoolError};

    const MEM_COMMIT: u32 = 0x1000;
    const MEM_RESERVE: u32 = 0x2000;
    const MEM_RELEASE: u32 = 0x8000;
    const PAGE_READWRITE: u32 = 0x04;

    unsafe extern "system" {
        fn VirtualAlloc(
            addr: *mut core::ffi::c_void,
            size: usize,
            alloc_type: u32,
            protect: u32,
        ) -> *mut core::ffi::c_void;
        fn VirtualFree(addr: *mut core::ffi::c_void, size: usize, free_type: u32) -> i32;
    }

    pub(super) fn available() -> bool {
        true
    }

    pub(super) fn acquire(size: usize) -> Result<Backing, PoolError> {
        // Safety: FFI call to VirtualAlloc.
        let raw =
            unsafe { VirtualAlloc(std::ptr::null_mut(), size, MEM_RESERVE | MEM_COMMIT, PAGE_READWRITE) };
        match NonNull::new(raw.cast::<u8>()) {
            Some(ptr) => Ok(Backing {
                ptr,
                size,
                kind: BackingKind::Mapped,
            }),
            None => Err(PoolError::CreationFailed(io::Error::last_os_error())),
        }
    }

    pub(super) unsafe fn release(ptr: NonNull<u8>, _size: usize) {
        // MEM_RELEASE requires size 0 and the base address of the region.
        // Safety: FFI call to VirtualFree; the caller owns the region.
        unsafe { VirtualFree(ptr.as_ptr().cast::<core::ffi::c_void>(), 0, MEM_RELEASE) };
    }
}

// No mapping facility under miri or on other targets; every pool is
// heap-backed.
#[cfg(any(miri, not(any(unix, windows))))]
mod map {
    use std::ptr::NonNull;

    use super::{Backing, PoolError};

    pub(super) fn available() -> bool {
        false
    }

    pub(super) fn acquire(_size: usize) -> Result<Backing, PoolError> {
        unreachable!("mapping facility is not available on this platform")
    }

    pub(super) unsafe fn release(_ptr: NonNull<u8>, _size: usize) {
        unreachable!("no mapped backing can exist on this platform")
    }
}
