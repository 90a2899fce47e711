use std::ptr::NonNull;

use super::PoolError;
use super::align::{ALIGN_SIZE, round_to_align};
use super::backing::{Backing, BackingKind};

/// Scratch memory pool for a single connection.
///
/// One fixed buffer serves two allocation streams from opposite ends: the
/// head grows upward from offset 0 and holds short-lived blocks that may be
/// resized with [`realloc`](Self::realloc), the tail grows downward from the
/// capacity and holds reservations that stay put until the next
/// [`reset`](Self::reset).  Individual blocks are never freed; the whole
/// region is recycled at request boundaries, optionally carrying one live
/// block over to the new cycle.
///
/// A pool is not reentrant.  It is owned by exactly one logical actor at a
/// time; the handle may move between threads, but no operation takes a lock
/// or touches an atomic on the allocation path.
pub struct MemoryPool {
    backing: Backing,
    /// Offset of the first byte not claimed by a head-end block.
    head: usize,
    /// Offset one past the last byte not claimed by a tail-end block.
    tail: usize,
}

impl MemoryPool {
    /// Create a pool of (at least) `max` bytes, rounded up to the alignment
    /// quantum.
    ///
    /// Regions above 32 KiB are served by an anonymous mapping when the
    /// platform has one; smaller regions and mapping failures fall back to
    /// the heap.
    ///
    /// # Errors
    ///
    /// [`PoolError::SizeOverflow`] when rounding `max` overflows,
    /// [`PoolError::CreationFailed`] when no backing path can provide the
    /// region.
    pub fn new(max: usize) -> Result<Self, PoolError> {
        let max = round_to_align(max).ok_or(PoolError::SizeOverflow(max))?;
        let backing = Backing::acquire(max)?;
        Ok(Self {
            backing,
            head: 0,
            tail: max,
        })
    }

    /// Total usable bytes; fixed at creation.
    #[inline]
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.backing.len()
    }

    /// Whether the buffer came from the OS mapping facility rather than the
    /// heap.
    #[inline]
    #[must_use]
    pub fn is_mapped(&self) -> bool {
        self.backing.kind() == BackingKind::Mapped
    }

    /// Bytes still available between the two cursors.
    #[must_use]
    pub fn free_bytes(&self) -> usize {
        self.check_invariants();
        self.tail - self.head
    }

    #[inline]
    fn base(&self) -> *mut u8 {
        self.backing.as_ptr()
    }

    #[inline]
    fn check_invariants(&self) {
        debug_assert!(self.head <= self.tail);
        debug_assert!(self.tail <= self.capacity());
        debug_assert!(self.head.is_multiple_of(ALIGN_SIZE));
        debug_assert!(self.tail.is_multiple_of(ALIGN_SIZE));
    }

    /// Claim `size` bytes from the pool.
    ///
    /// Head-end blocks (`from_end == false`) are scratch: they may be
    /// resized and are the cheap, common case.  Tail-end blocks
    /// (`from_end == true`) are for small reservations that live until the
    /// next [`reset`](Self::reset) and are never resized.
    ///
    /// The returned block is valid for `size` bytes until the pool's next
    /// reset or drop.
    ///
    /// # Errors
    ///
    /// [`PoolError::SizeOverflow`] when rounding `size` overflows,
    /// [`PoolError::Exhausted`] when the free region cannot fit the rounded
    /// request.  The cursors are untouched on failure.
    pub fn alloc(&mut self, size: usize, from_end: bool) -> Result<NonNull<u8>, PoolError> {
        self.check_invariants();
        let asize = round_to_align(size).ok_or(PoolError::SizeOverflow(size))?;
        let free = self.tail - self.head;
        if asize > free {
            return Err(PoolError::Exhausted {
                requested: size,
                free,
            });
        }
        let offset = if from_end {
            self.tail -= asize;
            self.tail
        } else {
            let at = self.head;
            self.head += asize;
            at
        };
        // Safety: offset never passes the capacity, so the result stays
        // inside (or one past) the owned region, and the base is non-null.
        Ok(unsafe { NonNull::new_unchecked(self.base().add(offset)) })
    }

    /// Resize a head-end block.
    ///
    /// Resizing the most recently (re)allocated block moves the cursor in
    /// place and keeps the address.  Any other block is relocated to a fresh
    /// head-end block; the old block's bytes are zeroed and its space stays
    /// claimed until the next [`reset`](Self::reset).  Callers are expected
    /// to resize predominantly the last block, keeping relocation rare.
    ///
    /// On failure the pool is unchanged and `old` remains valid for
    /// `old_size` bytes.
    ///
    /// # Safety
    ///
    /// - `old` was returned by a head-end [`alloc`](Self::alloc) or by this
    ///   method, on this pool, since the last reset.
    /// - `old_size` does not exceed the size the block was last
    ///   (re)allocated with.
    ///
    /// # Errors
    ///
    /// [`PoolError::SizeOverflow`] when rounding `new_size` overflows,
    /// [`PoolError::Exhausted`] when the free region cannot fit the request.
    pub unsafe fn realloc(
        &mut self,
        old: NonNull<u8>,
        old_size: usize,
        new_size: usize,
    ) -> Result<NonNull<u8>, PoolError> {
        self.check_invariants();
        let base = self.base() as usize;
        let old_addr = old.as_ptr() as usize;
        debug_assert!(old_addr >= base);
        debug_assert!(old_addr + old_size <= base + self.capacity());
        // Tail-end blocks are never resized.
        debug_assert!(old_size == 0 || old_addr < base + self.head);

        let new_asize = round_to_align(new_size).ok_or(PoolError::SizeOverflow(new_size))?;

        if old_size != 0 {
            let old_offset = old_addr - base;
            if round_to_align(old_offset + old_size) == Some(self.head) {
                // `old` is the last head-end block; adjust the cursor in
                // place.
                let new_head = round_to_align(old_offset + new_size)
                    .ok_or(PoolError::SizeOverflow(new_size))?;
                if new_head > self.tail {
                    return Err(PoolError::Exhausted {
                        requested: new_size,
                        free: self.tail - self.head,
                    });
                }
                self.head = new_head;
                if old_size > new_size {
                    // Zero the released suffix.
                    // Safety: [new_size, old_size) lies inside the block.
                    unsafe {
                        std::ptr::write_bytes(old.as_ptr().add(new_size), 0, old_size - new_size);
                    }
                }
                return Ok(old);
            }
        }

        // Relocate.  The old block's space is not reclaimed; it stays
        // claimed until the next reset.
        let free = self.tail - self.head;
        if new_asize > free {
            return Err(PoolError::Exhausted {
                requested: new_size,
                free,
            });
        }
        // Safety: head stays within the owned region after the bound check.
        let new_ptr = unsafe { self.base().add(self.head) };
        self.head += new_asize;
        if old_size != 0 {
            // The old block ends at or below the previous head, so the two
            // ranges cannot overlap.
            // Safety: both blocks lie inside the owned buffer.
            unsafe {
                std::ptr::copy_nonoverlapping(old.as_ptr(), new_ptr, old_size);
                std::ptr::write_bytes(old.as_ptr(), 0, old_size);
            }
        }
        // Safety: derived from the non-null base.
        Ok(unsafe { NonNull::new_unchecked(new_ptr) })
    }

    /// Discard every allocation, optionally preserving one block by moving
    /// it to the start of the buffer.
    ///
    /// The tail region is released, the bytes past `copy_bytes` are zeroed,
    /// and the head cursor is re-seeded to cover a single block of
    /// `new_size` bytes whose first `copy_bytes` bytes are the preserved
    /// data.  With `keep == None` the pool comes back completely empty.
    ///
    /// Returns the new address of the kept block, which is always the
    /// buffer origin.
    ///
    /// # Safety
    ///
    /// - If `keep` is `Some`, it points into this pool's buffer and
    ///   `keep + copy_bytes` does not pass the end of the buffer.
    /// - If `keep` is `None`, `copy_bytes` is 0.
    /// - `new_size` does not exceed the pool's capacity.
    pub unsafe fn reset(
        &mut self,
        keep: Option<NonNull<u8>>,
        copy_bytes: usize,
        new_size: usize,
    ) -> Option<NonNull<u8>> {
        self.check_invariants();
        debug_assert!(keep.is_some() || copy_bytes == 0);
        debug_assert!(new_size <= self.capacity());
        let base = self.base();

        if let Some(p) = keep {
            debug_assert!(p.as_ptr() as usize >= base as usize);
            debug_assert!(p.as_ptr() as usize + copy_bytes <= base as usize + self.capacity());
            if p.as_ptr() != base && copy_bytes != 0 {
                // The source range may overlap the destination.
                // Safety: both ranges lie inside the owned buffer.
                unsafe { std::ptr::copy(p.as_ptr(), base, copy_bytes) };
            }
        }

        self.tail = self.capacity();
        if self.capacity() > copy_bytes {
            // Zero everything past the preserved prefix.
            // Safety: [copy_bytes, capacity) lies inside the owned buffer.
            unsafe { std::ptr::write_bytes(base.add(copy_bytes), 0, self.capacity() - copy_bytes) };
        }
        self.head = match keep {
            // Clamped to the capacity so a caller that lied about new_size
            // in a release build cannot push the cursor past the tail.
            Some(_) => round_to_align(new_size)
                .map_or(self.capacity(), |h| h.min(self.capacity())),
            None => 0,
        };

        // Safety: the base pointer is non-null.
        keep.map(|_| unsafe { NonNull::new_unchecked(base) })
    }
}

impl Drop for MemoryPool {
    fn drop(&mut self) {
        self.check_invariants();
        // Backing teardown picks the release primitive recorded at creation.
    }
}
