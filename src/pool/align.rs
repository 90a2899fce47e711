/// Alignment quantum: twice the pointer width, the granularity glibc's
/// allocator hands out.  Every size the arena accepts and every cursor value
/// it keeps is a multiple of this.
pub(crate) const ALIGN_SIZE: usize = 2 * size_of::<*mut u8>();

/// Round `n` up to a multiple of [`ALIGN_SIZE`].
///
/// Returns `None` when the rounded value does not fit in `usize`.
#[inline]
pub(crate) fn round_to_align(n: usize) -> Option<usize> {
    n.checked_next_multiple_of(ALIGN_SIZE)
}

#[cfg(all(test, not(loom)))]
mod tests {
    use super::*;

    #[test]
    fn test_quantum_is_double_pointer_width() {
        assert_eq!(ALIGN_SIZE, 2 * size_of::<usize>());
        assert!(ALIGN_SIZE.is_power_of_two());
    }

    #[test]
    fn test_round_to_align() {
        assert_eq!(round_to_align(0), Some(0));
        assert_eq!(round_to_align(1), Some(ALIGN_SIZE));
        assert_eq!(round_to_align(ALIGN_SIZE), Some(ALIGN_SIZE));
        assert_eq!(round_to_align(ALIGN_SIZE + 1), Some(2 * ALIGN_SIZE));
        assert_eq!(round_to_align(100), Some(112));
    }

    #[test]
    fn test_round_to_align_overflow() {
        assert_eq!(round_to_align(usize::MAX), None);
        assert_eq!(round_to_align(usize::MAX - ALIGN_SIZE + 2), None);
        // The largest representable aligned value still rounds.
        let top = usize::MAX - (usize::MAX % ALIGN_SIZE);
        assert_eq!(round_to_align(top), Some(top));
    }
}
