//! Fallible allocation helpers.
//!
//! Side buffers (trellis bookkeeping, candidate scan buffers) are sized by
//! image dimensions, so they are reserved with `try_reserve_exact` and
//! exhaustion surfaces as [`Error::AllocationFailed`](crate::Error::AllocationFailed).

use crate::error::Result;

/// Allocate a Vec filled with `value`, failing instead of aborting.
#[inline]
pub fn try_alloc_vec<T: Clone>(value: T, len: usize) -> Result<Vec<T>> {
    let mut v = Vec::new();
    v.try_reserve_exact(len)?;
    v.resize(len, value);
    Ok(v)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[test]
    fn test_try_alloc_vec() {
        let v = try_alloc_vec(7u8, 16).unwrap();
        assert_eq!(v.len(), 16);
        assert!(v.iter().all(|&x| x == 7));
    }

    #[test]
    fn test_try_alloc_overflow_reports_allocation_failure() {
        let result = try_alloc_vec(0u64, usize::MAX / 4);
        assert_eq!(result.unwrap_err(), Error::AllocationFailed);
    }
}
