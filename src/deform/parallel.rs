//! Index-range fan-out used by the binder and the deformer.
//!
//! With the `parallel` feature, ranges longer than [`PARALLEL_THRESHOLD`] are
//! mapped on the rayon pool; shorter ranges, and every range without the
//! feature, run on the calling thread.

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Work items at or below this count are processed sequentially.
pub const PARALLEL_THRESHOLD: usize = 10_000;

/// Maps `f` over `0..len`, preserving index order in the output.
#[cfg(feature = "parallel")]
pub fn map_range<R, F>(len: usize, f: F) -> Vec<R>
where
    R: Send,
    F: Fn(usize) -> R + Sync + Send,
{
    if len > PARALLEL_THRESHOLD {
        (0..len).into_par_iter().map(f).collect()
    } else {
        (0..len).map(f).collect()
    }
}

#[cfg(not(feature = "parallel"))]
pub fn map_range<R, F>(len: usize, f: F) -> Vec<R>
where
    F: Fn(usize) -> R,
{
    (0..len).map(f).collect()
}
