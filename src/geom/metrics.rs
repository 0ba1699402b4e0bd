//! Opt-in timing hooks for the bind and deform passes.
//!
//! Timing is only collected when the `metrics` feature is enabled and the
//! target is not WASM (`std::time::Instant` is unavailable there). Otherwise
//! every call compiles to a plain closure invocation.
//!
//! ```ignore
//! use sdef_engine::geom::{GeomMetrics, TimingBucket};
//!
//! let mut metrics = GeomMetrics::default();
//! metrics.begin();
//! let adjacency = metrics.time(TimingBucket::Adjacency, || build_adjacency(&target));
//! if let Some(report) = metrics.end() {
//!     println!("adjacency: {} ns", report.adjacency_ns);
//! }
//! ```

/// Categories for timing the phases of binding and deforming.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimingBucket {
    /// Vertex/edge/polygon adjacency construction.
    Adjacency,
    /// Spatial index construction over the target surface.
    SpatialIndex,
    /// Per-vertex bind weight solving.
    Bind,
    /// Per-vertex deformation.
    Deform,
    /// Bind data encoding and decoding.
    Persist,
}

/// Timing report with nanosecond precision. Fields accumulate across calls.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct GeomTimingReport {
    pub adjacency_ns: u64,
    pub spatial_index_ns: u64,
    pub bind_ns: u64,
    pub deform_ns: u64,
    pub persist_ns: u64,
}

impl GeomTimingReport {
    /// Returns the total time across all buckets in nanoseconds.
    #[must_use]
    pub fn total_ns(&self) -> u64 {
        self.adjacency_ns
            .saturating_add(self.spatial_index_ns)
            .saturating_add(self.bind_ns)
            .saturating_add(self.deform_ns)
            .saturating_add(self.persist_ns)
    }

    /// Returns the total time in milliseconds (for display purposes).
    #[must_use]
    pub fn total_ms(&self) -> f64 {
        self.total_ns() as f64 / 1_000_000.0
    }
}

/// Accumulator for timing bind/deform phases.
///
/// When the `metrics` feature is disabled (or on WASM), all methods are
/// no-ops and [`end`](Self::end) returns `None`.
#[derive(Debug, Default)]
pub struct GeomMetrics {
    #[cfg(all(feature = "metrics", not(target_arch = "wasm32")))]
    report: GeomTimingReport,
}

impl GeomMetrics {
    /// Resets all timing counters to zero.
    pub fn begin(&mut self) {
        #[cfg(all(feature = "metrics", not(target_arch = "wasm32")))]
        {
            self.report = GeomTimingReport::default();
        }
    }

    /// Returns the accumulated timing report, or `None` if metrics are disabled.
    #[must_use]
    pub fn end(&self) -> Option<GeomTimingReport> {
        #[cfg(all(feature = "metrics", not(target_arch = "wasm32")))]
        {
            Some(self.report.clone())
        }
        #[cfg(not(all(feature = "metrics", not(target_arch = "wasm32"))))]
        {
            None
        }
    }

    /// Times the execution of `f` and accumulates the elapsed time in `bucket`.
    pub fn time<R>(&mut self, bucket: TimingBucket, f: impl FnOnce() -> R) -> R {
        #[cfg(all(feature = "metrics", not(target_arch = "wasm32")))]
        {
            let start = std::time::Instant::now();
            let result = f();
            let elapsed = start.elapsed();
            // Cap at u64::MAX to prevent overflow
            let nanos_u64 = elapsed.as_nanos().min(u128::from(u64::MAX)) as u64;
            self.add_to_bucket(bucket, nanos_u64);
            result
        }

        #[cfg(not(all(feature = "metrics", not(target_arch = "wasm32"))))]
        {
            let _ = bucket;
            f()
        }
    }

    #[cfg(all(feature = "metrics", not(target_arch = "wasm32")))]
    fn add_to_bucket(&mut self, bucket: TimingBucket, nanos: u64) {
        let slot = match bucket {
            TimingBucket::Adjacency => &mut self.report.adjacency_ns,
            TimingBucket::SpatialIndex => &mut self.report.spatial_index_ns,
            TimingBucket::Bind => &mut self.report.bind_ns,
            TimingBucket::Deform => &mut self.report.deform_ns,
            TimingBucket::Persist => &mut self.report.persist_ns,
        };
        *slot = slot.saturating_add(nanos);
    }
}
