//! Error types for binding, deforming and bind data persistence.

use std::sync::atomic::{AtomicI8, Ordering};

use thiserror::Error;

use crate::geom::MeshError;

/// Outcome of solving one source vertex.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i8)]
pub enum BindStatus {
    Success = 1,
    /// Numeric degeneracy: NaN ratios, collapsed scales, out-of-range weights.
    Generic = 0,
    OutOfMemory = -1,
    NonManifold = -2,
    Concave = -3,
    Overlap = -4,
}

impl BindStatus {
    #[must_use]
    pub const fn is_success(self) -> bool {
        matches!(self, Self::Success)
    }

    const fn from_code(code: i8) -> Self {
        match code {
            1 => Self::Success,
            -1 => Self::OutOfMemory,
            -2 => Self::NonManifold,
            -3 => Self::Concave,
            -4 => Self::Overlap,
            _ => Self::Generic,
        }
    }
}

/// Status cell shared by every bind worker. The first failure recorded wins;
/// later failures and successes never overwrite it.
#[derive(Debug)]
pub struct SharedStatus(AtomicI8);

impl SharedStatus {
    #[must_use]
    pub const fn new() -> Self {
        Self(AtomicI8::new(BindStatus::Success as i8))
    }

    #[must_use]
    pub fn get(&self) -> BindStatus {
        BindStatus::from_code(self.0.load(Ordering::Acquire))
    }

    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.get().is_success()
    }

    /// Records `status` if nothing has failed yet. Returns the status that is
    /// in effect afterwards.
    pub fn fail(&self, status: BindStatus) -> BindStatus {
        if status.is_success() {
            return self.get();
        }
        match self.0.compare_exchange(
            BindStatus::Success as i8,
            status as i8,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => status,
            Err(current) => BindStatus::from_code(current),
        }
    }
}

impl Default for SharedStatus {
    fn default() -> Self {
        Self::new()
    }
}

/// Errors returned by a bind pass. No bind data survives any of them.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BindError {
    #[error("Out of memory")]
    OutOfMemory,
    #[error("Target has edges with more than two polygons")]
    NonManifold,
    #[error("Target contains concave polygons")]
    ConcavePolygon,
    #[error("Target contains overlapping vertices")]
    OverlappingVertices,
    #[error("Target contains invalid polygons")]
    InvalidPolygons,
    #[error("No vertices were bound")]
    NoVerticesBound,
    #[error("Target mesh has no polygons")]
    EmptyTarget,
    #[error("Bind transform is not invertible")]
    NonInvertibleTransform,
    #[error("Falloff {0} is outside the supported range 2..=16")]
    InvalidFalloff(f64),
    #[error("Vertex group has {len} weights but the mesh has {expected} vertices")]
    IndexOutOfRange { len: usize, expected: usize },
}

impl BindError {
    /// Maps a failed solver status onto the error reported to the host.
    #[must_use]
    pub const fn from_status(status: BindStatus) -> Option<Self> {
        match status {
            BindStatus::Success => None,
            BindStatus::Generic => Some(Self::InvalidPolygons),
            BindStatus::OutOfMemory => Some(Self::OutOfMemory),
            BindStatus::NonManifold => Some(Self::NonManifold),
            BindStatus::Concave => Some(Self::ConcavePolygon),
            BindStatus::Overlap => Some(Self::OverlappingVertices),
        }
    }
}

impl From<std::collections::TryReserveError> for BindError {
    fn from(_: std::collections::TryReserveError) -> Self {
        Self::OutOfMemory
    }
}

/// Errors returned when applying bind data.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeformError {
    #[error("Modifier is not bound")]
    NotBound,
    #[error("Vertices changed from {bound} to {current}")]
    VertexCountChanged { bound: usize, current: usize },
    #[error("Target polygons changed from {bound} to {current}")]
    PolygonCountChanged { bound: usize, current: usize },
    #[error("No valid target mesh")]
    NoTarget,
    #[error("Bind data references target vertex {index} but the target has {count}")]
    TargetIndexOutOfRange { index: usize, count: usize },
    #[error("Bind data references source vertex {index} but the mesh has {count}")]
    SourceIndexOutOfRange { index: usize, count: usize },
    #[error("{mode} bind has {vertices} vertices and {weights} weights")]
    MalformedBind {
        mode: &'static str,
        vertices: usize,
        weights: usize,
    },
}

/// Errors raised while encoding or decoding bind data.
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("not a bind data stream (magic {0:?})")]
    BadMagic([u8; 4]),
    #[error("unsupported bind data version {0}")]
    UnsupportedVersion(u32),
    #[error("unknown interpolation mode tag {0}")]
    UnknownMode(u8),
    #[error("{mode} bind stores {found} weights, expected {expected}")]
    WeightCount {
        mode: &'static str,
        found: usize,
        expected: usize,
    },
    #[error("{mode} bind lists {found} vertices, at least 3 are required")]
    TooFewVertices { mode: &'static str, found: usize },
    #[error("bound vertex {index} is out of range for {count} source vertices")]
    VertexIndex { index: usize, count: usize },
    #[error("target name is not valid UTF-8")]
    InvalidName,
}

/// Umbrella error for the modifier facade.
#[derive(Debug, Error)]
pub enum SurfaceDeformError {
    #[error(transparent)]
    Bind(#[from] BindError),
    #[error(transparent)]
    Deform(#[from] DeformError),
    #[error(transparent)]
    Persist(#[from] PersistError),
    #[error(transparent)]
    Mesh(#[from] MeshError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_failure_wins() {
        let status = SharedStatus::new();
        assert!(status.is_ok());

        assert_eq!(status.fail(BindStatus::Concave), BindStatus::Concave);
        assert_eq!(status.fail(BindStatus::OutOfMemory), BindStatus::Concave);
        assert_eq!(status.fail(BindStatus::Success), BindStatus::Concave);
        assert_eq!(status.get(), BindStatus::Concave);
    }

    #[test]
    fn status_messages_match_host_strings() {
        let msg = |s| BindError::from_status(s).map(|e| e.to_string());
        assert_eq!(msg(BindStatus::Success), None);
        assert_eq!(
            msg(BindStatus::NonManifold).as_deref(),
            Some("Target has edges with more than two polygons")
        );
        assert_eq!(
            msg(BindStatus::Generic).as_deref(),
            Some("Target contains invalid polygons")
        );
        assert_eq!(
            DeformError::VertexCountChanged { bound: 8, current: 9 }.to_string(),
            "Vertices changed from 8 to 9"
        );
    }
}
