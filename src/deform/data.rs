use serde::{Deserialize, Serialize};

use crate::geom::Transform;

/// Interpolation shape of a [`Bind`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BindMode {
    /// Generalized polygon weights over every polygon corner.
    Ngon,
    /// Barycentric weights over the anchor corner and its two neighbours.
    Triangle,
    /// Barycentric weights over one polygon edge and the live polygon centroid.
    Centroid,
}

impl BindMode {
    #[must_use]
    pub const fn tag(self) -> u8 {
        match self {
            Self::Ngon => 0,
            Self::Triangle => 1,
            Self::Centroid => 2,
        }
    }

    #[must_use]
    pub const fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(Self::Ngon),
            1 => Some(Self::Triangle),
            2 => Some(Self::Centroid),
            _ => None,
        }
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Ngon => "ngon",
            Self::Triangle => "triangle",
            Self::Centroid => "centroid",
        }
    }
}

/// One interpolation record of a bound vertex.
///
/// `vert_inds` always lists every corner of the target polygon so the live
/// polygon normal (and centroid) can be recomputed. Triangle and centroid
/// binds carry three weights, ngon binds one per corner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bind {
    pub mode: BindMode,
    pub vert_inds: Vec<u32>,
    pub vert_weights: Vec<f64>,
    pub influence: f64,
    pub normal_dist: f64,
}

impl Bind {
    /// Number of interpolation weights this bind must carry.
    #[must_use]
    pub fn expected_weight_count(&self) -> usize {
        match self.mode {
            BindMode::Ngon => self.vert_inds.len(),
            BindMode::Triangle | BindMode::Centroid => 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BoundVertex {
    /// Source vertex this entry deforms. In sparse bind data this, not the
    /// array position, identifies the vertex.
    pub vertex_idx: u32,
    pub binds: Vec<Bind>,
}

/// Everything a bind pass produces and a deform pass consumes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BindData {
    /// Maps target-local coordinates into source-local space.
    pub matrix: Transform,
    pub source_vertex_count: usize,
    pub target_polygon_count: usize,
    pub sparse: bool,
    pub target_name: String,
    pub verts: Vec<BoundVertex>,
}

impl BindData {
    #[must_use]
    pub fn bound_vertex_count(&self) -> usize {
        self.verts.len()
    }

    #[must_use]
    pub fn bind_count(&self) -> usize {
        self.verts.iter().map(|v| v.binds.len()).sum()
    }

    /// Bind records per mode as `(ngon, triangle, centroid)`.
    #[must_use]
    pub fn mode_counts(&self) -> (usize, usize, usize) {
        self.verts
            .iter()
            .flat_map(|v| &v.binds)
            .fold((0, 0, 0), |(n, t, c), b| match b.mode {
                BindMode::Ngon => (n + 1, t, c),
                BindMode::Triangle => (n, t + 1, c),
                BindMode::Centroid => (n, t, c + 1),
            })
    }
}
