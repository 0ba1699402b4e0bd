//! Bind pass: solves every source vertex against the target surface.

use serde::{Deserialize, Serialize};

use crate::geom::{
    GeomMetrics, GeomTimingReport, Point3, PolyMesh, SurfaceTree, TimingBucket, Transform,
};

use super::adjacency::Adjacency;
use super::data::{Bind, BindData, BoundVertex};
use super::error::{BindError, SharedStatus};
use super::parallel::map_range;
use super::settings::{FALLOFF_MAX, FALLOFF_MIN};
use super::solver::{SolverContext, solve_vertex};
use super::vgroup::VertexGroup;

/// Inputs of a bind pass besides the two meshes.
#[derive(Debug, Clone, Copy)]
pub struct BindOptions<'a> {
    pub source_world: Transform,
    pub target_world: Transform,
    pub falloff: f64,
    pub group: Option<&'a VertexGroup>,
    /// Skip vertices with no group weight and compact the result. Ignored
    /// without a group.
    pub sparse: bool,
    pub target_name: &'a str,
}

impl Default for BindOptions<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a> BindOptions<'a> {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            source_world: Transform::identity(),
            target_world: Transform::identity(),
            falloff: 4.0,
            group: None,
            sparse: false,
            target_name: "",
        }
    }

    #[must_use]
    pub const fn with_transforms(
        mut self,
        source_world: Transform,
        target_world: Transform,
    ) -> Self {
        self.source_world = source_world;
        self.target_world = target_world;
        self
    }

    #[must_use]
    pub const fn with_falloff(mut self, falloff: f64) -> Self {
        self.falloff = falloff;
        self
    }

    #[must_use]
    pub const fn with_group(mut self, group: Option<&'a VertexGroup>) -> Self {
        self.group = group;
        self
    }

    #[must_use]
    pub const fn with_sparse(mut self, sparse: bool) -> Self {
        self.sparse = sparse;
        self
    }

    #[must_use]
    pub const fn with_target_name(mut self, name: &'a str) -> Self {
        self.target_name = name;
        self
    }
}

/// Summary of a successful bind pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BindDiagnostics {
    pub source_vertex_count: usize,
    pub target_vertex_count: usize,
    pub target_polygon_count: usize,
    pub bound_vertex_count: usize,
    pub ngon_binds: usize,
    pub triangle_binds: usize,
    pub centroid_binds: usize,
    pub sparse: bool,
    #[serde(skip)]
    pub timing: Option<GeomTimingReport>,
}

/// Binds `source` (source-local coordinates) to `target`.
///
/// Any solver failure aborts the whole pass; no partial bind data is
/// returned.
pub fn bind(
    source: &[Point3],
    target: &PolyMesh,
    options: &BindOptions<'_>,
) -> Result<(BindData, BindDiagnostics), BindError> {
    if !(FALLOFF_MIN..=FALLOFF_MAX).contains(&options.falloff) {
        return Err(BindError::InvalidFalloff(options.falloff));
    }
    if target.face_count() == 0 {
        return Err(BindError::EmptyTarget);
    }
    if let Some(group) = options.group {
        if group.len() > source.len() {
            return Err(BindError::IndexOutOfRange {
                len: group.len(),
                expected: source.len(),
            });
        }
    }

    let matrix = options
        .source_world
        .inverse()
        .ok_or(BindError::NonInvertibleTransform)?
        .compose(options.target_world);
    let to_target = matrix.inverse().ok_or(BindError::NonInvertibleTransform)?;

    log::debug!(
        "bind: {} source vertices onto '{}' ({} vertices, {} polygons)",
        source.len(),
        options.target_name,
        target.vertex_count(),
        target.face_count()
    );

    let mut metrics = GeomMetrics::default();
    metrics.begin();

    let adjacency = metrics.time(TimingBucket::Adjacency, || Adjacency::build(target))?;
    let tree = metrics.time(TimingBucket::SpatialIndex, || SurfaceTree::new(target));
    let target_cos = target.transformed_positions(matrix);

    let ctx = SolverContext {
        mesh: target,
        adjacency: &adjacency,
        surface: &tree,
        target_cos: &target_cos,
        to_target,
        falloff: options.falloff,
    };
    let gate = options.group.filter(|_| options.sparse);
    let status = SharedStatus::new();

    let results: Vec<Vec<Bind>> = metrics.time(TimingBucket::Bind, || {
        map_range(source.len(), |i| {
            if !status.is_ok() {
                return Vec::new();
            }
            if gate.is_some_and(|group| group.weight(i) <= 0.0) {
                return Vec::new();
            }
            match solve_vertex(&ctx, source[i]) {
                Ok(binds) => binds,
                Err(err) => {
                    status.fail(err);
                    Vec::new()
                }
            }
        })
    });

    if let Some(err) = BindError::from_status(status.get()) {
        log::warn!("bind failed: {err}");
        return Err(err);
    }

    let mut verts = Vec::new();
    verts.try_reserve_exact(results.len())?;
    for (i, binds) in results.into_iter().enumerate() {
        if gate.is_some() && binds.is_empty() {
            continue;
        }
        verts.push(BoundVertex {
            vertex_idx: i as u32,
            binds,
        });
    }
    verts.shrink_to_fit();

    if verts.is_empty() {
        log::warn!("bind failed: no vertices were bound");
        return Err(BindError::NoVerticesBound);
    }

    let data = BindData {
        matrix,
        source_vertex_count: source.len(),
        target_polygon_count: target.face_count(),
        sparse: gate.is_some(),
        target_name: options.target_name.to_owned(),
        verts,
    };

    let (ngon_binds, triangle_binds, centroid_binds) = data.mode_counts();
    let diagnostics = BindDiagnostics {
        source_vertex_count: source.len(),
        target_vertex_count: target.vertex_count(),
        target_polygon_count: target.face_count(),
        bound_vertex_count: data.bound_vertex_count(),
        ngon_binds,
        triangle_binds,
        centroid_binds,
        sparse: data.sparse,
        timing: metrics.end(),
    };

    log::debug!(
        "bind: {} vertices bound with {} records",
        diagnostics.bound_vertex_count,
        data.bind_count()
    );

    Ok((data, diagnostics))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geom::Vec3;

    fn unit_quad() -> PolyMesh {
        let positions = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(1.0, 1.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
        ];
        PolyMesh::from_polygons(positions, &[[0u32, 1, 2, 3]]).unwrap()
    }

    #[test]
    fn rejects_falloff_outside_range() {
        let quad = unit_quad();
        let source = [Point3::new(0.5, 0.5, 0.0)];
        for falloff in [1.0, 16.5, f64::NAN] {
            let options = BindOptions::new().with_falloff(falloff);
            assert!(matches!(
                bind(&source, &quad, &options),
                Err(BindError::InvalidFalloff(_))
            ));
        }
    }

    #[test]
    fn rejects_empty_target_and_singular_transforms() {
        let empty = PolyMesh::default();
        let source = [Point3::ORIGIN];
        assert_eq!(
            bind(&source, &empty, &BindOptions::new()).unwrap_err(),
            BindError::EmptyTarget
        );

        let flat = Transform::scale(1.0, 1.0, 0.0);
        let options = BindOptions::new().with_transforms(flat, Transform::identity());
        assert_eq!(
            bind(&source, &unit_quad(), &options).unwrap_err(),
            BindError::NonInvertibleTransform
        );
    }

    #[test]
    fn bind_matrix_maps_target_into_source_space() {
        let quad = unit_quad();
        let source_world = Transform::translate(Vec3::new(0.0, 0.0, 5.0));
        let target_world = Transform::translate(Vec3::new(2.0, 0.0, 5.0));
        let options = BindOptions::new().with_transforms(source_world, target_world);

        // Target centroid lands at (2.5, 0.5, 0) in source space.
        let (data, diag) = bind(&[Point3::new(2.5, 0.5, 0.0)], &quad, &options).unwrap();
        let mapped = data.matrix.apply_point(Point3::ORIGIN);
        assert!(mapped.distance_to(Point3::new(2.0, 0.0, 0.0)) < 1e-12);
        assert_eq!(diag.ngon_binds, 1);
        let weights = &data.verts[0].binds[0].vert_weights;
        assert!(weights.iter().all(|w| (w - 0.25).abs() < 1e-9));
    }

    #[test]
    fn sparse_bind_compacts_by_group_weight() {
        let quad = unit_quad();
        let source = [
            Point3::new(0.2, 0.2, 0.1),
            Point3::new(0.5, 0.5, 0.3),
            Point3::new(0.8, 0.3, -0.2),
        ];
        let group = VertexGroup::new("pin", vec![1.0, 0.0, 0.5]);
        let options = BindOptions::new().with_group(Some(&group)).with_sparse(true);
        let (data, diag) = bind(&source, &quad, &options).unwrap();

        assert!(data.sparse);
        assert_eq!(diag.bound_vertex_count, 2);
        let indices: Vec<u32> = data.verts.iter().map(|v| v.vertex_idx).collect();
        assert_eq!(indices, vec![0, 2]);

        // Without the sparse flag the group does not gate binding.
        let options = BindOptions::new().with_group(Some(&group));
        let (data, _) = bind(&source, &quad, &options).unwrap();
        assert!(!data.sparse);
        assert_eq!(data.bound_vertex_count(), 3);
    }

    #[test]
    fn sparse_bind_with_empty_selection_fails() {
        let quad = unit_quad();
        let group = VertexGroup::new("pin", vec![0.0]);
        let options = BindOptions::new().with_group(Some(&group)).with_sparse(true);
        assert_eq!(
            bind(&[Point3::new(0.5, 0.5, 0.0)], &quad, &options).unwrap_err(),
            BindError::NoVerticesBound
        );
    }

    #[test]
    fn oversized_group_is_rejected() {
        let group = VertexGroup::new("pin", vec![1.0, 1.0]);
        let options = BindOptions::new().with_group(Some(&group));
        assert_eq!(
            bind(&[Point3::ORIGIN], &unit_quad(), &options).unwrap_err(),
            BindError::IndexOutOfRange { len: 2, expected: 1 }
        );
    }
}
