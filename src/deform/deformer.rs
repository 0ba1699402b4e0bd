//! Deform pass: re-applies bind data to the live target geometry.

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::geom::polygon::newell_normal;
use crate::geom::{GeomMetrics, GeomTimingReport, Point3, PolyMesh, TimingBucket, Vec3};

use super::data::{Bind, BindData, BindMode, BoundVertex};
use super::error::DeformError;
use super::parallel::map_range;
use super::vgroup::VertexGroup;

/// Inline corner capacity of the per-bind coordinate buffer.
const DEFORM_INLINE: usize = 256;

/// Summary of a deform pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeformDiagnostics {
    pub deformed_vertices: usize,
    /// Bound vertices left in place because their group weight is zero.
    pub skipped_vertices: usize,
    pub max_displacement: f64,
    #[serde(skip)]
    pub timing: Option<GeomTimingReport>,
}

/// Position a single bind record reconstructs from `target_cos`.
fn evaluate_bind(bind: &Bind, target_cos: &[Point3]) -> Result<Vec3, DeformError> {
    if bind.vert_inds.len() < 3 || bind.vert_weights.len() != bind.expected_weight_count() {
        return Err(DeformError::MalformedBind {
            mode: bind.mode.name(),
            vertices: bind.vert_inds.len(),
            weights: bind.vert_weights.len(),
        });
    }

    let mut coords: SmallVec<[Point3; DEFORM_INLINE]> = SmallVec::new();
    for &index in &bind.vert_inds {
        let co = target_cos
            .get(index as usize)
            .ok_or(DeformError::TargetIndexOutOfRange {
                index: index as usize,
                count: target_cos.len(),
            })?;
        coords.push(*co);
    }

    let normal = newell_normal(&coords);
    let w = &bind.vert_weights;

    let mut position = match bind.mode {
        BindMode::Ngon => coords
            .iter()
            .zip(w)
            .fold(Vec3::ZERO, |acc, (co, &weight)| acc + co.to_vec3() * weight),
        BindMode::Triangle => {
            coords[0].to_vec3() * w[0] + coords[1].to_vec3() * w[1] + coords[2].to_vec3() * w[2]
        }
        BindMode::Centroid => {
            let centroid = Point3::centroid(&coords).to_vec3();
            coords[0].to_vec3() * w[0] + coords[1].to_vec3() * w[1] + centroid * w[2]
        }
    };

    position = position + normal * bind.normal_dist;
    Ok(position * bind.influence)
}

/// Reconstructs the full bound position of one vertex.
fn evaluate_vertex(vertex: &BoundVertex, target_cos: &[Point3]) -> Result<Point3, DeformError> {
    let mut offset = Vec3::ZERO;
    for bind in &vertex.binds {
        offset = offset + evaluate_bind(bind, target_cos)?;
    }
    Ok(Point3::new(offset.x, offset.y, offset.z))
}

/// Moves `positions` (source-local) towards the positions `data` reconstructs
/// on `target`.
///
/// Each bound vertex ends at `p + (bound - p) * strength * group_weight`.
/// Topology drift on either mesh is reported without touching `positions`.
pub fn deform(
    data: &BindData,
    target: &PolyMesh,
    positions: &mut [Point3],
    strength: f64,
    group: Option<&VertexGroup>,
) -> Result<DeformDiagnostics, DeformError> {
    if positions.len() != data.source_vertex_count {
        log::warn!(
            "deform: vertices changed from {} to {}",
            data.source_vertex_count,
            positions.len()
        );
        return Err(DeformError::VertexCountChanged {
            bound: data.source_vertex_count,
            current: positions.len(),
        });
    }
    if target.face_count() != data.target_polygon_count {
        log::warn!(
            "deform: target polygons changed from {} to {}",
            data.target_polygon_count,
            target.face_count()
        );
        return Err(DeformError::PolygonCountChanged {
            bound: data.target_polygon_count,
            current: target.face_count(),
        });
    }

    if strength == 0.0 {
        log::debug!("deform: zero strength, positions unchanged");
        return Ok(DeformDiagnostics::default());
    }

    let mut metrics = GeomMetrics::default();
    metrics.begin();

    let target_cos = target.transformed_positions(data.matrix);
    let current: &[Point3] = positions;

    let updates = metrics.time(TimingBucket::Deform, || {
        map_range(data.verts.len(), |i| {
            let vertex = &data.verts[i];
            let index = vertex.vertex_idx as usize;
            let original = *current.get(index).ok_or(DeformError::SourceIndexOutOfRange {
                index,
                count: current.len(),
            })?;

            let weight = group.map_or(1.0, |g| g.weight(index));
            if weight == 0.0 {
                return Ok(None);
            }

            let bound = evaluate_vertex(vertex, &target_cos)?;
            let moved = original + (bound - original) * (strength * weight);
            Ok(Some((index, moved)))
        })
    });

    let mut diagnostics = DeformDiagnostics::default();
    let mut resolved = Vec::with_capacity(updates.len());
    for update in updates {
        match update? {
            Some(entry) => resolved.push(entry),
            None => diagnostics.skipped_vertices += 1,
        }
    }

    for (index, moved) in resolved {
        let displacement = positions[index].distance_to(moved);
        diagnostics.max_displacement = diagnostics.max_displacement.max(displacement);
        positions[index] = moved;
        diagnostics.deformed_vertices += 1;
    }
    diagnostics.timing = metrics.end();

    Ok(diagnostics)
}
