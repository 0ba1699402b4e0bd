//! Nearest target vertex ("anchor") for a source point.

use crate::geom::polygon::distance_squared_to_segment;
use crate::geom::{NearestSurface, Point3, PolyMesh, Transform};

/// Finds the target vertex the solver gathers polygons around.
///
/// `point` and `target_cos` are in source space; `to_target` maps source space
/// into the space `surface` was built in. The surface query only selects a
/// polygon: the anchor is the nearer endpoint of that polygon's edge closest
/// to `point`. Returns `None` when the surface is empty.
pub fn nearest_vertex<S>(
    surface: &S,
    mesh: &PolyMesh,
    target_cos: &[Point3],
    to_target: Transform,
    point: Point3,
) -> Option<usize>
where
    S: NearestSurface + ?Sized,
{
    let hit = surface.nearest(to_target.apply_point(point))?;

    let mut best_dist = f64::MAX;
    let mut best_edge = None;
    for corner in mesh.face_corners(hit.face) {
        let [a, b] = mesh.edges()[corner.edge as usize];
        let dist = distance_squared_to_segment(
            point,
            target_cos[a as usize],
            target_cos[b as usize],
        );
        if dist < best_dist {
            best_dist = dist;
            best_edge = Some(corner.edge as usize);
        }
    }

    let [a, b] = mesh.edges()[best_edge?];
    let (a, b) = (a as usize, b as usize);
    if point.distance_squared_to(target_cos[a]) < point.distance_squared_to(target_cos[b]) {
        Some(a)
    } else {
        Some(b)
    }
}
