//! Per-vertex bind weight solver.
//!
//! For one source point the solver gathers every polygon around the point's
//! anchor vertex, weighs each by an angular, a projected-distance and a raw
//! distance component, normalizes the weights and turns every polygon with
//! non-negligible weight into one or two interpolation records.

use std::f64::consts::{FRAC_PI_2, PI, SQRT_2};

use smallvec::SmallVec;

use crate::geom::polygon::{
    PlaneMapping, distance_to_line_2d, is_convex_2d, line_plane_intersection,
    mean_value_weights_2d, newell_normal, point_in_polygon_2d, triangle_area_2d,
    triangle_barycentric, triangle_normal,
};
use crate::geom::{Corner, NearestSurface, Point3, PolyMesh, Tolerance, Transform, Vec2, Vec3};

use super::adjacency::Adjacency;
use super::anchor::nearest_vertex;
use super::data::{Bind, BindMode};
use super::error::BindStatus;

const EPS: f64 = Tolerance::BIND.eps;

/// Inline corner capacity of per-polygon scratch buffers.
const SOLVER_INLINE: usize = 8;

type Coords3 = SmallVec<[Point3; SOLVER_INLINE]>;
type Coords2 = SmallVec<[Vec2; SOLVER_INLINE]>;

// ============================================================================
// Infinite weight flags
// ============================================================================

/// Weight components that collapsed below the threshold for at least one
/// polygon. Precedence when resolving: distance, then projected distance,
/// then angular.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
struct InfiniteWeights(u8);

impl InfiniteWeights {
    const ANGULAR: Self = Self(1 << 0);
    const DIST_PROJ: Self = Self(1 << 1);
    const DIST: Self = Self(1 << 2);

    const fn is_empty(self) -> bool {
        self.0 == 0
    }

    const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }
}

// ============================================================================
// Solver inputs
// ============================================================================

/// Read-only inputs shared by every vertex of one bind pass.
pub struct SolverContext<'a, S: ?Sized> {
    pub mesh: &'a PolyMesh,
    pub adjacency: &'a Adjacency,
    pub surface: &'a S,
    /// Target vertex positions mapped into source space.
    pub target_cos: &'a [Point3],
    /// Source space to target-local space, for surface queries.
    pub to_target: Transform,
    pub falloff: f64,
}

// ============================================================================
// Candidate polygons
// ============================================================================

/// A polygon around the anchor vertex together with its weight components.
#[derive(Debug, Clone)]
struct BindPolygon {
    face: usize,
    coords: Coords3,
    coords_2d: Coords2,
    point_2d: Vec2,
    centroid: Point3,
    centroid_2d: Vec2,
    normal: Vec3,
    inside: bool,

    /// Local index of the anchor corner.
    corner: usize,
    /// Local indices of the corners before and after the anchor.
    edge_verts: [usize; 2],
    /// Edges running into and out of the anchor corner.
    edges: [usize; 2],

    weight_angular: f64,
    weight_dist_proj: f64,
    weight_dist: f64,
    weight: f64,

    /// Unit vectors from the centroid to the midpoints of the two anchor edges.
    cent_edgemid_vecs: [Vec2; 2],
    scales: [f64; 2],
    scale_mid: f64,
    edgemid_angle: f64,
    corner_angles: [f64; 2],
    corner_edgemid_angles: [f64; 2],
    point_edgemid_angles: [f64; 2],

    dominant_edge: usize,
    dominant_angle_weight: f64,
}

fn interpf(target: f64, origin: f64, fac: f64) -> f64 {
    fac * target + (1.0 - fac) * origin
}

fn signf(value: f64) -> f64 {
    if value < 0.0 { -1.0 } else { 1.0 }
}

fn angular_weight(point_angle: f64, edgemid_angle: f64) -> f64 {
    ((point_angle / edgemid_angle).min(1.0) * FRAC_PI_2).sin()
}

/// Rejects projected polygons that are concave or have coincident corners.
fn validate_polygon(coords: &[Vec2]) -> Result<(), BindStatus> {
    if !is_convex_2d(coords) {
        return Err(BindStatus::Concave);
    }

    let n = coords.len();
    let mut prev_prev = coords[n - 2];
    let mut prev = coords[n - 1];
    let mut prev_vec = (prev - coords[n - 2]).normalized_or_zero();

    for &curr in coords {
        let (curr_vec, curr_len) = (curr - prev).normalize_with_length();
        if curr_len < EPS {
            return Err(BindStatus::Overlap);
        }
        let skip = prev_prev - curr;
        if skip.dot(skip) < EPS * EPS {
            return Err(BindStatus::Overlap);
        }
        // Adjacent edges running in the same direction.
        if 1.0 - prev_vec.dot(curr_vec) < EPS {
            return Err(BindStatus::Concave);
        }

        prev_prev = prev;
        prev = curr;
        prev_vec = curr_vec;
    }

    Ok(())
}

impl BindPolygon {
    fn new<S: ?Sized>(
        ctx: &SolverContext<'_, S>,
        face: usize,
        anchor: usize,
        point: Point3,
    ) -> Result<Self, BindStatus> {
        let corners = ctx.mesh.face_corners(face);
        let n = corners.len();

        let mut coords = Coords3::new();
        coords
            .try_reserve(n)
            .map_err(|_| BindStatus::OutOfMemory)?;
        let mut corner = None;
        for (j, c) in corners.iter().enumerate() {
            coords.push(ctx.target_cos[c.vert as usize]);
            if c.vert as usize == anchor {
                corner = Some(j);
            }
        }
        let corner = corner.ok_or(BindStatus::Generic)?;
        let prev = if corner == 0 { n - 1 } else { corner - 1 };
        let next = if corner == n - 1 { 0 } else { corner + 1 };
        let edges = [corners[prev].edge as usize, corners[corner].edge as usize];

        let centroid = Point3::centroid(&coords);
        let normal = newell_normal(&coords);
        let mapping = PlaneMapping::from_normal(normal);

        let point_2d = mapping.map(point);
        let mut coords_2d = Coords2::new();
        coords_2d
            .try_reserve(n)
            .map_err(|_| BindStatus::OutOfMemory)?;
        let mut centroid_2d = Vec2::ZERO;
        for &c in &coords {
            let c2 = mapping.map(c);
            coords_2d.push(c2);
            centroid_2d = centroid_2d + c2 * (1.0 / n as f64);
        }

        validate_polygon(&coords_2d)?;

        let inside = point_in_polygon_2d(point_2d, &coords_2d);

        let vert0 = coords_2d[prev];
        let vert1 = coords_2d[next];
        let corner_2d = coords_2d[corner];

        let cent_edgemid_vecs = [
            (vert0.midpoint(corner_2d) - centroid_2d).normalized_or_zero(),
            (vert1.midpoint(corner_2d) - centroid_2d).normalized_or_zero(),
        ];
        let scales = [
            distance_to_line_2d(centroid_2d, vert0, corner_2d),
            distance_to_line_2d(centroid_2d, vert1, corner_2d),
        ];
        let edgemid_angle = cent_edgemid_vecs[0].angle_normalized(cent_edgemid_vecs[1]);

        // Signed, so point angles can later be clamped on the correct side.
        let corner_vec = (corner_2d - centroid_2d).normalized_or_zero();
        let corner_angles = [
            corner_vec.angle_signed(cent_edgemid_vecs[0]),
            corner_vec.angle_signed(cent_edgemid_vecs[1]),
        ];
        let corner_edgemid_angles = [corner_angles[0].abs(), corner_angles[1].abs()];

        if scales[0] < EPS
            || scales[1] < EPS
            || edgemid_angle < EPS
            || corner_edgemid_angles[0] < EPS
            || corner_edgemid_angles[1] < EPS
        {
            return Err(BindStatus::Generic);
        }

        Ok(Self {
            face,
            weight_angular: 1.0,
            weight_dist_proj: centroid_2d.distance_to(point_2d),
            weight_dist: centroid.distance_to(point),
            weight: 0.0,
            coords,
            coords_2d,
            point_2d,
            centroid,
            centroid_2d,
            normal,
            inside,
            corner,
            edge_verts: [prev, next],
            edges,
            cent_edgemid_vecs,
            scales,
            scale_mid: 0.0,
            edgemid_angle,
            corner_angles,
            corner_edgemid_angles,
            point_edgemid_angles: [0.0; 2],
            dominant_edge: 0,
            dominant_angle_weight: 0.0,
        })
    }

    /// Angles between the point and the two edge-midpoint directions, plus the
    /// distance scale at the anchor corner.
    fn compute_point_angles(&mut self) -> Result<(), BindStatus> {
        let cent_point_vec = (self.point_2d - self.centroid_2d).normalized_or_zero();
        let mut point_angles = [
            cent_point_vec.angle_signed(self.cent_edgemid_vecs[0]) * signf(self.corner_angles[0]),
            cent_point_vec.angle_signed(self.cent_edgemid_vecs[1]) * signf(self.corner_angles[1]),
        ];

        if point_angles[0] <= 0.0 && point_angles[1] <= 0.0 {
            // Outside the wedge: clamp the nearer side, flip the other.
            if point_angles[0] < point_angles[1] {
                point_angles[0] = self.edgemid_angle - point_angles[1];
            } else {
                point_angles[1] = self.edgemid_angle - point_angles[0];
            }
        }

        self.point_edgemid_angles = [point_angles[0].max(0.0), point_angles[1].max(0.0)];

        let vert0 = self.coords_2d[self.edge_verts[0]];
        let vert1 = self.coords_2d[self.edge_verts[1]];
        let corner = self.coords_2d[self.corner];

        // Orthogonal corner-to-chord distance, scaled so a square grid keeps
        // unit scale.
        self.scale_mid = triangle_area_2d(vert0, corner, vert1) / vert0.distance_to(vert1) * SQRT_2;

        if self.inside {
            let min_dist = self.scales[0].min(self.scales[1]);
            self.scale_mid = interpf(
                self.scale_mid,
                (self.scales[0] + self.scales[1]) / 2.0,
                (self.weight_dist_proj / min_dist).min(1.0),
            );
        }

        if self.scale_mid < EPS
            || self.point_edgemid_angles[0] + self.point_edgemid_angles[1] < EPS
        {
            return Err(BindStatus::Generic);
        }

        Ok(())
    }

    /// Picks the edge the point leans towards and rescales the distance
    /// components with the interpolated polygon scale and falloff.
    fn apply_scale_and_falloff(
        &mut self,
        avg_point_dist: f64,
        falloff: f64,
    ) -> Result<(), BindStatus> {
        let corner_angle_weights = [
            self.point_edgemid_angles[0] / self.corner_edgemid_angles[0],
            self.point_edgemid_angles[1] / self.corner_edgemid_angles[1],
        ];

        if corner_angle_weights[0].is_nan() || corner_angle_weights[1].is_nan() {
            return Err(BindStatus::Generic);
        }

        if corner_angle_weights[0] < corner_angle_weights[1] {
            self.dominant_edge = 0;
            self.dominant_angle_weight = corner_angle_weights[0];
        } else {
            self.dominant_edge = 1;
            self.dominant_angle_weight = corner_angle_weights[1];
        }

        if !(0.0..=1.0).contains(&self.dominant_angle_weight) {
            return Err(BindStatus::Generic);
        }

        self.dominant_angle_weight = (self.dominant_angle_weight * FRAC_PI_2).sin();

        let dom = self.dominant_edge;
        let other = 1 - dom;

        // Clamped so skinny faces with a tiny edgemid angle stay finite.
        let edge_angle_a = self.point_edgemid_angles[dom];
        let edge_angle_b = self.point_edgemid_angles[other];
        let mut scale_weight = edge_angle_a / edge_angle_a.max(self.edgemid_angle);
        scale_weight /= scale_weight + edge_angle_b / edge_angle_b.max(self.edgemid_angle);

        let sqr = scale_weight * scale_weight;
        let inv_sqr = (1.0 - scale_weight) * (1.0 - scale_weight);
        scale_weight = sqr / (sqr + inv_sqr);

        let scale = interpf(
            self.scale_mid,
            interpf(self.scales[other], self.scales[dom], scale_weight),
            self.dominant_angle_weight,
        );

        self.weight_dist_proj = (self.weight_dist_proj / scale).powf(falloff);
        self.weight_dist = (self.weight_dist / avg_point_dist).powf(falloff);
        Ok(())
    }
}

// ============================================================================
// Weight computation
// ============================================================================

/// Gathers the polygons around the anchor of `point` and computes their
/// normalized weights.
fn compute_bind_weights<S>(
    ctx: &SolverContext<'_, S>,
    point: Point3,
) -> Result<SmallVec<[BindPolygon; SOLVER_INLINE]>, BindStatus>
where
    S: NearestSurface + ?Sized,
{
    let anchor = nearest_vertex(ctx.surface, ctx.mesh, ctx.target_cos, ctx.to_target, point)
        .ok_or(BindStatus::Generic)?;

    let mut polys: SmallVec<[BindPolygon; SOLVER_INLINE]> = SmallVec::new();
    polys
        .try_reserve(ctx.adjacency.polygon_estimate(anchor))
        .map_err(|_| BindStatus::OutOfMemory)?;

    let mut flags = InfiniteWeights::default();
    let mut avg_point_dist = 0.0;

    for edge in ctx.adjacency.vertex_edges(anchor) {
        for &face in ctx.adjacency.edge_polygons(edge).as_slice() {
            let face = face as usize;
            if polys.iter().any(|p| p.face == face) {
                continue;
            }

            let mut bpoly = BindPolygon::new(ctx, face, anchor, point)?;
            avg_point_dist += bpoly.weight_dist;

            if bpoly.weight_dist < EPS {
                flags.insert(InfiniteWeights::DIST_PROJ);
                flags.insert(InfiniteWeights::DIST);
            } else if bpoly.weight_dist_proj < EPS {
                flags.insert(InfiniteWeights::DIST_PROJ);
            } else {
                bpoly.compute_point_angles()?;
            }

            polys.push(bpoly);
        }
    }

    if polys.is_empty() {
        return Err(BindStatus::Generic);
    }
    avg_point_dist /= polys.len() as f64;

    // Angular weights couple the two polygons sharing each anchor edge.
    if flags.is_empty() {
        for edge in ctx.adjacency.vertex_edges(anchor) {
            let edge_polys = ctx.adjacency.edge_polygons(edge).as_slice();
            let mut found: SmallVec<[(usize, usize); 2]> = SmallVec::new();
            for (i, bpoly) in polys.iter().enumerate() {
                if found.len() == edge_polys.len() {
                    break;
                }
                if edge_polys.contains(&(bpoly.face as u32)) {
                    let edge_on_poly = usize::from(bpoly.edges[0] != edge);
                    found.push((i, edge_on_poly));
                }
            }

            let ang = |(i, side): (usize, usize)| {
                let p = &polys[i];
                angular_weight(p.point_edgemid_angles[side], p.edgemid_angle)
            };

            match found.as_slice() {
                &[a] => {
                    let w = ang(a);
                    polys[a.0].weight_angular *= w * w;
                }
                &[a, b] => {
                    let w = ang(a) * ang(b);
                    polys[a.0].weight_angular *= w;
                    polys[b.0].weight_angular *= w;
                }
                _ => {}
            }
        }
    }

    // Scale everything when nothing is infinite, only the raw distance when
    // the projected distance is, and nothing when the raw distance is.
    if flags.is_empty() {
        for bpoly in &mut polys {
            bpoly.apply_scale_and_falloff(avg_point_dist, ctx.falloff)?;

            if bpoly.weight_dist < EPS {
                flags.insert(InfiniteWeights::DIST_PROJ);
                flags.insert(InfiniteWeights::DIST);
            } else if bpoly.weight_dist_proj < EPS {
                flags.insert(InfiniteWeights::DIST_PROJ);
            } else if bpoly.weight_angular < EPS {
                flags.insert(InfiniteWeights::ANGULAR);
            }
        }
    } else if !flags.contains(InfiniteWeights::DIST) {
        for bpoly in &mut polys {
            bpoly.weight_dist = (bpoly.weight_dist / avg_point_dist).powf(ctx.falloff);
            if bpoly.weight_dist < EPS {
                flags.insert(InfiniteWeights::DIST);
            }
        }
    }

    let mut tot_weight = 0.0;
    for bpoly in &mut polys {
        bpoly.weight = if flags.contains(InfiniteWeights::DIST) {
            if bpoly.weight_dist < EPS { 1.0 } else { 0.0 }
        } else if flags.contains(InfiniteWeights::DIST_PROJ) {
            if bpoly.weight_dist_proj < EPS {
                1.0 / bpoly.weight_dist
            } else {
                0.0
            }
        } else if flags.contains(InfiniteWeights::ANGULAR) {
            if bpoly.weight_angular < EPS {
                1.0 / bpoly.weight_dist_proj / bpoly.weight_dist
            } else {
                0.0
            }
        } else {
            1.0 / bpoly.weight_angular / bpoly.weight_dist_proj / bpoly.weight_dist
        };

        // Uniform corner-angle scaling keeps dense triangle fans from
        // dominating.
        bpoly.weight *= bpoly.edgemid_angle / PI;
        tot_weight += bpoly.weight;
    }

    if !(tot_weight.is_finite() && tot_weight > 0.0) {
        return Err(BindStatus::Generic);
    }

    for bpoly in &mut polys {
        bpoly.weight /= tot_weight;
    }

    Ok(polys)
}

// ============================================================================
// Bind emission
// ============================================================================

/// Signed distance from the reprojection back to the point, positive on the
/// side the polygon normal faces.
fn normal_displacement(point: Point3, projected: Point3, normal: Vec3) -> f64 {
    let disp = point - projected;
    let dist = disp.length();
    if disp.dot(normal) < 0.0 { -dist } else { dist }
}

/// Polygon vertices in loop order starting at corner `start`.
fn rotated_verts(corners: &[Corner], start: usize) -> Result<Vec<u32>, BindStatus> {
    let mut inds = Vec::new();
    inds.try_reserve_exact(corners.len())
        .map_err(|_| BindStatus::OutOfMemory)?;
    inds.extend(corners[start..].iter().map(|c| c.vert));
    inds.extend(corners[..start].iter().map(|c| c.vert));
    Ok(inds)
}

fn triangle_bind(
    mode: BindMode,
    vert_inds: Vec<u32>,
    tri: [Point3; 3],
    point: Point3,
    normal: Vec3,
    influence: f64,
) -> Result<Bind, BindStatus> {
    let [v1, v2, v3] = tri;
    let cent = Point3::centroid(&tri);
    let tri_normal = triangle_normal(v1, v2, v3);

    let projected = line_plane_intersection(point, point + normal, cent, tri_normal)
        .ok_or(BindStatus::Generic)?;
    let weights = triangle_barycentric(v1, v2, v3, projected);

    Ok(Bind {
        mode,
        vert_inds,
        vert_weights: weights.to_vec(),
        influence,
        normal_dist: normal_displacement(point, projected, normal),
    })
}

fn count_binds(polys: &[BindPolygon]) -> usize {
    polys
        .iter()
        .filter(|p| p.weight >= EPS)
        .map(|p| {
            if p.inside
                || p.dominant_angle_weight < EPS
                || 1.0 - p.dominant_angle_weight < EPS
            {
                1
            } else {
                2
            }
        })
        .sum()
}

/// Computes the interpolation records binding `point` to the target.
pub fn solve_vertex<S>(ctx: &SolverContext<'_, S>, point: Point3) -> Result<Vec<Bind>, BindStatus>
where
    S: NearestSurface + ?Sized,
{
    let polys = compute_bind_weights(ctx, point)?;

    let mut binds = Vec::new();
    binds
        .try_reserve_exact(count_binds(&polys))
        .map_err(|_| BindStatus::OutOfMemory)?;

    for bpoly in polys.iter().filter(|p| p.weight >= EPS) {
        let corners = ctx.mesh.face_corners(bpoly.face);

        if bpoly.inside {
            let mut weights = Vec::new();
            weights
                .try_reserve_exact(corners.len())
                .map_err(|_| BindStatus::OutOfMemory)?;
            weights.resize(corners.len(), 0.0);
            mean_value_weights_2d(&bpoly.coords_2d, bpoly.point_2d, &mut weights);

            // Reproject with the 3D corners to restore non-planarity.
            let projected = bpoly
                .coords
                .iter()
                .zip(&weights)
                .fold(Vec3::ZERO, |acc, (c, &w)| acc + c.to_vec3() * w);
            let projected = Point3::new(projected.x, projected.y, projected.z);

            binds.push(Bind {
                mode: BindMode::Ngon,
                vert_inds: rotated_verts(corners, 0)?,
                vert_weights: weights,
                influence: bpoly.weight,
                normal_dist: normal_displacement(point, projected, bpoly.normal),
            });
            continue;
        }

        if 1.0 - bpoly.dominant_angle_weight >= EPS {
            let dominant = bpoly.edges[bpoly.dominant_edge];
            let start = corners
                .iter()
                .position(|c| c.edge as usize == dominant)
                .ok_or(BindStatus::Generic)?;
            let vert_inds = rotated_verts(corners, start)?;
            let tri = [
                ctx.target_cos[vert_inds[0] as usize],
                ctx.target_cos[vert_inds[1] as usize],
                bpoly.centroid,
            ];
            binds.push(triangle_bind(
                BindMode::Centroid,
                vert_inds,
                tri,
                point,
                bpoly.normal,
                bpoly.weight * (1.0 - bpoly.dominant_angle_weight),
            )?);
        }

        if bpoly.dominant_angle_weight >= EPS {
            let vert_inds = rotated_verts(corners, bpoly.edge_verts[0])?;
            let tri = [
                ctx.target_cos[vert_inds[0] as usize],
                ctx.target_cos[vert_inds[1] as usize],
                ctx.target_cos[vert_inds[2] as usize],
            ];
            binds.push(triangle_bind(
                BindMode::Triangle,
                vert_inds,
                tri,
                point,
                bpoly.normal,
                bpoly.weight * bpoly.dominant_angle_weight,
            )?);
        }
    }

    // Records under EPS were dropped; the kept influences must still sum to 1.
    let total: f64 = binds.iter().map(|b| b.influence).sum();
    if !(total.is_finite() && total > 0.0) {
        return Err(BindStatus::Generic);
    }
    for bind in &mut binds {
        bind.influence /= total;
    }

    Ok(binds)
}
