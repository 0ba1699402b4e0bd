//! Polygon and triangle primitives shared by the binder and the deformer.
//!
//! Polygons are passed as slices of corner coordinates in loop order. Planar
//! routines operate on polygons already mapped onto their own plane with
//! [`PlaneMapping`].

use super::{Point3, Vec2, Vec3};

/// Newell normal of a (possibly non-planar) polygon, normalized.
///
/// Degenerate polygons yield [`Vec3::ZERO`].
#[must_use]
pub fn newell_normal(points: &[Point3]) -> Vec3 {
    let Some(&last) = points.last() else {
        return Vec3::ZERO;
    };

    let mut n = Vec3::ZERO;
    let mut prev = last;
    for &curr in points {
        n.x += (prev.y - curr.y) * (prev.z + curr.z);
        n.y += (prev.z - curr.z) * (prev.x + curr.x);
        n.z += (prev.x - curr.x) * (prev.y + curr.y);
        prev = curr;
    }

    n.normalized().unwrap_or(Vec3::ZERO)
}

/// Normal of the triangle `(a, b, c)`, or [`Vec3::ZERO`] when degenerate.
#[must_use]
pub fn triangle_normal(a: Point3, b: Point3, c: Point3) -> Vec3 {
    (a - b).cross(b - c).normalized().unwrap_or(Vec3::ZERO)
}

/// Unsigned area of a planar triangle.
#[must_use]
pub fn triangle_area_2d(a: Vec2, b: Vec2, c: Vec2) -> f64 {
    0.5 * ((a.x - b.x) * (b.y - c.y) + (a.y - b.y) * (c.x - b.x)).abs()
}

// ─────────────────────────────────────────────────────────────────────────────
// Plane mapping
// ─────────────────────────────────────────────────────────────────────────────

/// Rotation that takes a polygon normal onto +Z, used to flatten a polygon.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaneMapping {
    axis: Vec3,
    angle: f64,
}

impl PlaneMapping {
    /// Builds the mapping for a unit `normal`. When the normal is (anti)parallel
    /// to +Z the axis collapses to zero and the rotation degrades to a scale by
    /// `cos(angle)`, which keeps the polygon's orientation either way.
    #[must_use]
    pub fn from_normal(normal: Vec3) -> Self {
        let angle = normal.angle_normalized(Vec3::Z);
        let axis = normal.cross(Vec3::Z).normalized().unwrap_or(Vec3::ZERO);
        Self { axis, angle }
    }

    #[must_use]
    pub fn map(self, p: Point3) -> Vec2 {
        let r = p.to_vec3().rotated_around(self.axis, self.angle);
        Vec2::new(r.x, r.y)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Planar predicates
// ─────────────────────────────────────────────────────────────────────────────

/// Convexity test by consistency of the turning direction at every corner.
/// Collinear corners do not count as a turn in either direction.
#[must_use]
pub fn is_convex_2d(verts: &[Vec2]) -> bool {
    let n = verts.len();
    if n < 3 {
        return false;
    }

    let mut saw_negative = false;
    let mut saw_positive = false;

    let mut co_prev = verts[n - 1];
    let mut dir_prev = verts[n - 2] - co_prev;

    for &co_curr in verts {
        let dir_curr = co_prev - co_curr;
        let cross = dir_prev.cross(dir_curr);

        if cross < 0.0 {
            saw_negative = true;
        } else if cross > 0.0 {
            saw_positive = true;
        }

        if saw_negative && saw_positive {
            return false;
        }

        dir_prev = dir_curr;
        co_prev = co_curr;
    }

    true
}

/// Even-odd crossing test. Points on the boundary may fall on either side.
#[must_use]
pub fn point_in_polygon_2d(p: Vec2, verts: &[Vec2]) -> bool {
    let n = verts.len();
    if n < 3 {
        return false;
    }

    let mut inside = false;
    let mut j = n - 1;
    for i in 0..n {
        let vi = verts[i];
        let vj = verts[j];
        if ((vi.y > p.y) != (vj.y > p.y))
            && (p.x < (vj.x - vi.x) * (p.y - vi.y) / (vj.y - vi.y) + vi.x)
        {
            inside = !inside;
        }
        j = i;
    }
    inside
}

/// Parameter of the projection of `p` onto the line through `a` and `b`.
/// Returns `0.0` for a zero-length line.
#[must_use]
pub fn line_point_factor_2d(p: Vec2, a: Vec2, b: Vec2) -> f64 {
    let u = b - a;
    let h = p - a;
    let denom = u.dot(u);
    if denom == 0.0 { 0.0 } else { u.dot(h) / denom }
}

/// Distance from `p` to the infinite line through `a` and `b`.
#[must_use]
pub fn distance_to_line_2d(p: Vec2, a: Vec2, b: Vec2) -> f64 {
    let t = line_point_factor_2d(p, a, b);
    let closest = a + (b - a) * t;
    p.distance_to(closest)
}

/// Squared distance from `p` to the segment `[a, b]`.
#[must_use]
pub fn distance_squared_to_segment_2d(p: Vec2, a: Vec2, b: Vec2) -> f64 {
    let t = line_point_factor_2d(p, a, b).clamp(0.0, 1.0);
    let closest = a + (b - a) * t;
    let d = p - closest;
    d.dot(d)
}

/// Squared distance from `p` to the segment `[a, b]`.
#[must_use]
pub fn distance_squared_to_segment(p: Point3, a: Point3, b: Point3) -> f64 {
    let u = b - a;
    let denom = u.dot(u);
    let t = if denom == 0.0 {
        0.0
    } else {
        (u.dot(p - a) / denom).clamp(0.0, 1.0)
    };
    p.distance_squared_to(a + u * t)
}

// ─────────────────────────────────────────────────────────────────────────────
// Interpolation weights
// ─────────────────────────────────────────────────────────────────────────────

/// Corners closer than this snap to point/edge interpolation.
const MEAN_VALUE_EPS: f64 = 1.0e-5;

#[derive(Clone, Copy)]
struct DirLen {
    dir: Vec2,
    len: f64,
}

impl DirLen {
    fn between(a: Vec2, b: Vec2) -> Self {
        let dir = a - b;
        Self {
            dir,
            len: dir.length(),
        }
    }
}

fn mean_value_half_tan(curr: DirLen, next: DirLen) -> f64 {
    let area = curr.dir.cross(next.dir);
    if area != 0.0 {
        let dot = curr.dir.dot(next.dir);
        let len = curr.len * next.len;
        let result = (len - dot) / area;
        if result.is_finite() {
            return result;
        }
    }
    0.0
}

/// Mean value coordinates of `p` inside a planar polygon, written into `w`.
///
/// Points on (or very near) a corner or an edge fall back to point or linear
/// edge interpolation. The weights sum to one unless the polygon is fully
/// degenerate, in which case they are all zero.
pub fn mean_value_weights_2d(verts: &[Vec2], p: Vec2, w: &mut [f64]) {
    let n = verts.len();
    debug_assert_eq!(w.len(), n);
    if n == 0 {
        return;
    }

    enum Snap {
        Point,
        Segment,
    }

    let eps_sq = MEAN_VALUE_EPS * MEAN_VALUE_EPS;
    let mut total = 0.0;
    let mut snap = None;

    let mut i_curr = n - 1;
    let mut i_next = 0;

    let mut d_next = DirLen::between(verts[i_curr], p);
    let mut ht_prev = mean_value_half_tan(DirLen::between(verts[(n + n - 2) % n], p), d_next);

    while i_next < n {
        if d_next.len < MEAN_VALUE_EPS {
            snap = Some(Snap::Point);
            break;
        }
        if distance_squared_to_segment_2d(p, verts[i_curr], verts[i_next]) < eps_sq {
            snap = Some(Snap::Segment);
            break;
        }

        let d_curr = d_next;
        d_next = DirLen::between(verts[i_next], p);
        let ht = mean_value_half_tan(d_curr, d_next);
        w[i_curr] = if d_curr.len == 0.0 {
            0.0
        } else {
            (ht_prev + ht) / d_curr.len
        };
        total += w[i_curr];

        i_curr = i_next;
        i_next += 1;
        ht_prev = ht;
    }

    match snap {
        Some(Snap::Point) => {
            w.fill(0.0);
            w[i_curr] = 1.0;
        }
        Some(Snap::Segment) => {
            w.fill(0.0);
            let fac = line_point_factor_2d(p, verts[i_curr], verts[i_next]).clamp(0.0, 1.0);
            w[i_curr] = 1.0 - fac;
            w[i_next] = fac;
        }
        None => {
            if total != 0.0 {
                for wi in w.iter_mut() {
                    *wi /= total;
                }
            }
        }
    }
}

/// Signed barycentric weights of `p` with respect to triangle `(a, b, c)`.
///
/// Points outside the triangle yield negative components; the weights always
/// sum to one. Zero-area triangles yield equal thirds.
#[must_use]
pub fn triangle_barycentric(a: Point3, b: Point3, c: Point3, p: Point3) -> [f64; 3] {
    let n = (b - a).cross(c - a);
    let wa = n.dot((b - p).cross(c - p));
    let wb = n.dot((c - p).cross(a - p));
    let wc = n.dot((a - p).cross(b - p));
    // The three sub-areas always add up to |n|^2.
    let total = n.length_squared();

    if total.is_finite() && total.sqrt() > f64::from(f32::EPSILON) {
        [wa / total, wb / total, wc / total]
    } else {
        [1.0 / 3.0; 3]
    }
}

/// Intersection of the infinite line through `l1` and `l2` with a plane.
/// Returns `None` when the line is (nearly) parallel to the plane.
#[must_use]
pub fn line_plane_intersection(
    l1: Point3,
    l2: Point3,
    plane_co: Point3,
    plane_no: Vec3,
) -> Option<Point3> {
    let u = l2 - l1;
    let dot = plane_no.dot(u);
    if dot.abs() > f64::from(f32::EPSILON) {
        let h = l1 - plane_co;
        let lambda = -plane_no.dot(h) / dot;
        Some(l1 + u * lambda)
    } else {
        None
    }
}

/// Closest point to `p` on triangle `(a, b, c)` by Voronoi region tests.
#[must_use]
pub fn closest_point_on_triangle(p: Point3, a: Point3, b: Point3, c: Point3) -> Point3 {
    let ab = b - a;
    let ac = c - a;
    let ap = p - a;
    let d1 = ab.dot(ap);
    let d2 = ac.dot(ap);
    if d1 <= 0.0 && d2 <= 0.0 {
        return a;
    }

    let bp = p - b;
    let d3 = ab.dot(bp);
    let d4 = ac.dot(bp);
    if d3 >= 0.0 && d4 <= d3 {
        return b;
    }

    let vc = d1 * d4 - d3 * d2;
    if vc <= 0.0 && d1 >= 0.0 && d3 <= 0.0 {
        let v = d1 / (d1 - d3);
        return a + ab * v;
    }

    let cp = p - c;
    let d5 = ab.dot(cp);
    let d6 = ac.dot(cp);
    if d6 >= 0.0 && d5 <= d6 {
        return c;
    }

    let vb = d5 * d2 - d1 * d6;
    if vb <= 0.0 && d2 >= 0.0 && d6 <= 0.0 {
        let w = d2 / (d2 - d6);
        return a + ac * w;
    }

    let va = d3 * d6 - d5 * d4;
    if va <= 0.0 && (d4 - d3) >= 0.0 && (d5 - d6) >= 0.0 {
        let w = (d4 - d3) / ((d4 - d3) + (d5 - d6));
        return b + (c - b) * w;
    }

    let denom = va + vb + vc;
    if denom == 0.0 || !denom.is_finite() {
        return a;
    }
    let v = vb / denom;
    let w = vc / denom;
    a + ab * v + ac * w
}
