use std::cmp::Ordering;
use std::collections::BinaryHeap;

use super::polygon::closest_point_on_triangle;
use super::{BBox, Point3, PolyMesh};

#[derive(Debug, Clone, Copy)]
struct BvhNode {
    bbox: BBox,
    left: u32,
    right: u32,
    start: u32,
    count: u32,
}

impl BvhNode {
    const fn leaf(bbox: BBox, start: u32, count: u32) -> Self {
        Self {
            bbox,
            left: u32::MAX,
            right: u32::MAX,
            start,
            count,
        }
    }

    const fn inner(bbox: BBox, left: u32, right: u32) -> Self {
        Self {
            bbox,
            left,
            right,
            start: 0,
            count: 0,
        }
    }

    const fn is_leaf(self) -> bool {
        self.count != 0
    }
}

#[derive(Debug, Clone)]
pub(crate) struct Bvh {
    nodes: Vec<BvhNode>,
    prim_indices: Vec<u32>,
}

impl Bvh {
    const DEFAULT_LEAF_SIZE: usize = 8;

    #[must_use]
    pub(crate) fn build(bboxes: &[BBox]) -> Option<Self> {
        Self::build_with_leaf_size(bboxes, Self::DEFAULT_LEAF_SIZE)
    }

    #[must_use]
    pub(crate) fn build_with_leaf_size(bboxes: &[BBox], leaf_size: usize) -> Option<Self> {
        if bboxes.is_empty() {
            return None;
        }

        let leaf_size = leaf_size.clamp(1, 256);
        let prim_indices: Vec<u32> = (0..(bboxes.len() as u32)).collect();
        let nodes = Vec::with_capacity(bboxes.len().saturating_mul(2));

        let mut bvh = Self { nodes, prim_indices };
        bvh.build_node(bboxes, 0, bboxes.len(), leaf_size);
        Some(bvh)
    }

    fn build_node(&mut self, bboxes: &[BBox], start: usize, end: usize, leaf_size: usize) -> u32 {
        let node_index = self.nodes.len() as u32;
        let seed_bbox = bboxes[self.prim_indices[start] as usize];
        self.nodes.push(BvhNode::leaf(seed_bbox, 0, 0));

        let bbox = self.range_bbox(bboxes, start, end);
        let count = end - start;

        if count <= leaf_size {
            self.nodes[node_index as usize] = BvhNode::leaf(bbox, start as u32, count as u32);
            return node_index;
        }

        let axis = self.choose_split_axis(bboxes, start, end);
        let mid = start + count / 2;
        self.prim_indices[start..end].select_nth_unstable_by(mid - start, |a, b| {
            let ca = centroid_component(bboxes[*a as usize], axis);
            let cb = centroid_component(bboxes[*b as usize], axis);
            ca.total_cmp(&cb)
        });

        let left = self.build_node(bboxes, start, mid, leaf_size);
        let right = self.build_node(bboxes, mid, end, leaf_size);
        self.nodes[node_index as usize] = BvhNode::inner(bbox, left, right);
        node_index
    }

    fn range_bbox(&self, bboxes: &[BBox], start: usize, end: usize) -> BBox {
        let mut bbox = bboxes[self.prim_indices[start] as usize];
        for &idx in &self.prim_indices[(start + 1)..end] {
            bbox = bbox.union(bboxes[idx as usize]);
        }
        bbox
    }

    fn choose_split_axis(&self, bboxes: &[BBox], start: usize, end: usize) -> u8 {
        let first = bboxes[self.prim_indices[start] as usize].center();
        let mut min = first;
        let mut max = first;

        for &idx in &self.prim_indices[(start + 1)..end] {
            let c = bboxes[idx as usize].center();
            min.x = min.x.min(c.x);
            min.y = min.y.min(c.y);
            min.z = min.z.min(c.z);
            max.x = max.x.max(c.x);
            max.y = max.y.max(c.y);
            max.z = max.z.max(c.z);
        }

        let ex = max.x - min.x;
        let ey = max.y - min.y;
        let ez = max.z - min.z;

        if ex >= ey && ex >= ez {
            0
        } else if ey >= ez {
            1
        } else {
            2
        }
    }

    /// Best-first search for the primitive minimizing `distance_to_prim`
    /// (a squared distance). Primitives farther than `best_dist2` are ignored.
    pub(crate) fn nearest<F>(
        &self,
        point: Point3,
        best_dist2: f64,
        mut distance_to_prim: F,
    ) -> Option<(usize, f64)>
    where
        F: FnMut(usize) -> Option<f64>,
    {
        if self.nodes.is_empty() {
            return None;
        }

        let mut best_dist2 = best_dist2;
        let mut best_prim: Option<usize> = None;

        let root_dist2 = bbox_distance_squared_to_point(self.nodes[0].bbox, point);
        let mut heap = BinaryHeap::new();
        heap.push(HeapEntry {
            dist2: root_dist2,
            node: 0u32,
        });

        while let Some(entry) = heap.pop() {
            if entry.dist2 > best_dist2 {
                break;
            }

            let node = self.nodes[entry.node as usize];
            if node.is_leaf() {
                let start = node.start as usize;
                let end = start + node.count as usize;
                for &prim in &self.prim_indices[start..end] {
                    let prim_idx = prim as usize;
                    let Some(d2) = distance_to_prim(prim_idx) else {
                        continue;
                    };
                    if !d2.is_finite() {
                        continue;
                    }
                    if d2 < best_dist2 {
                        best_dist2 = d2;
                        best_prim = Some(prim_idx);
                    }
                }
                continue;
            }

            for child in [node.left, node.right] {
                let child_dist2 =
                    bbox_distance_squared_to_point(self.nodes[child as usize].bbox, point);
                if child_dist2 <= best_dist2 {
                    heap.push(HeapEntry {
                        dist2: child_dist2,
                        node: child,
                    });
                }
            }
        }

        best_prim.map(|idx| (idx, best_dist2))
    }
}

fn centroid_component(bbox: BBox, axis: u8) -> f64 {
    let c = bbox.center();
    match axis {
        0 => c.x,
        1 => c.y,
        _ => c.z,
    }
}

pub(crate) fn bbox_distance_squared_to_point(bbox: BBox, point: Point3) -> f64 {
    let axis_gap = |p: f64, min: f64, max: f64| {
        if p < min {
            min - p
        } else if p > max {
            p - max
        } else {
            0.0
        }
    };
    let dx = axis_gap(point.x, bbox.min.x, bbox.max.x);
    let dy = axis_gap(point.y, bbox.min.y, bbox.max.y);
    let dz = axis_gap(point.z, bbox.min.z, bbox.max.z);
    dx * dx + dy * dy + dz * dz
}

#[derive(Debug, Clone, Copy)]
struct HeapEntry {
    dist2: f64,
    node: u32,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.dist2 == other.dist2 && self.node == other.node
    }
}

impl Eq for HeapEntry {}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse ordering so BinaryHeap acts as a min-heap on dist2.
        other
            .dist2
            .total_cmp(&self.dist2)
            .then_with(|| self.node.cmp(&other.node))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Surface queries
// ─────────────────────────────────────────────────────────────────────────────

/// Result of a nearest-point-on-surface query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SurfaceHit {
    /// Polygon owning the closest triangle.
    pub face: usize,
    pub point: Point3,
    pub dist2: f64,
}

/// Spatial index answering nearest-point-on-surface queries for a mesh.
pub trait NearestSurface {
    fn nearest(&self, point: Point3) -> Option<SurfaceHit>;
}

/// BVH over the fan triangulation of a [`PolyMesh`], in the mesh's own space.
#[derive(Debug, Clone)]
pub struct SurfaceTree {
    bvh: Option<Bvh>,
    positions: Vec<Point3>,
    tris: Vec<(u32, [u32; 3])>,
}

impl SurfaceTree {
    #[must_use]
    pub fn new(mesh: &PolyMesh) -> Self {
        let positions = mesh.positions().to_vec();
        let tris = mesh.fan_triangles();
        let bboxes: Vec<BBox> = tris
            .iter()
            .map(|(_, [a, b, c])| {
                BBox::new(positions[*a as usize], positions[*a as usize])
                    .expand_point(positions[*b as usize])
                    .expand_point(positions[*c as usize])
            })
            .collect();

        Self {
            bvh: Bvh::build(&bboxes),
            positions,
            tris,
        }
    }

    #[must_use]
    pub fn triangle_count(&self) -> usize {
        self.tris.len()
    }

    fn closest_on_tri(&self, tri: usize, point: Point3) -> Point3 {
        let [a, b, c] = self.tris[tri].1;
        closest_point_on_triangle(
            point,
            self.positions[a as usize],
            self.positions[b as usize],
            self.positions[c as usize],
        )
    }
}

impl NearestSurface for SurfaceTree {
    fn nearest(&self, point: Point3) -> Option<SurfaceHit> {
        let bvh = self.bvh.as_ref()?;
        let (tri, dist2) = bvh.nearest(point, f64::INFINITY, |prim| {
            Some(self.closest_on_tri(prim, point).distance_squared_to(point))
        })?;

        Some(SurfaceHit {
            face: self.tris[tri].0 as usize,
            point: self.closest_on_tri(tri, point),
            dist2,
        })
    }
}
