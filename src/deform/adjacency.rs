//! Vertex → edge and edge → polygon adjacency of a target mesh.
//!
//! Per-vertex edge lists are singly linked through an arena; every cross
//! reference is an index into it. Lists are built by prepending, so a vertex's
//! edges come back in reverse edge order.

use crate::geom::PolyMesh;

use super::error::BindError;

/// Polygons incident to one edge. A manifold edge has at most two.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EdgePolygons {
    polys: [u32; 2],
    count: u8,
}

impl EdgePolygons {
    #[must_use]
    pub fn as_slice(&self) -> &[u32] {
        &self.polys[..usize::from(self.count)]
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.count as usize
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.count == 0
    }

    fn push(&mut self, poly: u32) -> Result<(), BindError> {
        if self.count >= 2 {
            return Err(BindError::NonManifold);
        }
        self.polys[usize::from(self.count)] = poly;
        self.count += 1;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
struct AdjacencyEntry {
    edge: u32,
    next: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct Adjacency {
    heads: Vec<Option<u32>>,
    /// Sum of incident-polygon counts over each vertex's edges. Every polygon
    /// around a manifold vertex is counted twice.
    poly_slots: Vec<u32>,
    entries: Vec<AdjacencyEntry>,
    edge_polys: Vec<EdgePolygons>,
}

impl Adjacency {
    /// Builds adjacency for `mesh`, failing on any edge shared by more than
    /// two polygons.
    pub fn build(mesh: &PolyMesh) -> Result<Self, BindError> {
        let vertex_count = mesh.vertex_count();
        let edge_count = mesh.edge_count();

        let mut edge_polys = Vec::new();
        edge_polys.try_reserve_exact(edge_count)?;
        edge_polys.resize(edge_count, EdgePolygons::default());

        for face in 0..mesh.face_count() {
            for corner in mesh.face_corners(face) {
                edge_polys[corner.edge as usize].push(face as u32)?;
            }
        }

        let mut heads = Vec::new();
        heads.try_reserve_exact(vertex_count)?;
        heads.resize(vertex_count, None);

        let mut poly_slots = Vec::new();
        poly_slots.try_reserve_exact(vertex_count)?;
        poly_slots.resize(vertex_count, 0u32);

        let mut entries = Vec::new();
        entries.try_reserve_exact(edge_count * 2)?;

        for (edge, &[v1, v2]) in mesh.edges().iter().enumerate() {
            let incident = edge_polys[edge].len() as u32;
            for v in [v1 as usize, v2 as usize] {
                entries.push(AdjacencyEntry {
                    edge: edge as u32,
                    next: heads[v],
                });
                heads[v] = Some((entries.len() - 1) as u32);
                poly_slots[v] += incident;
            }
        }

        log::debug!(
            "adjacency: {} vertices, {} edges, {} polygons",
            vertex_count,
            edge_count,
            mesh.face_count()
        );

        Ok(Self {
            heads,
            poly_slots,
            entries,
            edge_polys,
        })
    }

    /// Edges touching `vertex`, most recently inserted first.
    pub fn vertex_edges(&self, vertex: usize) -> VertexEdges<'_> {
        VertexEdges {
            adjacency: self,
            cursor: self.heads.get(vertex).copied().flatten(),
        }
    }

    /// Number of distinct polygons around `vertex` on a manifold mesh.
    #[must_use]
    pub fn polygon_estimate(&self, vertex: usize) -> usize {
        self.poly_slots.get(vertex).map_or(0, |&n| n as usize / 2)
    }

    #[must_use]
    pub fn edge_polygons(&self, edge: usize) -> &EdgePolygons {
        &self.edge_polys[edge]
    }
}

/// Iterator over a vertex's linked edge list.
pub struct VertexEdges<'a> {
    adjacency: &'a Adjacency,
    cursor: Option<u32>,
}

impl Iterator for VertexEdges<'_> {
    type Item = usize;

    fn next(&mut self) -> Option<Self::Item> {
        let entry = self.adjacency.entries[self.cursor? as usize];
        self.cursor = entry.next;
        Some(entry.edge as usize)
    }
}
