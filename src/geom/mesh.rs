use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::{BBox, Point3, Transform};

/// Errors raised while assembling a [`PolyMesh`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MeshError {
    #[error("polygon {poly} has {corners} corners, at least 3 are required")]
    TooFewCorners { poly: usize, corners: usize },
    #[error("vertex index {index} out of range (vertex count {count})")]
    VertexOutOfRange { index: usize, count: usize },
    #[error("edge index {index} out of range (edge count {count})")]
    EdgeOutOfRange { index: usize, count: usize },
    #[error("polygon {poly} repeats vertex {vertex} on consecutive corners")]
    DegenerateEdge { poly: usize, vertex: usize },
    #[error("loop {corner} of polygon {poly} does not run along edge {edge}")]
    LoopEdgeMismatch {
        poly: usize,
        corner: usize,
        edge: usize,
    },
}

/// One polygon corner: the vertex it sits on and the edge leading to the
/// next corner of the same polygon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Corner {
    pub vert: u32,
    pub edge: u32,
}

/// Range of corners belonging to one polygon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Face {
    pub start: u32,
    pub len: u32,
}

impl Face {
    #[must_use]
    pub const fn range(self) -> std::ops::Range<usize> {
        self.start as usize..(self.start + self.len) as usize
    }
}

/// Polygon mesh with explicit edges and corner loops.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PolyMesh {
    positions: Vec<Point3>,
    edges: Vec<[u32; 2]>,
    faces: Vec<Face>,
    corners: Vec<Corner>,
}

impl PolyMesh {
    /// Builds a mesh from polygon vertex lists, deriving the edge table.
    ///
    /// Edges are numbered in order of first appearance and keep the direction
    /// of the corner that introduced them.
    pub fn from_polygons<P>(positions: Vec<Point3>, polygons: &[P]) -> Result<Self, MeshError>
    where
        P: AsRef<[u32]>,
    {
        let vertex_count = positions.len();
        let mut edge_lookup: HashMap<(u32, u32), u32> = HashMap::new();
        let mut edges: Vec<[u32; 2]> = Vec::new();
        let mut faces = Vec::with_capacity(polygons.len());
        let mut corners = Vec::new();

        for (poly, verts) in polygons.iter().enumerate() {
            let verts = verts.as_ref();
            if verts.len() < 3 {
                return Err(MeshError::TooFewCorners {
                    poly,
                    corners: verts.len(),
                });
            }

            let start = corners.len() as u32;
            for (i, &v) in verts.iter().enumerate() {
                if v as usize >= vertex_count {
                    return Err(MeshError::VertexOutOfRange {
                        index: v as usize,
                        count: vertex_count,
                    });
                }
                let next = verts[(i + 1) % verts.len()];
                if next == v {
                    return Err(MeshError::DegenerateEdge {
                        poly,
                        vertex: v as usize,
                    });
                }

                let key = (v.min(next), v.max(next));
                let edge = *edge_lookup.entry(key).or_insert_with(|| {
                    edges.push([v, next]);
                    (edges.len() - 1) as u32
                });
                corners.push(Corner { vert: v, edge });
            }
            faces.push(Face {
                start,
                len: verts.len() as u32,
            });
        }

        Ok(Self {
            positions,
            edges,
            faces,
            corners,
        })
    }

    /// Assembles a mesh from explicit tables, validating that every corner's
    /// edge joins it to the next corner.
    pub fn from_parts(
        positions: Vec<Point3>,
        edges: Vec<[u32; 2]>,
        faces: Vec<Face>,
        corners: Vec<Corner>,
    ) -> Result<Self, MeshError> {
        let vertex_count = positions.len();
        for &[a, b] in &edges {
            for v in [a, b] {
                if v as usize >= vertex_count {
                    return Err(MeshError::VertexOutOfRange {
                        index: v as usize,
                        count: vertex_count,
                    });
                }
            }
        }

        for (poly, face) in faces.iter().enumerate() {
            if face.len < 3 {
                return Err(MeshError::TooFewCorners {
                    poly,
                    corners: face.len as usize,
                });
            }
            let range = face.range();
            if range.end > corners.len() {
                return Err(MeshError::VertexOutOfRange {
                    index: range.end - 1,
                    count: corners.len(),
                });
            }
            let loop_corners = &corners[range];
            for (i, c) in loop_corners.iter().enumerate() {
                let Some(&[a, b]) = edges.get(c.edge as usize) else {
                    return Err(MeshError::EdgeOutOfRange {
                        index: c.edge as usize,
                        count: edges.len(),
                    });
                };
                let next = loop_corners[(i + 1) % loop_corners.len()].vert;
                let joins = (a == c.vert && b == next) || (b == c.vert && a == next);
                if !joins {
                    return Err(MeshError::LoopEdgeMismatch {
                        poly,
                        corner: i,
                        edge: c.edge as usize,
                    });
                }
            }
        }

        Ok(Self {
            positions,
            edges,
            faces,
            corners,
        })
    }

    #[must_use]
    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    #[must_use]
    pub fn face_count(&self) -> usize {
        self.faces.len()
    }

    #[must_use]
    pub fn positions(&self) -> &[Point3] {
        &self.positions
    }

    #[must_use]
    pub fn edges(&self) -> &[[u32; 2]] {
        &self.edges
    }

    #[must_use]
    pub fn faces(&self) -> &[Face] {
        &self.faces
    }

    #[must_use]
    pub fn corners(&self) -> &[Corner] {
        &self.corners
    }

    /// Corners of one polygon in loop order.
    #[must_use]
    pub fn face_corners(&self, face: usize) -> &[Corner] {
        &self.corners[self.faces[face].range()]
    }

    /// Replaces vertex positions, keeping topology. The caller supplies as many
    /// positions as the mesh has vertices.
    pub fn set_positions(&mut self, positions: Vec<Point3>) -> Result<(), MeshError> {
        if positions.len() != self.positions.len() {
            return Err(MeshError::VertexOutOfRange {
                index: positions.len(),
                count: self.positions.len(),
            });
        }
        self.positions = positions;
        Ok(())
    }

    /// Positions mapped through `xf`.
    #[must_use]
    pub fn transformed_positions(&self, xf: Transform) -> Vec<Point3> {
        self.positions.iter().map(|&p| xf.apply_point(p)).collect()
    }

    /// Fan triangulation of every polygon as `(face, [v0, v1, v2])`.
    #[must_use]
    pub fn fan_triangles(&self) -> Vec<(u32, [u32; 3])> {
        let mut tris = Vec::with_capacity(self.corners.len());
        for (face_idx, face) in self.faces.iter().enumerate() {
            let loop_corners = &self.corners[face.range()];
            let v0 = loop_corners[0].vert;
            for pair in loop_corners[1..].windows(2) {
                tris.push((face_idx as u32, [v0, pair[0].vert, pair[1].vert]));
            }
        }
        tris
    }

    #[must_use]
    pub fn bbox(&self) -> Option<BBox> {
        BBox::from_points(&self.positions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quad_positions() -> Vec<Point3> {
        vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(1.0, 1.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
            Point3::new(2.0, 0.0, 0.0),
            Point3::new(2.0, 1.0, 0.0),
        ]
    }

    #[test]
    fn shared_edges_are_deduplicated() {
        let mesh =
            PolyMesh::from_polygons(quad_positions(), &[vec![0, 1, 2, 3], vec![1, 4, 5, 2]])
                .unwrap();

        assert_eq!(mesh.face_count(), 2);
        assert_eq!(mesh.edge_count(), 7);
        assert_eq!(mesh.face_corners(0)[1].edge, mesh.face_corners(1)[3].edge);
    }

    #[test]
    fn corner_edges_follow_the_loop() {
        let mesh = PolyMesh::from_polygons(quad_positions(), &[[0u32, 1, 2, 3]]).unwrap();
        let corners = mesh.face_corners(0);
        for (i, c) in corners.iter().enumerate() {
            let next = corners[(i + 1) % corners.len()].vert;
            let [a, b] = mesh.edges()[c.edge as usize];
            assert!((a == c.vert && b == next) || (b == c.vert && a == next));
        }
    }

    #[test]
    fn rejects_bad_polygons() {
        assert_eq!(
            PolyMesh::from_polygons(quad_positions(), &[[0u32, 1]]),
            Err(MeshError::TooFewCorners { poly: 0, corners: 2 })
        );
        assert_eq!(
            PolyMesh::from_polygons(quad_positions(), &[[0u32, 1, 9]]),
            Err(MeshError::VertexOutOfRange { index: 9, count: 6 })
        );
        assert!(matches!(
            PolyMesh::from_polygons(quad_positions(), &[[0u32, 1, 1, 2]]),
            Err(MeshError::DegenerateEdge { poly: 0, vertex: 1 })
        ));
    }

    #[test]
    fn from_parts_checks_loop_edges() {
        let positions = quad_positions()[..3].to_vec();
        let edges = vec![[0, 1], [1, 2], [2, 0]];
        let faces = vec![Face { start: 0, len: 3 }];
        let good = vec![
            Corner { vert: 0, edge: 0 },
            Corner { vert: 1, edge: 1 },
            Corner { vert: 2, edge: 2 },
        ];
        assert!(
            PolyMesh::from_parts(positions.clone(), edges.clone(), faces.clone(), good).is_ok()
        );

        let bad = vec![
            Corner { vert: 0, edge: 1 },
            Corner { vert: 1, edge: 1 },
            Corner { vert: 2, edge: 2 },
        ];
        assert!(matches!(
            PolyMesh::from_parts(positions, edges, faces, bad),
            Err(MeshError::LoopEdgeMismatch { poly: 0, corner: 0, edge: 1 })
        ));
    }

    #[test]
    fn fan_triangles_cover_each_polygon() {
        let mesh =
            PolyMesh::from_polygons(quad_positions(), &[vec![0, 1, 2, 3], vec![1, 4, 5, 2]])
                .unwrap();
        let tris = mesh.fan_triangles();
        assert_eq!(tris.len(), 4);
        assert_eq!(tris[0], (0, [0, 1, 2]));
        assert_eq!(tris[1], (0, [0, 2, 3]));
        assert_eq!(tris[3].0, 1);
    }
}
