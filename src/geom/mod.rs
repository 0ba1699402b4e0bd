mod bvh;
mod core;
mod mesh;
mod metrics;
pub mod polygon;

pub use bvh::{NearestSurface, SurfaceHit, SurfaceTree};
pub use core::{BBox, Point3, Tolerance, Transform, Vec2, Vec3};
pub use mesh::{Corner, Face, MeshError, PolyMesh};
pub use metrics::{GeomMetrics, GeomTimingReport, TimingBucket};

#[cfg(test)]
mod tests;
