//! Surface binding and deformation.
//!
//! [`bind`] expresses every source vertex as a weighted set of interpolation
//! records over the polygons around its nearest target vertex; [`deform`]
//! re-evaluates those records on the live target every frame.
//! [`SurfaceDeformModifier`] wraps both behind the bind lifecycle.

mod adjacency;
mod anchor;
mod binder;
mod data;
mod deformer;
mod error;
mod parallel;
mod persist;
mod settings;
mod solver;
mod state;
mod vgroup;

pub use adjacency::{Adjacency, EdgePolygons};
pub use anchor::nearest_vertex;
pub use binder::{BindDiagnostics, BindOptions, bind};
pub use data::{Bind, BindData, BindMode, BoundVertex};
pub use deformer::{DeformDiagnostics, deform};
pub use error::{BindError, BindStatus, DeformError, PersistError, SurfaceDeformError};
pub use parallel::PARALLEL_THRESHOLD;
pub use persist::{decode_bind_data, encode_bind_data};
pub use settings::{DEFAULT_FALLOFF, FALLOFF_MAX, FALLOFF_MIN, SurfaceDeformSettings};
pub use state::{BindState, EvalInput, EvalOutcome, SurfaceDeformModifier, TargetRef};
pub use vgroup::VertexGroup;
