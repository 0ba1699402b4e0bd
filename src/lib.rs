#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod deform;
pub mod geom;

use std::fmt;

use deform::{
    BindDiagnostics, EvalInput, EvalOutcome, SurfaceDeformModifier, SurfaceDeformSettings,
    TargetRef,
};
use geom::{MeshError, Point3, PolyMesh, Transform};
#[cfg(target_arch = "wasm32")]
use wasm_bindgen::JsError;
use wasm_bindgen::prelude::*;

cfg_if::cfg_if! {
    if #[cfg(all(feature = "console_error_panic_hook", target_arch = "wasm32"))] {
        #[wasm_bindgen(start)]
        pub fn initialize() {
            console_error_panic_hook::set_once();
            init_logger();
        }
    } else {
        #[wasm_bindgen(start)]
        pub fn initialize() {
            init_logger();
        }
    }
}

#[cfg(feature = "debug_logs")]
fn init_logger() {
    use log::LevelFilter;
    use wasm_bindgen_console_logger::DEFAULT_LOGGER;
    if log::set_logger(&DEFAULT_LOGGER).is_ok() {
        log::set_max_level(LevelFilter::Debug);
    }
}

#[cfg(not(feature = "debug_logs"))]
fn init_logger() {}

#[cfg(all(feature = "parallel", target_arch = "wasm32"))]
#[wasm_bindgen]
pub async fn initialize_parallel(worker_count: Option<u32>) -> Result<(), JsError> {
    let threads = worker_count
        .map(|count| count.max(1) as usize)
        .or_else(|| {
            std::thread::available_parallelism()
                .map(|value| value.get())
                .ok()
        })
        .unwrap_or(1);

    wasm_bindgen_rayon::init_thread_pool(threads)
        .await
        .map_err(|err| JsError::new(&format!("could not start the rayon thread pool: {err}")))
}

/// Wasm entry point: one source mesh bound to one target mesh.
#[wasm_bindgen]
pub struct SurfaceDeformEngine {
    modifier: SurfaceDeformModifier,
    /// Rest positions of the source mesh, as passed to `bind`.
    source: Vec<Point3>,
    target: Option<PolyMesh>,
    last_bind: Option<BindDiagnostics>,
}

impl Default for SurfaceDeformEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[wasm_bindgen]
impl SurfaceDeformEngine {
    #[wasm_bindgen(constructor)]
    #[must_use]
    pub fn new() -> SurfaceDeformEngine {
        SurfaceDeformEngine {
            modifier: SurfaceDeformModifier::default(),
            source: Vec::new(),
            target: None,
            last_bind: None,
        }
    }

    /// Stores the source rest positions and the target topology without
    /// binding. Required before `import_bind_data`.
    #[wasm_bindgen]
    pub fn load_meshes(
        &mut self,
        source_flat: &[f64],
        target_flat: &[f64],
        target_faces: &[u32],
        face_sizes: &[u32],
    ) -> Result<(), JsValue> {
        let source = points_from_flat(source_flat).map_err(to_js_error)?;
        let target = mesh_from_flat(target_flat, target_faces, face_sizes).map_err(to_js_error)?;
        self.source = source;
        self.target = Some(target);
        Ok(())
    }

    /// Binds the source positions to the target mesh. Faces are given as a
    /// flat vertex index list split by `face_sizes`.
    #[wasm_bindgen]
    pub fn bind(
        &mut self,
        source_flat: &[f64],
        target_flat: &[f64],
        target_faces: &[u32],
        face_sizes: &[u32],
        falloff: f64,
    ) -> Result<(), JsValue> {
        self.load_meshes(source_flat, target_flat, target_faces, face_sizes)?;
        self.modifier.settings_mut().falloff = falloff;
        self.modifier.request_bind();

        let mut positions = self.source.clone();
        let outcome = self
            .modifier
            .evaluate(&mut positions, &Self::input(self.target.as_ref()))
            .map_err(to_js_error)?;
        if let EvalOutcome::Bound(diagnostics) = outcome {
            self.last_bind = Some(diagnostics);
        }
        Ok(())
    }

    /// Deforms the rest positions against new target positions (same
    /// topology) and returns the result as a flat array.
    #[wasm_bindgen]
    pub fn deform(&mut self, target_flat: &[f64], strength: f64) -> Result<Vec<f64>, JsValue> {
        let positions = points_from_flat(target_flat).map_err(to_js_error)?;
        let target = self
            .target
            .as_mut()
            .ok_or_else(|| js_error("no target mesh loaded"))?;
        target.set_positions(positions).map_err(to_js_error)?;

        self.modifier.settings_mut().strength = strength;
        let mut positions = self.source.clone();
        self.modifier
            .evaluate(&mut positions, &Self::input(self.target.as_ref()))
            .map_err(to_js_error)?;
        Ok(flatten(&positions))
    }

    #[wasm_bindgen]
    pub fn is_bound(&self) -> bool {
        self.modifier.is_bound()
    }

    #[wasm_bindgen]
    pub fn unbind(&mut self) {
        self.modifier.unbind();
        self.last_bind = None;
    }

    #[wasm_bindgen]
    pub fn export_bind_data(&self) -> Result<Vec<u8>, JsValue> {
        self.modifier
            .export_bind_data()
            .map_err(to_js_error)?
            .ok_or_else(|| js_error("modifier is not bound"))
    }

    #[wasm_bindgen]
    pub fn import_bind_data(&mut self, bytes: &[u8]) -> Result<(), JsValue> {
        self.modifier.import_bind_data(bytes).map_err(to_js_error)?;
        self.last_bind = None;
        Ok(())
    }

    /// Diagnostics of the most recent bind, or `null`.
    #[wasm_bindgen]
    pub fn bind_summary(&self) -> Result<JsValue, JsValue> {
        serde_wasm_bindgen::to_value(&self.last_bind).map_err(to_js_error)
    }

    /// Message of the most recent failure, if the last call failed.
    #[wasm_bindgen]
    pub fn last_error(&self) -> Option<String> {
        self.modifier.last_error().map(str::to_owned)
    }
}

impl SurfaceDeformEngine {
    fn input(target: Option<&PolyMesh>) -> EvalInput<'_> {
        EvalInput::new(target.map(|mesh| TargetRef {
            mesh,
            world: Transform::identity(),
            name: "target",
        }))
    }

    /// Replaces the modifier settings, keeping the bind state.
    pub fn configure(&mut self, settings: SurfaceDeformSettings) {
        *self.modifier.settings_mut() = settings;
    }
}

/// Parses a flat `[x, y, z, x, y, z, ...]` array.
pub fn points_from_flat(flat: &[f64]) -> Result<Vec<Point3>, String> {
    if flat.len() % 3 != 0 {
        return Err(format!(
            "coordinate array length {} is not a multiple of 3",
            flat.len()
        ));
    }
    Ok(flat
        .chunks_exact(3)
        .map(|c| Point3::new(c[0], c[1], c[2]))
        .collect())
}

/// Builds a mesh from flat coordinates and a face index list split by
/// `face_sizes`.
pub fn mesh_from_flat(
    positions_flat: &[f64],
    faces: &[u32],
    face_sizes: &[u32],
) -> Result<PolyMesh, String> {
    let positions = points_from_flat(positions_flat)?;
    let total: usize = face_sizes.iter().map(|&n| n as usize).sum();
    if total != faces.len() {
        return Err(format!(
            "face sizes add up to {total} indices but {} were given",
            faces.len()
        ));
    }

    let mut polygons = Vec::with_capacity(face_sizes.len());
    let mut start = 0;
    for &size in face_sizes {
        let end = start + size as usize;
        polygons.push(&faces[start..end]);
        start = end;
    }

    PolyMesh::from_polygons(positions, &polygons).map_err(|err: MeshError| err.to_string())
}

#[must_use]
pub fn flatten(points: &[Point3]) -> Vec<f64> {
    points.iter().flat_map(|p| p.to_array()).collect()
}

fn to_js_error<E: fmt::Display>(error: E) -> JsValue {
    js_error(&error.to_string())
}

fn js_error(message: &str) -> JsValue {
    #[cfg(target_arch = "wasm32")]
    {
        JsError::new(message).into()
    }
    #[cfg(not(target_arch = "wasm32"))]
    {
        let _ = message;
        JsValue::NULL
    }
}
