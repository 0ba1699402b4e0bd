//! Modifier facade: settings plus the bind lifecycle.

use std::borrow::Cow;

use crate::geom::{Point3, PolyMesh, Transform};

use super::binder::{BindDiagnostics, BindOptions, bind};
use super::data::BindData;
use super::deformer::{DeformDiagnostics, deform};
use super::error::{DeformError, SurfaceDeformError};
use super::persist::{decode_bind_data, encode_bind_data};
use super::settings::SurfaceDeformSettings;
use super::vgroup::VertexGroup;

/// Bind lifecycle. Bind data only exists in `Bound`.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum BindState {
    #[default]
    Unbound,
    /// A bind runs on the next evaluation.
    BindRequested,
    Bound(Box<BindData>),
}

/// The evaluated target object.
#[derive(Debug, Clone, Copy)]
pub struct TargetRef<'a> {
    pub mesh: &'a PolyMesh,
    pub world: Transform,
    pub name: &'a str,
}

/// Everything the host supplies for one evaluation.
#[derive(Debug, Clone, Copy)]
pub struct EvalInput<'a> {
    pub source_world: Transform,
    pub target: Option<TargetRef<'a>>,
    /// Vertex groups of the source mesh, looked up by name.
    pub groups: &'a [VertexGroup],
}

impl<'a> EvalInput<'a> {
    #[must_use]
    pub const fn new(target: Option<TargetRef<'a>>) -> Self {
        Self {
            source_world: Transform::identity(),
            target,
            groups: &[],
        }
    }

    #[must_use]
    pub const fn with_source_world(mut self, world: Transform) -> Self {
        self.source_world = world;
        self
    }

    #[must_use]
    pub const fn with_groups(mut self, groups: &'a [VertexGroup]) -> Self {
        self.groups = groups;
        self
    }
}

/// What an evaluation did.
#[derive(Debug, Clone, PartialEq)]
pub enum EvalOutcome {
    /// Not bound; positions untouched.
    Idle,
    /// A pending bind ran. Positions are untouched on the binding call.
    Bound(BindDiagnostics),
    Deformed(DeformDiagnostics),
}

#[derive(Debug, Clone, Default)]
pub struct SurfaceDeformModifier {
    settings: SurfaceDeformSettings,
    state: BindState,
    last_error: Option<String>,
}

impl SurfaceDeformModifier {
    #[must_use]
    pub fn new(settings: SurfaceDeformSettings) -> Self {
        Self {
            settings,
            state: BindState::Unbound,
            last_error: None,
        }
    }

    #[must_use]
    pub const fn settings(&self) -> &SurfaceDeformSettings {
        &self.settings
    }

    pub fn settings_mut(&mut self) -> &mut SurfaceDeformSettings {
        &mut self.settings
    }

    #[must_use]
    pub const fn state(&self) -> &BindState {
        &self.state
    }

    #[must_use]
    pub fn bind_data(&self) -> Option<&BindData> {
        match &self.state {
            BindState::Bound(data) => Some(data),
            _ => None,
        }
    }

    #[must_use]
    pub const fn is_bound(&self) -> bool {
        matches!(self.state, BindState::Bound(_))
    }

    /// Message of the most recent failed evaluation, cleared by the next
    /// successful one.
    #[must_use]
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Schedules a bind for the next evaluation, dropping any current bind.
    pub fn request_bind(&mut self) {
        self.state = BindState::BindRequested;
    }

    /// Releases bind data and cancels a pending bind.
    pub fn unbind(&mut self) {
        if self.is_bound() {
            log::debug!("unbind: releasing bind data");
        }
        self.state = BindState::Unbound;
    }

    /// Disabled when there is no target and no bind data left to release.
    #[must_use]
    pub const fn is_disabled(&self, has_target: bool) -> bool {
        !has_target && !self.is_bound()
    }

    /// Runs one evaluation over the source-local `positions`.
    pub fn evaluate(
        &mut self,
        positions: &mut [Point3],
        input: &EvalInput<'_>,
    ) -> Result<EvalOutcome, SurfaceDeformError> {
        let result = self.evaluate_inner(positions, input);
        match &result {
            Ok(_) => self.last_error = None,
            Err(err) => self.last_error = Some(err.to_string()),
        }
        result
    }

    fn evaluate_inner(
        &mut self,
        positions: &mut [Point3],
        input: &EvalInput<'_>,
    ) -> Result<EvalOutcome, SurfaceDeformError> {
        if matches!(self.state, BindState::Unbound) {
            return Ok(EvalOutcome::Idle);
        }

        let target = input.target.ok_or(DeformError::NoTarget)?;
        let group = self.resolve_group(input.groups);

        if matches!(self.state, BindState::BindRequested) {
            // A configured group absent from the mesh reads as all zero.
            let bind_group = group.clone().or_else(|| self.absent_group());
            let options = BindOptions::new()
                .with_transforms(input.source_world, target.world)
                .with_falloff(self.settings.falloff)
                .with_group(bind_group.as_deref())
                .with_sparse(self.settings.sparse_bind)
                .with_target_name(target.name);

            return match bind(positions, target.mesh, &options) {
                Ok((data, diagnostics)) => {
                    self.state = BindState::Bound(Box::new(data));
                    Ok(EvalOutcome::Bound(diagnostics))
                }
                Err(err) => {
                    self.state = BindState::Unbound;
                    Err(err.into())
                }
            };
        }

        let BindState::Bound(data) = &self.state else {
            return Err(DeformError::NotBound.into());
        };

        match deform(data, target.mesh, positions, self.settings.strength, group.as_deref()) {
            Ok(diagnostics) => Ok(EvalOutcome::Deformed(diagnostics)),
            Err(err) => {
                if matches!(
                    err,
                    DeformError::VertexCountChanged { .. } | DeformError::PolygonCountChanged { .. }
                ) {
                    self.state = BindState::Unbound;
                }
                Err(err.into())
            }
        }
    }

    /// The configured vertex group with the configured inversion applied.
    fn resolve_group<'g>(&self, groups: &'g [VertexGroup]) -> Option<Cow<'g, VertexGroup>> {
        let name = self.settings.vertex_group.as_deref()?;
        let group = groups.iter().find(|g| g.name == name)?;
        if group.is_inverted() == self.settings.invert_vertex_group {
            Some(Cow::Borrowed(group))
        } else {
            Some(Cow::Owned(
                group.clone().inverted(self.settings.invert_vertex_group),
            ))
        }
    }

    /// Weightless stand-in for a configured group the mesh does not carry.
    fn absent_group(&self) -> Option<Cow<'static, VertexGroup>> {
        let name = self.settings.vertex_group.as_deref()?;
        Some(Cow::Owned(
            VertexGroup::new(name, Vec::new()).inverted(self.settings.invert_vertex_group),
        ))
    }

    /// Encodes the current bind data, if bound.
    pub fn export_bind_data(&self) -> Result<Option<Vec<u8>>, SurfaceDeformError> {
        let Some(data) = self.bind_data() else {
            return Ok(None);
        };
        let mut bytes = Vec::new();
        encode_bind_data(data, &mut bytes)?;
        Ok(Some(bytes))
    }

    /// Restores bind data saved with [`export_bind_data`](Self::export_bind_data).
    pub fn import_bind_data(&mut self, mut bytes: &[u8]) -> Result<(), SurfaceDeformError> {
        let data = decode_bind_data(&mut bytes)?;
        self.state = BindState::Bound(Box::new(data));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deform::error::BindError;
    use crate::geom::Vec3;

    fn unit_quad() -> PolyMesh {
        let positions = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(1.0, 1.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
        ];
        PolyMesh::from_polygons(positions, &[[0u32, 1, 2, 3]]).unwrap()
    }

    fn target(mesh: &PolyMesh) -> TargetRef<'_> {
        TargetRef {
            mesh,
            world: Transform::identity(),
            name: "cage",
        }
    }

    #[test]
    fn lifecycle_bind_then_deform_then_unbind() {
        let mut quad = unit_quad();
        let mut modifier = SurfaceDeformModifier::default();
        let mut positions = vec![Point3::new(0.4, 0.4, 0.2)];

        let outcome = modifier
            .evaluate(&mut positions, &EvalInput::new(Some(target(&quad))))
            .unwrap();
        assert_eq!(outcome, EvalOutcome::Idle);

        modifier.request_bind();
        let outcome = modifier
            .evaluate(&mut positions, &EvalInput::new(Some(target(&quad))))
            .unwrap();
        assert!(matches!(outcome, EvalOutcome::Bound(_)));
        assert!(modifier.is_bound());
        assert_eq!(modifier.bind_data().unwrap().target_name, "cage");

        let moved: Vec<Point3> = quad
            .positions()
            .iter()
            .map(|p| *p + Vec3::new(1.0, 0.0, 0.0))
            .collect();
        quad.set_positions(moved).unwrap();
        let outcome = modifier
            .evaluate(&mut positions, &EvalInput::new(Some(target(&quad))))
            .unwrap();
        assert!(matches!(outcome, EvalOutcome::Deformed(_)));
        assert!(positions[0].distance_to(Point3::new(1.4, 0.4, 0.2)) < 1e-9);

        modifier.unbind();
        assert!(!modifier.is_bound());
        assert!(modifier.is_disabled(false));
    }

    #[test]
    fn missing_target_sets_last_error() {
        let mut modifier = SurfaceDeformModifier::default();
        modifier.request_bind();
        assert!(!modifier.is_disabled(true));

        let mut positions = vec![Point3::ORIGIN];
        let err = modifier
            .evaluate(&mut positions, &EvalInput::new(None))
            .unwrap_err();
        assert!(matches!(err, SurfaceDeformError::Deform(DeformError::NoTarget)));
        assert_eq!(modifier.last_error(), Some("No valid target mesh"));
        assert_eq!(modifier.state(), &BindState::BindRequested);
    }

    #[test]
    fn failed_bind_returns_to_unbound() {
        let positions = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.5, 1.0, 0.0),
            Point3::new(0.5, -1.0, 0.0),
            Point3::new(0.5, 0.0, 1.0),
        ];
        let fan =
            PolyMesh::from_polygons(positions, &[[0u32, 1, 2], [1, 0, 3], [0, 1, 4]]).unwrap();

        let mut modifier = SurfaceDeformModifier::default();
        modifier.request_bind();
        let mut source = vec![Point3::new(0.5, 0.2, 0.3)];
        let err = modifier
            .evaluate(&mut source, &EvalInput::new(Some(target(&fan))))
            .unwrap_err();
        assert!(matches!(err, SurfaceDeformError::Bind(BindError::NonManifold)));
        assert_eq!(modifier.state(), &BindState::Unbound);
        assert_eq!(
            modifier.last_error(),
            Some("Target has edges with more than two polygons")
        );
    }

    #[test]
    fn drift_unbinds() {
        let quad = unit_quad();
        let mut modifier = SurfaceDeformModifier::default();
        modifier.request_bind();
        let mut positions = vec![Point3::new(0.5, 0.5, 0.0)];
        modifier
            .evaluate(&mut positions, &EvalInput::new(Some(target(&quad))))
            .unwrap();

        positions.push(Point3::ORIGIN);
        let err = modifier
            .evaluate(&mut positions, &EvalInput::new(Some(target(&quad))))
            .unwrap_err();
        assert_eq!(err.to_string(), "Vertices changed from 1 to 2");
        assert!(!modifier.is_bound());
    }

    #[test]
    fn inverted_group_masks_deform() {
        let mut quad = unit_quad();
        let settings = SurfaceDeformSettings::new()
            .with_vertex_group("mask")
            .with_invert_vertex_group(true);
        let mut modifier = SurfaceDeformModifier::new(settings);
        let groups = [VertexGroup::new("mask", vec![1.0, 0.0])];
        let mut positions = vec![Point3::new(0.3, 0.3, 0.0), Point3::new(0.7, 0.7, 0.0)];

        modifier.request_bind();
        let input = EvalInput::new(Some(target(&quad))).with_groups(&groups);
        modifier.evaluate(&mut positions, &input).unwrap();

        let lifted: Vec<Point3> = quad
            .positions()
            .iter()
            .map(|p| *p + Vec3::new(0.0, 0.0, 1.0))
            .collect();
        quad.set_positions(lifted).unwrap();
        let input = EvalInput::new(Some(target(&quad))).with_groups(&groups);
        modifier.evaluate(&mut positions, &input).unwrap();

        assert_eq!(positions[0].z, 0.0);
        assert!((positions[1].z - 1.0).abs() < 1e-9);
    }

    #[test]
    fn absent_group_gates_sparse_bind_as_zero() {
        let quad = unit_quad();
        let positions = vec![Point3::new(0.3, 0.3, 0.0), Point3::new(0.7, 0.7, 0.0)];
        let groups = [VertexGroup::new("other", vec![1.0, 1.0])];
        let settings = SurfaceDeformSettings::new()
            .with_vertex_group("mask")
            .with_sparse_bind(true);

        let mut modifier = SurfaceDeformModifier::new(settings.clone());
        modifier.request_bind();
        let input = EvalInput::new(Some(target(&quad))).with_groups(&groups);
        let err = modifier.evaluate(&mut positions.clone(), &input).unwrap_err();
        assert!(matches!(err, SurfaceDeformError::Bind(BindError::NoVerticesBound)));
        assert!(!modifier.is_bound());

        let mut modifier = SurfaceDeformModifier::new(settings.with_invert_vertex_group(true));
        modifier.request_bind();
        let outcome = modifier.evaluate(&mut positions.clone(), &input).unwrap();
        let EvalOutcome::Bound(diagnostics) = outcome else {
            panic!("expected a bind, got {outcome:?}");
        };
        assert_eq!(diagnostics.bound_vertex_count, 2);
        assert!(diagnostics.sparse);
    }

    #[test]
    fn absent_group_leaves_deform_ungated() {
        let mut quad = unit_quad();
        let settings = SurfaceDeformSettings::new().with_vertex_group("mask");
        let mut modifier = SurfaceDeformModifier::new(settings);
        let mut positions = vec![Point3::new(0.4, 0.6, 0.0)];

        modifier.request_bind();
        modifier
            .evaluate(&mut positions, &EvalInput::new(Some(target(&quad))))
            .unwrap();

        let lifted: Vec<Point3> = quad
            .positions()
            .iter()
            .map(|p| *p + Vec3::new(0.0, 0.0, 1.0))
            .collect();
        quad.set_positions(lifted).unwrap();
        modifier
            .evaluate(&mut positions, &EvalInput::new(Some(target(&quad))))
            .unwrap();
        assert!((positions[0].z - 1.0).abs() < 1e-9);
    }

    #[test]
    fn clone_and_persist_keep_bind_data() {
        let quad = unit_quad();
        let mut modifier = SurfaceDeformModifier::default();
        modifier.request_bind();
        let mut positions = vec![Point3::new(0.2, 0.7, -0.1)];
        modifier
            .evaluate(&mut positions, &EvalInput::new(Some(target(&quad))))
            .unwrap();

        let copy = modifier.clone();
        assert_eq!(copy.bind_data(), modifier.bind_data());

        let bytes = modifier.export_bind_data().unwrap().unwrap();
        let mut restored = SurfaceDeformModifier::default();
        restored.import_bind_data(&bytes).unwrap();
        assert_eq!(restored.bind_data(), modifier.bind_data());
    }
}
