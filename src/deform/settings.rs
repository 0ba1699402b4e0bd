use serde::{Deserialize, Serialize};

pub const FALLOFF_MIN: f64 = 2.0;
pub const FALLOFF_MAX: f64 = 16.0;
pub const DEFAULT_FALLOFF: f64 = 4.0;

/// User-facing modifier settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SurfaceDeformSettings {
    /// Distance falloff exponent, `2..=16`.
    pub falloff: f64,
    /// Blend between the original and the deformed position.
    pub strength: f64,
    /// Name of the vertex group gating bind and scaling deform.
    pub vertex_group: Option<String>,
    pub invert_vertex_group: bool,
    /// Only bind vertices with positive group weight.
    pub sparse_bind: bool,
}

impl Default for SurfaceDeformSettings {
    fn default() -> Self {
        Self {
            falloff: DEFAULT_FALLOFF,
            strength: 1.0,
            vertex_group: None,
            invert_vertex_group: false,
            sparse_bind: false,
        }
    }
}

impl SurfaceDeformSettings {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_falloff(mut self, falloff: f64) -> Self {
        self.falloff = falloff;
        self
    }

    #[must_use]
    pub fn with_strength(mut self, strength: f64) -> Self {
        self.strength = strength;
        self
    }

    #[must_use]
    pub fn with_vertex_group(mut self, name: impl Into<String>) -> Self {
        self.vertex_group = Some(name.into());
        self
    }

    #[must_use]
    pub fn with_invert_vertex_group(mut self, invert: bool) -> Self {
        self.invert_vertex_group = invert;
        self
    }

    #[must_use]
    pub fn with_sparse_bind(mut self, sparse: bool) -> Self {
        self.sparse_bind = sparse;
        self
    }

    /// True when bind data stored with these settings would be gated by a
    /// vertex group.
    #[must_use]
    pub fn sparse_in_effect(&self) -> bool {
        self.sparse_bind && self.vertex_group.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let settings = SurfaceDeformSettings::default();
        assert_eq!(settings.falloff, 4.0);
        assert_eq!(settings.strength, 1.0);
        assert!(settings.vertex_group.is_none());
        assert!(!settings.sparse_in_effect());
    }

    #[test]
    fn sparse_needs_a_group() {
        let settings = SurfaceDeformSettings::new().with_sparse_bind(true);
        assert!(!settings.sparse_in_effect());
        let settings = settings.with_vertex_group("pin");
        assert!(settings.sparse_in_effect());
    }
}
