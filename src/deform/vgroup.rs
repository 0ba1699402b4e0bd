use serde::{Deserialize, Serialize};

/// Per-vertex scalar weights, optionally inverted (`1 - w`).
///
/// Vertices past the end of `weights` read as unassigned (weight 0 before
/// inversion).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct VertexGroup {
    pub name: String,
    weights: Vec<f64>,
    invert: bool,
}

impl VertexGroup {
    #[must_use]
    pub fn new(name: impl Into<String>, weights: Vec<f64>) -> Self {
        Self {
            name: name.into(),
            weights,
            invert: false,
        }
    }

    #[must_use]
    pub const fn inverted(mut self, invert: bool) -> Self {
        self.invert = invert;
        self
    }

    #[must_use]
    pub const fn is_inverted(&self) -> bool {
        self.invert
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.weights.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    /// Effective weight of `vertex`, with inversion applied.
    #[must_use]
    pub fn weight(&self, vertex: usize) -> f64 {
        let raw = self.weights.get(vertex).copied().unwrap_or(0.0);
        if self.invert { 1.0 - raw } else { raw }
    }
}
