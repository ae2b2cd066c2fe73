// PopContext
// copyright zipxing@hotmail.com 2022～2025

use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable identity of a particle primitive inside one detail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PrimId(pub u32);

impl fmt::Display for PrimId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "prim{}", self.0)
    }
}

/// Particle system primitive: the set of points simulated as one system.
#[derive(Debug, Clone, PartialEq)]
pub struct PrimPart {
    id: PrimId,
    pub(crate) points: Vec<usize>,
}

impl PrimPart {
    pub(crate) fn new(id: PrimId) -> Self {
        Self { id, points: vec![] }
    }

    pub fn id(&self) -> PrimId {
        self.id
    }

    pub fn points(&self) -> &[usize] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn push_point(&mut self, pt: usize) {
        self.points.push(pt);
    }

    /// Applies a point renumbering; `None` entries were deleted.
    pub(crate) fn remap(&mut self, map: &[Option<usize>]) {
        self.points = self
            .points
            .iter()
            .filter_map(|p| map.get(*p).copied().flatten())
            .collect();
    }
}
