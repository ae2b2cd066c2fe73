// PopContext
// copyright zipxing@hotmail.com 2022～2025

//! Ordered (particle primitive, owning node) pairs relevant to one cook.
//!
//! The list never deduplicates by itself: `add` and `merge` always append.
//! Callers that need unique primitives check with `find` first.

use crate::{
    geo::{Detail, PrimId},
    node::NodeId,
};
use log::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParticleNode {
    pub part: PrimId,
    pub pop: NodeId,
}

#[derive(Debug, Clone, Default)]
pub struct ParticleList {
    nodes: Vec<ParticleNode>,
    // single in-flight traversal
    cursor: Option<usize>,
}

impl ParticleList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, part: PrimId, pop: NodeId) -> &ParticleNode {
        self.nodes.push(ParticleNode { part, pop });
        &self.nodes[self.nodes.len() - 1]
    }

    pub fn find(&self, part: PrimId) -> Option<&ParticleNode> {
        self.nodes.iter().find(|n| n.part == part)
    }

    /// Appends every pair of `other` in order, duplicates included.
    pub fn merge(&mut self, other: &ParticleList) {
        self.nodes.extend_from_slice(&other.nodes);
    }

    /// Rebuilds this list from `other`, keeping the entries whose primitive
    /// exists in `gdp`. Used after the detail the list was built against has
    /// been swapped for a copy.
    pub fn copy_new_gdp(&mut self, other: &ParticleList, gdp: &Detail) {
        self.clear();
        for n in other.nodes.iter() {
            match gdp.prim_part(n.part) {
                Some(p) => {
                    self.add(p.id(), n.pop);
                }
                None => warn!("copy_new_gdp: {} of {} not in new detail", n.part, n.pop),
            }
        }
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
        self.cursor = None;
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ParticleNode> {
        self.nodes.iter()
    }

    /// Primitives in list order, for callers that need to mutate the
    /// context while walking the list.
    pub fn parts(&self) -> Vec<PrimId> {
        self.nodes.iter().map(|n| n.part).collect()
    }

    /// Starts the list's single traversal. Calling it again restarts it.
    pub fn iterate_init(&mut self) {
        self.cursor = Some(0);
    }

    pub fn iterate_next(&mut self) -> Option<PrimId> {
        let i = self.cursor?;
        match self.nodes.get(i) {
            Some(n) => {
                self.cursor = Some(i + 1);
                Some(n.part)
            }
            None => {
                self.cursor = None;
                None
            }
        }
    }

    /// Pairwise comparison up to the shorter list's length.
    ///
    /// A 3 entry list matches a 5 entry list starting with the same 3
    /// entries. `==` requires equal length as well.
    pub fn matches_prefix(&self, other: &ParticleList) -> bool {
        self.nodes
            .iter()
            .zip(other.nodes.iter())
            .all(|(a, b)| a == b)
    }
}

impl PartialEq for ParticleList {
    fn eq(&self, other: &Self) -> bool {
        self.nodes == other.nodes
    }
}

impl Eq for ParticleList {}
