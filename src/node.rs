// PopContext
// copyright zipxing@hotmail.com 2022～2025

//! Particle operator interface.
//!
//! A POP is handed the shared `ContextData` of the running cook and mutates
//! it in place: births into its own particle primitive, forces on the
//! particles of its inputs, kills, user attributes.

use crate::{context::ContextData, error::Result, geo::Detail};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub u32);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pop{}", self.0)
    }
}

/// Where in the network a node is being cooked.
#[derive(Debug, Clone, Copy)]
pub struct CookSite<'a> {
    pub id: NodeId,
    pub inputs: &'a [NodeId],
    /// all nodes feeding this one, directly or through other nodes
    pub upstream: &'a [NodeId],
}

pub trait PopNode {
    fn name(&self) -> &str;

    /// One timestep of this node against the shared context.
    fn cook_pop(&mut self, site: CookSite, ctx: &mut ContextData) -> Result<()>;

    /// Rebuilds the node's guide geometry only; nothing is simulated.
    fn cook_guide(&mut self, _site: CookSite, _ctx: &ContextData, _guide: &mut Detail) -> Result<()> {
        Ok(())
    }
}
