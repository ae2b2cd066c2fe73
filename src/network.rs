// PopContext
// copyright zipxing@hotmail.com 2022～2025

//! A network of particle operators.
//!
//! Nodes are wired input to output; cooking a node cooks its inputs
//! first, each node exactly once per pass, all against the same
//! `ContextData`.

use crate::{
    context::ContextData,
    error::{PopError, Result},
    geo::Detail,
    node::{CookSite, NodeId, PopNode},
};
use log::trace;

#[derive(Default)]
pub struct PopNetwork {
    nodes: Vec<Box<dyn PopNode>>,
    inputs: Vec<Vec<NodeId>>,
}

impl PopNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, node: Box<dyn PopNode>) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(node);
        self.inputs.push(vec![]);
        id
    }

    pub fn contains(&self, id: NodeId) -> bool {
        (id.0 as usize) < self.nodes.len()
    }

    fn check(&self, id: NodeId) -> Result<usize> {
        if self.contains(id) {
            Ok(id.0 as usize)
        } else {
            Err(PopError::UnknownNode(id))
        }
    }

    /// Wires the output of `from` into the inputs of `to`.
    pub fn connect(&mut self, from: NodeId, to: NodeId) -> Result<()> {
        self.check(from)?;
        let t = self.check(to)?;
        if !self.inputs[t].contains(&from) {
            self.inputs[t].push(from);
        }
        Ok(())
    }

    pub fn inputs(&self, id: NodeId) -> &[NodeId] {
        self.inputs
            .get(id.0 as usize)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    pub fn node_name(&self, id: NodeId) -> Option<&str> {
        self.nodes.get(id.0 as usize).map(|n| n.name())
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Nodes `target` depends on, inputs before their consumers, ending
    /// with `target`.
    pub fn cook_order(&self, target: NodeId) -> Result<Vec<NodeId>> {
        self.check(target)?;
        // 0 unvisited, 1 on the stack, 2 done
        let mut mark = vec![0u8; self.nodes.len()];
        let mut order = vec![];
        self.visit(target, &mut mark, &mut order)?;
        Ok(order)
    }

    fn visit(&self, id: NodeId, mark: &mut [u8], order: &mut Vec<NodeId>) -> Result<()> {
        let i = id.0 as usize;
        match mark[i] {
            2 => return Ok(()),
            1 => return Err(PopError::CookCycle(id)),
            _ => {}
        }
        mark[i] = 1;
        for input in self.inputs[i].iter() {
            self.visit(*input, mark, order)?;
        }
        mark[i] = 2;
        order.push(id);
        Ok(())
    }

    /// Cooks `target` and everything upstream of it.
    pub fn cook(&mut self, target: NodeId, ctx: &mut ContextData) -> Result<()> {
        for id in self.cook_order(target)? {
            self.cook_node(id, ctx)?;
        }
        Ok(())
    }

    /// Every node `id` depends on, directly or not, inputs first.
    pub fn upstream(&self, id: NodeId) -> Result<Vec<NodeId>> {
        let mut order = self.cook_order(id)?;
        order.pop();
        Ok(order)
    }

    /// Cooks a single node, without its inputs.
    pub fn cook_node(&mut self, id: NodeId, ctx: &mut ContextData) -> Result<()> {
        let i = self.check(id)?;
        let upstream = self.upstream(id)?;
        let node = &mut self.nodes[i];
        trace!("cook {} '{}' t={}", id, node.name(), ctx.time());
        let site = CookSite {
            id,
            inputs: &self.inputs[i],
            upstream: &upstream,
        };
        node.cook_pop(site, ctx)
    }

    /// Rebuilds the guide geometry of `target` and its upstream nodes.
    pub fn cook_guide(&mut self, target: NodeId, ctx: &mut ContextData) -> Result<()> {
        for id in self.cook_order(target)? {
            let i = id.0 as usize;
            let upstream = self.upstream(id)?;
            let site = CookSite {
                id,
                inputs: &self.inputs[i],
                upstream: &upstream,
            };
            let mut guide = Detail::new();
            self.nodes[i].cook_guide(site, ctx, &mut guide)?;
            if guide.num_points() > 0 {
                ctx.store_guide(id, guide);
            }
        }
        Ok(())
    }
}
