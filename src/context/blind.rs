// PopContext
// copyright zipxing@hotmail.com 2022～2025

use crate::node::NodeId;
use std::{any::Any, collections::HashMap};

/// Opaque per-node data riding along with a context.
#[derive(Default)]
pub struct BlindDataTable {
    map: HashMap<NodeId, Box<dyn Any>>,
}

impl BlindDataTable {
    /// Stores `data` for `node`, returning what was there before.
    pub fn set(&mut self, node: NodeId, data: Box<dyn Any>) -> Option<Box<dyn Any>> {
        self.map.insert(node, data)
    }

    pub fn get(&self, node: NodeId) -> Option<&dyn Any> {
        self.map.get(&node).map(|b| &**b)
    }

    pub fn get_mut(&mut self, node: NodeId) -> Option<&mut dyn Any> {
        self.map.get_mut(&node).map(|b| &mut **b)
    }

    /// Takes ownership of the data away from the table.
    pub fn steal(&mut self, node: NodeId) -> Option<Box<dyn Any>> {
        self.map.remove(&node)
    }

    pub fn contains(&self, node: NodeId) -> bool {
        self.map.contains_key(&node)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn clear(&mut self) {
        self.map.clear();
    }
}
