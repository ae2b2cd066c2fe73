// PopContext
// copyright zipxing@hotmail.com 2022～2025

//! Local-variable bindings of a compiled per-point expression.
//!
//! An expression refers to user variables by name; compiling it maps each
//! name to a slot. Resolving a slot to an attribute handle is too slow to
//! repeat on every evaluation, so `VarBindings` resolves once and uses a
//! `UserVarResolveInfo` to notice when the variable set changed. The
//! context is always passed in explicitly by the caller evaluating the
//! expression.
//!
//! ```ignore
//! let mut vars = VarBindings::new(&["temperature"]);
//! vars.resolve(&ctx);
//! for pt in 0..n {
//!     let t = vars.value(&ctx, 0, pt).unwrap_or(0.0);
//! }
//! ```

use crate::{
    context::{ContextData, UserVarResolveInfo},
    geo::AttribHandle,
};

#[derive(Debug, Clone, Default)]
pub struct VarBindings {
    names: Vec<String>,
    slots: Vec<Option<AttribHandle>>,
    info: UserVarResolveInfo,
    // dictionary generation the slots were resolved against
    generation: Option<u32>,
    resolves: usize,
}

impl VarBindings {
    pub fn new<S: AsRef<str>>(names: &[S]) -> Self {
        Self {
            names: names.iter().map(|n| n.as_ref().to_string()).collect(),
            slots: vec![None; names.len()],
            ..Default::default()
        }
    }

    pub fn slot(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// How many times the slots were actually re-resolved.
    pub fn resolve_count(&self) -> usize {
        self.resolves
    }

    /// Re-resolves every slot when `ctx` is a different context, its user
    /// variables changed, or its attribute dictionary was renumbered.
    /// Returns true if it did.
    pub fn resolve(&mut self, ctx: &ContextData) -> bool {
        let generation = ctx.detail().map(|d| d.generation());
        // `update` must run every time to consume the serial
        let stale = self.info.update(ctx) | (generation != self.generation);
        if !stale {
            return false;
        }
        self.generation = generation;
        self.slots = match ctx.detail() {
            Some(d) => self
                .names
                .iter()
                .map(|n| {
                    let var = ctx.user_vars().id_of(n).and_then(|id| ctx.user_vars().get(id))?;
                    let r = d.find_point_attrib(&var.name, var.storage, var.tuple_size)?;
                    AttribHandle::bind(&d, r)
                })
                .collect(),
            None => vec![None; self.names.len()],
        };
        self.resolves += 1;
        true
    }

    pub fn is_bound(&self, slot: usize) -> bool {
        matches!(self.slots.get(slot), Some(Some(_)))
    }

    /// First component of the slot's variable at point `pt`. `None` when the
    /// slot is unbound, the point does not exist or the bindings are
    /// behind the detail.
    pub fn value(&self, ctx: &ContextData, slot: usize, pt: usize) -> Option<f32> {
        let h = (*self.slots.get(slot)?)?;
        let d = ctx.detail()?;
        if pt >= d.num_points() || d.attrib_info(h.attrib()).is_none() {
            return None;
        }
        Some(h.get_f(&d, pt, 0))
    }
}
