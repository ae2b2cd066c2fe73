// PopContext
// copyright zipxing@hotmail.com 2022～2025

//! Shared ownership of a `ContextData` and weak handles onto it.
//!
//! `ContextRef` is the reference-counted owner: cloning it (`inc_ref`)
//! shares the context, dropping the last one (`dec_ref`) destroys the
//! context together with the geometry it owns.
//!
//! `ContextDataHandle` observes a context without keeping it alive. All
//! handles of one context share that context's `IndirectHandle`; when the
//! context is destroyed it clears the indirect object once and every handle
//! reads `None` from then on. The indirect object itself lives as long as
//! the last handle referring to it.
//!
//! ```text
//!   ContextRef ──Rc──> RefCell<ContextData> ──Rc──> IndirectHandle <──Rc── handle, handle, ...
//!                            ^                         │
//!                            └─────────Weak────────────┘
//! ```
//! A `ContextRef` also keeps a `Weak` to the control block so it can hand
//! out handles without borrowing the context.

use crate::context::ContextData;
use log::debug;
use std::{
    cell::{Ref, RefCell, RefMut},
    fmt,
    rc::{Rc, Weak},
};

/// Control block shared by a context and all handles bound to it.
pub struct IndirectHandle {
    target: RefCell<Weak<RefCell<ContextData>>>,
}

impl IndirectHandle {
    fn new(target: Weak<RefCell<ContextData>>) -> Self {
        Self {
            target: RefCell::new(target),
        }
    }

    fn get(self: &Rc<Self>) -> Option<ContextRef> {
        let data = self.target.borrow().upgrade()?;
        Some(ContextRef {
            data,
            indirect: Rc::downgrade(self),
        })
    }

    fn is_live(&self) -> bool {
        self.target.borrow().strong_count() > 0
    }

    /// Called once from the context's destructor.
    pub(crate) fn invalidate(&self) {
        *self.target.borrow_mut() = Weak::new();
    }
}

/// Reference-counted owner of a `ContextData`.
pub struct ContextRef {
    data: Rc<RefCell<ContextData>>,
    // reachable without borrowing the context, which may be mid-cook
    indirect: Weak<IndirectHandle>,
}

impl ContextRef {
    /// Builds a context that knows its own control block.
    pub(crate) fn new<F>(build: F) -> Self
    where
        F: FnOnce(Rc<IndirectHandle>) -> ContextData,
    {
        let indirect = Rc::new(IndirectHandle::new(Weak::new()));
        let data = Rc::new(RefCell::new(build(Rc::clone(&indirect))));
        *indirect.target.borrow_mut() = Rc::downgrade(&data);
        ContextRef {
            data,
            indirect: Rc::downgrade(&indirect),
        }
    }

    /// Takes another reference; same as `clone`.
    pub fn inc_ref(&self) -> ContextRef {
        ContextRef {
            data: Rc::clone(&self.data),
            indirect: Weak::clone(&self.indirect),
        }
    }

    /// Releases this reference. The last release destroys the context and
    /// the detail it owns.
    pub fn dec_ref(self) {
        let left = Rc::strong_count(&self.data) - 1;
        if left == 0 {
            if let Ok(c) = self.data.try_borrow() {
                debug!("releasing last reference of context '{}'", c.owner());
            }
        }
        drop(self);
    }

    pub fn ref_count(&self) -> usize {
        Rc::strong_count(&self.data)
    }

    pub fn borrow(&self) -> Ref<'_, ContextData> {
        self.data.borrow()
    }

    pub fn borrow_mut(&self) -> RefMut<'_, ContextData> {
        self.data.borrow_mut()
    }

    /// A weak handle onto this context. Safe to call while the context is
    /// borrowed, during a cook for instance.
    pub fn handle(&self) -> ContextDataHandle {
        ContextDataHandle {
            indirect: self.indirect.upgrade(),
        }
    }

    pub fn ptr_eq(&self, other: &ContextRef) -> bool {
        Rc::ptr_eq(&self.data, &other.data)
    }
}

impl Clone for ContextRef {
    fn clone(&self) -> Self {
        self.inc_ref()
    }
}

impl fmt::Debug for ContextRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.data.try_borrow() {
            Ok(c) => write!(f, "ContextRef({:?}, refs={})", c.owner(), self.ref_count()),
            Err(_) => write!(f, "ContextRef(<cooking>, refs={})", self.ref_count()),
        }
    }
}

/// Weak, copyable reference to a context. Never extends its lifetime.
///
/// States: unbound (default), bound to a live context, or bound to a
/// destroyed one. A handle in the last state stays valid and copyable but
/// always yields `None`.
#[derive(Clone, Default)]
pub struct ContextDataHandle {
    indirect: Option<Rc<IndirectHandle>>,
}

impl ContextDataHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds to `data`, releasing the previous binding.
    pub fn bind(&mut self, data: &ContextData) {
        self.indirect = Some(Rc::clone(data.indirect_handle()));
    }

    pub fn unbind(&mut self) {
        self.indirect = None;
    }

    pub fn is_bound(&self) -> bool {
        self.indirect.is_some()
    }

    /// The context, or `None` if unbound or destroyed.
    pub fn get_context_data(&self) -> Option<ContextRef> {
        self.indirect.as_ref().and_then(|i| i.get())
    }

    /// True while bound to a context that still exists. Does not borrow the
    /// context, so it is safe to call while the context is being cooked.
    pub fn is_live(&self) -> bool {
        self.indirect.as_ref().is_some_and(|i| i.is_live())
    }

    pub fn is_bound_to(&self, data: &ContextData) -> bool {
        self.indirect
            .as_ref()
            .is_some_and(|i| Rc::ptr_eq(i, data.indirect_handle()))
    }

    /// Number of handles (this one included) sharing the indirect object.
    pub fn share_count(&self) -> usize {
        self.indirect
            .as_ref()
            .map_or(0, |i| Rc::strong_count(i).saturating_sub(1))
    }
}

impl fmt::Debug for ContextDataHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match &self.indirect {
            None => "unbound",
            Some(i) if i.is_live() => "live",
            Some(_) => "invalidated",
        };
        write!(f, "ContextDataHandle({})", state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unbound_handle() {
        let h = ContextDataHandle::new();
        assert!(!h.is_bound());
        assert!(!h.is_live());
        assert!(h.get_context_data().is_none());
        assert_eq!(h.share_count(), 0);
        assert_eq!(format!("{:?}", h), "ContextDataHandle(unbound)");
    }

    #[test]
    fn test_handle_does_not_keep_alive() {
        let c = ContextData::new("t");
        let h = c.handle();
        assert_eq!(c.ref_count(), 1);
        assert!(h.get_context_data().unwrap().ptr_eq(&c));
        drop(c);
        assert!(h.is_bound());
        assert!(!h.is_live());
        assert!(h.get_context_data().is_none());
        assert_eq!(format!("{:?}", h), "ContextDataHandle(invalidated)");
    }

    #[test]
    fn test_rebind_releases_previous() {
        let a = ContextData::new("a");
        let b = ContextData::new("b");
        let mut h1 = a.handle();
        let h2 = h1.clone();
        assert_eq!(h1.share_count(), 2);
        h1.bind(&b.borrow());
        assert_eq!(h2.share_count(), 1);
        assert!(h1.is_bound_to(&b.borrow()));
        assert!(!h1.is_bound_to(&a.borrow()));
        assert!(h1.get_context_data().unwrap().ptr_eq(&b));
    }

    #[test]
    fn test_handle_while_cooking() {
        let c = ContextData::new("busy");
        let _cooking = c.borrow_mut();
        let h = c.handle();
        assert!(h.is_live());
        assert_eq!(h.share_count(), 1);
        assert!(h.get_context_data().unwrap().ptr_eq(&c));
    }

    #[test]
    fn test_inc_dec_ref() {
        let c = ContextData::new("rc");
        let extra = c.inc_ref();
        assert_eq!(c.ref_count(), 2);
        extra.dec_ref();
        assert_eq!(c.ref_count(), 1);
        let h = c.handle();
        c.dec_ref();
        assert!(h.get_context_data().is_none());
    }
}
