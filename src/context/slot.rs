// PopContext
// copyright zipxing@hotmail.com 2022～2025

//! Where a context's geometry comes from.
//!
//! A context either owns its detail outright or borrows one that somebody
//! else keeps alive. The two cases are separate variants so a borrowed
//! detail can never be destroyed or silently replaced by the context.
//! Reads go to the borrowed detail; the first write copies it into an
//! owned one, so the lender's geometry is never modified.
//!
//! ```text
//!   Unset ──set_ref_detail──> Borrowed
//!     │                          │
//!     └──set_detail / reset(detail) / first cook / first write──> Owned
//! ```
//! `Owned` is terminal for `set_ref_detail`: once the context owns geometry
//! a late reference detail is refused.

use crate::geo::{Detail, SharedDetail};
use log::debug;
use std::{
    cell::Ref,
    fmt,
    ops::{Deref, DerefMut},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetailState {
    Unset,
    Borrowed,
    Owned,
}

impl fmt::Display for DetailState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DetailState::Unset => "unset",
            DetailState::Borrowed => "borrowed",
            DetailState::Owned => "owned",
        };
        write!(f, "{}", s)
    }
}

#[derive(Default)]
pub enum DetailSlot {
    #[default]
    Unset,
    Borrowed(SharedDetail),
    Owned(Detail),
}

impl DetailSlot {
    pub fn state(&self) -> DetailState {
        match self {
            DetailSlot::Unset => DetailState::Unset,
            DetailSlot::Borrowed(_) => DetailState::Borrowed,
            DetailSlot::Owned(_) => DetailState::Owned,
        }
    }

    /// Panics like `RefCell::borrow` if a borrowed detail is mutably
    /// borrowed elsewhere.
    pub fn get(&self) -> Option<DetailRef<'_>> {
        match self {
            DetailSlot::Unset => None,
            DetailSlot::Borrowed(s) => Some(DetailRef::Borrowed(s.borrow())),
            DetailSlot::Owned(d) => Some(DetailRef::Owned(d)),
        }
    }

    /// Write access. A borrowed detail is first replaced by an owned copy.
    pub fn get_mut(&mut self) -> Option<DetailMut<'_>> {
        if let DetailSlot::Borrowed(s) = self {
            let copy = s.borrow().clone();
            debug!("copying lent detail ({} points) before writing", copy.num_points());
            *self = DetailSlot::Owned(copy);
        }
        match self {
            DetailSlot::Owned(d) => Some(DetailMut(d)),
            _ => None,
        }
    }
}

impl fmt::Debug for DetailSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DetailSlot::Unset => write!(f, "unset"),
            DetailSlot::Borrowed(s) => match s.try_borrow() {
                Ok(d) => write!(f, "borrowed({} points)", d.num_points()),
                Err(_) => write!(f, "borrowed(<in use>)"),
            },
            DetailSlot::Owned(d) => write!(f, "owned({} points)", d.num_points()),
        }
    }
}

/// Read guard over an owned or borrowed detail.
pub enum DetailRef<'a> {
    Owned(&'a Detail),
    Borrowed(Ref<'a, Detail>),
}

impl Deref for DetailRef<'_> {
    type Target = Detail;

    fn deref(&self) -> &Detail {
        match self {
            DetailRef::Owned(d) => d,
            DetailRef::Borrowed(r) => r,
        }
    }
}

/// Write guard, always over the context's own detail.
pub struct DetailMut<'a>(&'a mut Detail);

impl Deref for DetailMut<'_> {
    type Target = Detail;

    fn deref(&self) -> &Detail {
        &*self.0
    }
}

impl DerefMut for DetailMut<'_> {
    fn deref_mut(&mut self) -> &mut Detail {
        &mut *self.0
    }
}
