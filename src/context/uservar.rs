// PopContext
// copyright zipxing@hotmail.com 2022～2025

//! User-defined local variables and the staleness token compiled
//! expressions keep against them.

use super::ContextData;
use crate::{geo::Storage, handle::ContextDataHandle};
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UserVarId(pub u32);

#[derive(Debug, Clone, PartialEq)]
pub struct UserVar {
    pub id: UserVarId,
    pub name: String,
    pub storage: Storage,
    pub tuple_size: usize,
}

/// name <-> id maps of the user variables. `serial` grows on every
/// structural change (add, remove, retype, clear).
#[derive(Debug, Clone, Default)]
pub struct UserVarTable {
    by_name: HashMap<String, UserVarId>,
    by_id: BTreeMap<UserVarId, UserVar>,
    next_id: u32,
    serial: u32,
}

impl UserVarTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn serial(&self) -> u32 {
        self.serial
    }

    pub fn add(&mut self, name: &str, storage: Storage, tuple_size: usize) -> UserVarId {
        if let Some(id) = self.by_name.get(name).copied() {
            if let Some(v) = self.by_id.get_mut(&id) {
                if v.storage != storage || v.tuple_size != tuple_size {
                    v.storage = storage;
                    v.tuple_size = tuple_size;
                    self.serial += 1;
                }
            }
            return id;
        }
        let id = UserVarId(self.next_id);
        self.next_id += 1;
        self.by_name.insert(name.to_string(), id);
        self.by_id.insert(
            id,
            UserVar {
                id,
                name: name.to_string(),
                storage,
                tuple_size,
            },
        );
        self.serial += 1;
        id
    }

    pub fn remove(&mut self, name: &str) -> bool {
        match self.by_name.remove(name) {
            Some(id) => {
                self.by_id.remove(&id);
                self.serial += 1;
                true
            }
            None => false,
        }
    }

    pub fn clear(&mut self) {
        if !self.by_id.is_empty() {
            self.by_name.clear();
            self.by_id.clear();
            self.serial += 1;
        }
    }

    /// Bumps the serial without a structural change of the table, for
    /// callers that changed what the variables resolve to.
    pub fn touch(&mut self) {
        self.serial += 1;
    }

    pub fn id_of(&self, name: &str) -> Option<UserVarId> {
        self.by_name.get(name).copied()
    }

    pub fn get(&self, id: UserVarId) -> Option<&UserVar> {
        self.by_id.get(&id)
    }

    pub fn name_of(&self, id: UserVarId) -> Option<&str> {
        self.by_id.get(&id).map(|v| v.name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &UserVar> {
        self.by_id.values()
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

/// Tells a compiled expression when its local-variable slots must be
/// resolved again.
#[derive(Debug, Clone, Default)]
pub struct UserVarResolveInfo {
    handle: ContextDataHandle,
    serial: u32,
}

impl UserVarResolveInfo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true when `data` is not the context last seen, that context
    /// is gone, or its user-variable serial moved. On true the info is
    /// rebound to `data`, so an immediate second call returns false.
    pub fn update(&mut self, data: &ContextData) -> bool {
        let stale = !self.handle.is_bound_to(data)
            || !self.handle.is_live()
            || self.serial != data.user_var_serial();
        if stale {
            self.handle.bind(data);
            self.serial = data.user_var_serial();
        }
        stale
    }

    pub fn serial(&self) -> u32 {
        self.serial
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serial_moves_on_structure_only() {
        let mut t = UserVarTable::new();
        assert_eq!(t.serial(), 0);
        let a = t.add("temp", Storage::Float, 1);
        assert_eq!(t.serial(), 1);
        assert_eq!(t.add("temp", Storage::Float, 1), a);
        assert_eq!(t.serial(), 1);
        assert_eq!(t.add("temp", Storage::Float, 3), a);
        assert_eq!(t.serial(), 2);
        assert_eq!(t.name_of(a), Some("temp"));
        assert!(t.remove("temp"));
        assert!(!t.remove("temp"));
        assert_eq!(t.serial(), 3);
        t.clear();
        assert_eq!(t.serial(), 3);
    }

    #[test]
    fn test_ids_not_reused() {
        let mut t = UserVarTable::new();
        let a = t.add("a", Storage::Int, 1);
        t.remove("a");
        let b = t.add("b", Storage::Int, 1);
        assert_ne!(a, b);
        assert_eq!(t.id_of("b"), Some(b));
        assert_eq!(t.len(), 1);
    }
}
