// PopContext
// copyright zipxing@hotmail.com 2022～2025

use super::{AttribHandle, AttribRef, Attribute, PrimId, PrimPart, Storage};
use crate::error::{PopError, Result};
use log::warn;
use std::{cell::RefCell, rc::Rc};

/// Detail shared with an outside owner.
pub type SharedDetail = Rc<RefCell<Detail>>;

pub const POSITION_ATTRIB: &str = "P";

/// Geometry container: point attributes plus particle primitives.
///
/// `generation` counts structural changes of the attribute dictionary.
/// Appending an attribute keeps existing `AttribRef`s valid; removing one,
/// merging another detail or clearing renumbers the dictionary and bumps
/// the generation.
#[derive(Debug, Clone, PartialEq)]
pub struct Detail {
    attribs: Vec<Attribute>,
    num_points: usize,
    prims: Vec<PrimPart>,
    next_prim: u32,
    generation: u32,
}

impl Default for Detail {
    fn default() -> Self {
        Detail::new()
    }
}

impl Detail {
    pub fn new() -> Self {
        Self {
            attribs: vec![Attribute::new(POSITION_ATTRIB, Storage::Float, 3, &[0.0; 3])],
            num_points: 0,
            prims: vec![],
            next_prim: 0,
            generation: 0,
        }
    }

    pub fn into_shared(self) -> SharedDetail {
        Rc::new(RefCell::new(self))
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }

    pub fn num_points(&self) -> usize {
        self.num_points
    }

    pub fn attribs(&self) -> impl Iterator<Item = &Attribute> {
        self.attribs.iter()
    }

    fn make_ref(&self, index: usize) -> AttribRef {
        AttribRef {
            index,
            generation: self.generation,
        }
    }

    pub(crate) fn try_attrib(&self, r: AttribRef) -> Option<&Attribute> {
        if r.generation != self.generation {
            return None;
        }
        self.attribs.get(r.index)
    }

    pub(crate) fn attrib(&self, r: AttribRef) -> &Attribute {
        debug_assert_eq!(r.generation, self.generation, "stale attribute offset");
        &self.attribs[r.index]
    }

    pub(crate) fn attrib_mut(&mut self, r: AttribRef) -> &mut Attribute {
        debug_assert_eq!(r.generation, self.generation, "stale attribute offset");
        &mut self.attribs[r.index]
    }

    /// Info of a resolved attribute, `None` if the ref is stale.
    pub fn attrib_info(&self, r: AttribRef) -> Option<(&str, Storage, usize)> {
        self.try_attrib(r)
            .map(|a| (a.name(), a.storage(), a.tuple_size()))
    }

    pub fn point_attrib_by_name(&self, name: &str) -> Option<AttribRef> {
        self.attribs
            .iter()
            .position(|a| a.name() == name)
            .map(|i| self.make_ref(i))
    }

    /// Resolves name + storage + tuple size to an offset.
    pub fn find_point_attrib(&self, name: &str, storage: Storage, tuple_size: usize) -> Option<AttribRef> {
        let r = self.point_attrib_by_name(name)?;
        if self.attribs[r.index].is_compatible(storage, tuple_size) {
            Some(r)
        } else {
            None
        }
    }

    pub fn position_handle(&self) -> AttribHandle {
        // P is created in new() and can never be removed
        AttribHandle::from_parts(self.make_ref(0), Storage::Float, 3)
    }

    /// Adds a point attribute, or returns the existing one with the same
    /// layout. Existing offsets stay valid.
    pub fn add_point_attrib(
        &mut self,
        name: &str,
        storage: Storage,
        tuple_size: usize,
        defaults: &[f32],
    ) -> Result<AttribRef> {
        if let Some(r) = self.point_attrib_by_name(name) {
            let a = &self.attribs[r.index];
            if a.is_compatible(storage, tuple_size) {
                return Ok(r);
            }
            return Err(PopError::AttribMismatch {
                name: name.to_string(),
                expected: (storage, tuple_size),
                actual: (a.storage(), a.tuple_size()),
            });
        }
        let mut a = Attribute::new(name, storage, tuple_size, defaults);
        for _ in 0..self.num_points {
            a.push_default();
        }
        self.attribs.push(a);
        Ok(self.make_ref(self.attribs.len() - 1))
    }

    /// Removes a point attribute. P cannot be removed.
    pub fn remove_point_attrib(&mut self, name: &str) -> bool {
        if name == POSITION_ATTRIB {
            return false;
        }
        match self.attribs.iter().position(|a| a.name() == name) {
            Some(i) => {
                self.attribs.remove(i);
                self.generation += 1;
                true
            }
            None => false,
        }
    }

    pub fn append_point(&mut self) -> usize {
        for a in self.attribs.iter_mut() {
            a.push_default();
        }
        self.num_points += 1;
        self.num_points - 1
    }

    /// Deletes points, compacting attribute storage and primitive point
    /// lists. Point numbers after the first deleted one shift down.
    pub fn delete_points(&mut self, points: &[usize]) -> Result<usize> {
        let mut keep = vec![true; self.num_points];
        for p in points {
            if *p >= self.num_points {
                return Err(PopError::PointOutOfRange {
                    index: *p,
                    count: self.num_points,
                });
            }
            keep[*p] = false;
        }
        let mut map = Vec::with_capacity(self.num_points);
        let mut next = 0;
        for k in keep.iter() {
            if *k {
                map.push(Some(next));
                next += 1;
            } else {
                map.push(None);
            }
        }
        let removed = self.num_points - next;
        if removed == 0 {
            return Ok(0);
        }
        for a in self.attribs.iter_mut() {
            a.retain_points(&keep);
        }
        for p in self.prims.iter_mut() {
            p.remap(&map);
        }
        self.num_points = next;
        Ok(removed)
    }

    pub fn add_prim_part(&mut self) -> PrimId {
        let id = PrimId(self.next_prim);
        self.next_prim += 1;
        self.prims.push(PrimPart::new(id));
        id
    }

    pub fn prim_part(&self, id: PrimId) -> Option<&PrimPart> {
        self.prims.iter().find(|p| p.id() == id)
    }

    pub fn prim_part_mut(&mut self, id: PrimId) -> Option<&mut PrimPart> {
        self.prims.iter_mut().find(|p| p.id() == id)
    }

    pub fn prim_parts(&self) -> impl Iterator<Item = &PrimPart> {
        self.prims.iter()
    }

    /// Appends `other`'s points, attributes and primitives.
    ///
    /// The dictionary is rebuilt in name order afterwards, so every
    /// previously resolved `AttribRef` must be re-resolved. Returns the new
    /// id of each merged primitive, in `other`'s order.
    pub fn merge(&mut self, other: &Detail) -> Vec<(PrimId, PrimId)> {
        for oa in other.attribs.iter() {
            match self.attribs.iter().find(|a| a.name() == oa.name()) {
                Some(a) if !a.is_compatible(oa.storage(), oa.tuple_size()) => {
                    warn!("merge: attribute '{}' layout differs, keeping ours", oa.name());
                }
                Some(_) => {}
                None => {
                    let mut a = Attribute::new(oa.name(), oa.storage(), oa.tuple_size(), oa.defaults());
                    for _ in 0..self.num_points {
                        a.push_default();
                    }
                    self.attribs.push(a);
                }
            }
        }
        for a in self.attribs.iter_mut() {
            let src = other
                .attribs
                .iter()
                .find(|oa| oa.name() == a.name() && a.is_compatible(oa.storage(), oa.tuple_size()));
            for pt in 0..other.num_points {
                match src {
                    Some(s) => a.push_from(s, pt),
                    None => a.push_default(),
                }
            }
        }
        let base = self.num_points;
        self.num_points += other.num_points;

        let mut ids = vec![];
        for op in other.prims.iter() {
            let id = self.add_prim_part();
            if let Some(p) = self.prim_part_mut(id) {
                p.points = op.points.iter().map(|pt| pt + base).collect();
            }
            ids.push((op.id(), id));
        }

        // keep P in front, the rest by name
        self.attribs[1..].sort_by(|a, b| a.name().cmp(b.name()));
        self.generation += 1;
        ids
    }

    /// Removes all points and primitives and every attribute except P.
    pub fn clear(&mut self) {
        self.attribs.truncate(1);
        self.attribs[0].clear_points();
        self.prims.clear();
        self.num_points = 0;
        self.generation += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_detail_has_position() {
        let d = Detail::new();
        assert!(d.find_point_attrib("P", Storage::Float, 3).is_some());
        assert!(d.find_point_attrib("P", Storage::Float, 4).is_none());
        assert_eq!(d.num_points(), 0);
    }

    #[test]
    fn test_add_attrib_reuse_and_mismatch() {
        let mut d = Detail::new();
        let r1 = d.add_point_attrib("v", Storage::Float, 3, &[]).unwrap();
        let r2 = d.add_point_attrib("v", Storage::Float, 3, &[]).unwrap();
        assert_eq!(r1, r2);
        let e = d.add_point_attrib("v", Storage::Int, 1, &[]).unwrap_err();
        assert!(matches!(e, PopError::AttribMismatch { .. }));
    }

    #[test]
    fn test_append_keeps_refs_remove_invalidates() {
        let mut d = Detail::new();
        let v = d.add_point_attrib("v", Storage::Float, 3, &[]).unwrap();
        let _m = d.add_point_attrib("mass", Storage::Float, 1, &[1.0]).unwrap();
        assert!(d.attrib_info(v).is_some());
        assert!(d.remove_point_attrib("mass"));
        assert!(d.attrib_info(v).is_none());
        assert!(!d.remove_point_attrib("P"));
    }

    #[test]
    fn test_delete_points_remaps_prims() {
        let mut d = Detail::new();
        let prim = d.add_prim_part();
        let ph = d.position_handle();
        for i in 0..4 {
            let pt = d.append_point();
            ph.set_v3(&mut d, pt, [i as f32, 0.0, 0.0]);
            d.prim_part_mut(prim).unwrap().push_point(pt);
        }
        assert_eq!(d.delete_points(&[1, 2]).unwrap(), 2);
        assert_eq!(d.num_points(), 2);
        assert_eq!(d.prim_part(prim).unwrap().points(), &[0, 1]);
        assert_eq!(ph.get_v3(&d, 1), [3.0, 0.0, 0.0]);
        assert!(d.delete_points(&[5]).is_err());
    }

    #[test]
    fn test_merge_rebuilds_dictionary() {
        let mut a = Detail::new();
        let av = a.add_point_attrib("v", Storage::Float, 3, &[]).unwrap();
        a.append_point();

        let mut b = Detail::new();
        b.add_point_attrib("mass", Storage::Float, 1, &[2.0]).unwrap();
        let bp = b.add_prim_part();
        let pt = b.append_point();
        b.prim_part_mut(bp).unwrap().push_point(pt);
        let bm = b.find_point_attrib("mass", Storage::Float, 1).unwrap();
        AttribHandle::bind(&b, bm).unwrap().set_f(&mut b, pt, 0, 5.0);

        let ids = a.merge(&b);
        assert_eq!(a.num_points(), 2);
        assert!(a.attrib_info(av).is_none());
        let mass = a.find_point_attrib("mass", Storage::Float, 1).unwrap();
        let h = AttribHandle::bind(&a, mass).unwrap();
        // our old point takes the default, the merged one keeps its value
        assert_eq!(h.get_f(&a, 0, 0), 2.0);
        assert_eq!(h.get_f(&a, 1, 0), 5.0);
        assert_eq!(ids.len(), 1);
        assert_eq!(a.prim_part(ids[0].1).unwrap().points(), &[1]);
    }
}
