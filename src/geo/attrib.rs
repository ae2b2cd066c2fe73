// PopContext
// copyright zipxing@hotmail.com 2022～2025

//! Point attributes of a detail and the offset/handle pair used to reach
//! them without a name lookup.

use super::Detail;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Storage {
    Float,
    Int,
}

/// Resolved position of an attribute in a detail's dictionary.
///
/// Only valid for the dictionary generation it was resolved against; any
/// structural change of the dictionary (remove, merge, clear) invalidates it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AttribRef {
    pub(crate) index: usize,
    pub(crate) generation: u32,
}

impl AttribRef {
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum AttribData {
    Float(Vec<f32>),
    Int(Vec<i32>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    name: String,
    tuple_size: usize,
    defaults: Vec<f32>,
    pub(crate) data: AttribData,
}

impl Attribute {
    pub(crate) fn new(name: &str, storage: Storage, tuple_size: usize, defaults: &[f32]) -> Self {
        let mut d = vec![0.0; tuple_size];
        for (i, v) in defaults.iter().take(tuple_size).enumerate() {
            d[i] = *v;
        }
        let data = match storage {
            Storage::Float => AttribData::Float(vec![]),
            Storage::Int => AttribData::Int(vec![]),
        };
        Self {
            name: name.to_string(),
            tuple_size,
            defaults: d,
            data,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn storage(&self) -> Storage {
        match self.data {
            AttribData::Float(_) => Storage::Float,
            AttribData::Int(_) => Storage::Int,
        }
    }

    pub fn tuple_size(&self) -> usize {
        self.tuple_size
    }

    pub fn defaults(&self) -> &[f32] {
        &self.defaults
    }

    pub(crate) fn is_compatible(&self, storage: Storage, tuple_size: usize) -> bool {
        self.storage() == storage && self.tuple_size == tuple_size
    }

    pub(crate) fn push_default(&mut self) {
        match &mut self.data {
            AttribData::Float(v) => v.extend_from_slice(&self.defaults),
            AttribData::Int(v) => v.extend(self.defaults.iter().map(|x| *x as i32)),
        }
    }

    /// Appends point `pt` of `src`, which must have the same layout.
    pub(crate) fn push_from(&mut self, src: &Attribute, pt: usize) {
        let n = self.tuple_size;
        let range = pt * n..(pt + 1) * n;
        let copied = match (&mut self.data, &src.data) {
            (AttribData::Float(dst), AttribData::Float(s)) => {
                dst.extend_from_slice(&s[range]);
                true
            }
            (AttribData::Int(dst), AttribData::Int(s)) => {
                dst.extend_from_slice(&s[range]);
                true
            }
            _ => false,
        };
        if !copied {
            self.push_default();
        }
    }

    pub(crate) fn retain_points(&mut self, keep: &[bool]) {
        let n = self.tuple_size;
        fn compact<T: Copy>(v: &mut Vec<T>, keep: &[bool], n: usize) {
            let mut w = 0;
            for (pt, k) in keep.iter().enumerate() {
                if *k {
                    for c in 0..n {
                        v[w * n + c] = v[pt * n + c];
                    }
                    w += 1;
                }
            }
            v.truncate(w * n);
        }
        match &mut self.data {
            AttribData::Float(v) => compact(v, keep, n),
            AttribData::Int(v) => compact(v, keep, n),
        }
    }

    pub(crate) fn clear_points(&mut self) {
        match &mut self.data {
            AttribData::Float(v) => v.clear(),
            AttribData::Int(v) => v.clear(),
        }
    }
}

/// Read/write accessor bound to one resolved attribute.
///
/// Built together with its `AttribRef`, so the two never disagree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttribHandle {
    attrib: AttribRef,
    storage: Storage,
    tuple_size: usize,
}

impl AttribHandle {
    pub fn bind(detail: &Detail, attrib: AttribRef) -> Option<Self> {
        let a = detail.try_attrib(attrib)?;
        Some(Self {
            attrib,
            storage: a.storage(),
            tuple_size: a.tuple_size(),
        })
    }

    pub(crate) fn from_parts(attrib: AttribRef, storage: Storage, tuple_size: usize) -> Self {
        Self {
            attrib,
            storage,
            tuple_size,
        }
    }

    pub fn attrib(&self) -> AttribRef {
        self.attrib
    }

    pub fn storage(&self) -> Storage {
        self.storage
    }

    pub fn tuple_size(&self) -> usize {
        self.tuple_size
    }

    pub fn get_f(&self, d: &Detail, pt: usize, comp: usize) -> f32 {
        let i = pt * self.tuple_size + comp;
        match &d.attrib(self.attrib).data {
            AttribData::Float(v) => v[i],
            AttribData::Int(v) => v[i] as f32,
        }
    }

    pub fn set_f(&self, d: &mut Detail, pt: usize, comp: usize, value: f32) {
        let i = pt * self.tuple_size + comp;
        match &mut d.attrib_mut(self.attrib).data {
            AttribData::Float(v) => v[i] = value,
            AttribData::Int(v) => v[i] = value as i32,
        }
    }

    pub fn get_i(&self, d: &Detail, pt: usize, comp: usize) -> i32 {
        let i = pt * self.tuple_size + comp;
        match &d.attrib(self.attrib).data {
            AttribData::Float(v) => v[i] as i32,
            AttribData::Int(v) => v[i],
        }
    }

    pub fn set_i(&self, d: &mut Detail, pt: usize, comp: usize, value: i32) {
        let i = pt * self.tuple_size + comp;
        match &mut d.attrib_mut(self.attrib).data {
            AttribData::Float(v) => v[i] = value as f32,
            AttribData::Int(v) => v[i] = value,
        }
    }

    pub fn get_v2(&self, d: &Detail, pt: usize) -> [f32; 2] {
        [self.get_f(d, pt, 0), self.get_f(d, pt, 1)]
    }

    pub fn set_v2(&self, d: &mut Detail, pt: usize, v: [f32; 2]) {
        for (c, x) in v.iter().enumerate() {
            self.set_f(d, pt, c, *x);
        }
    }

    pub fn get_v3(&self, d: &Detail, pt: usize) -> [f32; 3] {
        [self.get_f(d, pt, 0), self.get_f(d, pt, 1), self.get_f(d, pt, 2)]
    }

    pub fn set_v3(&self, d: &mut Detail, pt: usize, v: [f32; 3]) {
        for (c, x) in v.iter().enumerate() {
            self.set_f(d, pt, c, *x);
        }
    }

    pub fn get_v4(&self, d: &Detail, pt: usize) -> [f32; 4] {
        [
            self.get_f(d, pt, 0),
            self.get_f(d, pt, 1),
            self.get_f(d, pt, 2),
            self.get_f(d, pt, 3),
        ]
    }

    pub fn set_v4(&self, d: &mut Detail, pt: usize, v: [f32; 4]) {
        for (c, x) in v.iter().enumerate() {
            self.set_f(d, pt, c, *x);
        }
    }
}
