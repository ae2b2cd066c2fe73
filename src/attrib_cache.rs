// PopContext
// copyright zipxing@hotmail.com 2022～2025

//! Attribute offset cache.
//!
//! Rules and nodes touch the well-known particle attributes once per
//! particle per cook, so resolving the name every time is too slow. The
//! context keeps one `CachedAttribute` per `PointAttrib`, each holding the
//! resolved offset and a handle bound to it.
//!
//! The cache does no dirty tracking of its own: after anything that may
//! renumber the detail's dictionary (merge, attribute removal, clear) call
//! `recache_offset`. Using a stale entry trips a debug assertion in the
//! detail.

use crate::geo::{AttribHandle, AttribRef, Detail, Storage};

macro_rules! point_attribs {
    ($($variant:ident => ($name:literal, $storage:ident, $size:literal, [$($def:expr),*])),* $(,)?) => {
        /// Well-known per-point particle attributes.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum PointAttrib {
            $($variant),*
        }

        impl PointAttrib {
            pub const ALL: &'static [PointAttrib] = &[$(PointAttrib::$variant),*];

            fn desc(self) -> (&'static str, Storage, usize, &'static [f32]) {
                match self {
                    $(PointAttrib::$variant => ($name, Storage::$storage, $size, &[$($def),*])),*
                }
            }
        }
    };
}

point_attribs! {
    State => ("state", Int, 1, [0.0]),
    Velocity => ("v", Float, 3, [0.0, 0.0, 0.0]),
    Id => ("id", Int, 1, [0.0]),
    // (age, lifespan)
    Life => ("life", Float, 2, [0.0, 0.0]),
    Accel => ("accel", Float, 3, [0.0, 0.0, 0.0]),
    Mass => ("mass", Float, 1, [1.0]),
    Orient => ("orient", Float, 4, [0.0, 0.0, 0.0, 1.0]),
    AngVel => ("w", Float, 3, [0.0, 0.0, 0.0]),
    Up => ("up", Float, 3, [0.0, 1.0, 0.0]),
    Rot => ("rot", Float, 4, [0.0, 0.0, 0.0, 1.0]),
    Color => ("Cd", Float, 3, [1.0, 1.0, 1.0]),
    Alpha => ("Alpha", Float, 1, [1.0]),
    PScale => ("pscale", Float, 1, [1.0]),
    Scale => ("scale", Float, 3, [1.0, 1.0, 1.0]),
    Normal => ("N", Float, 3, [0.0, 0.0, 0.0]),
    Uv => ("uv", Float, 3, [0.0, 0.0, 0.0]),
    Drag => ("drag", Float, 1, [0.0]),
    Bounce => ("bounce", Float, 1, [1.0]),
    Friction => ("friction", Float, 1, [0.0]),
    Charge => ("charge", Float, 1, [0.0]),
    Dist => ("dist", Float, 1, [0.0]),
    Parent => ("parent", Int, 1, [-1.0]),
    Generator => ("generator", Int, 1, [-1.0]),
    Origin => ("origin", Int, 1, [-1.0]),
    HitTime => ("hittime", Float, 1, [0.0]),
    HitPos => ("hitpos", Float, 3, [0.0, 0.0, 0.0]),
    HitId => ("hitid", Int, 1, [-1.0]),
    HitUv => ("hituv", Float, 2, [0.0, 0.0]),
    HitNormal => ("hitnml", Float, 3, [0.0, 0.0, 0.0]),
    NumHit => ("numhit", Int, 1, [0.0]),
    Force => ("force", Float, 3, [0.0, 0.0, 0.0]),
    Torque => ("torque", Float, 3, [0.0, 0.0, 0.0]),
    Rest => ("rest", Float, 3, [0.0, 0.0, 0.0]),
    SpringK => ("springk", Float, 1, [0.0]),
    Tension => ("tension", Float, 1, [1.0]),
    // (min speed, max speed)
    SpeedLimit => ("speedlimit", Float, 2, [0.0, 0.0]),
    SpinLimit => ("spinlimit", Float, 1, [0.0]),
    PosPrim => ("posprim", Int, 1, [-1.0]),
    PosUv => ("posuv", Float, 2, [0.0, 0.0]),
    Instance => ("instance", Int, 1, [0.0]),
    Attract => ("attract", Int, 1, [-1.0]),
}

impl PointAttrib {
    pub const COUNT: usize = PointAttrib::ALL.len();

    /// The attributes every particle detail carries.
    pub const BASE: &'static [PointAttrib] = &[
        PointAttrib::State,
        PointAttrib::Velocity,
        PointAttrib::Id,
        PointAttrib::Life,
        PointAttrib::Accel,
        PointAttrib::Generator,
    ];

    pub fn name(self) -> &'static str {
        self.desc().0
    }

    pub fn storage(self) -> Storage {
        self.desc().1
    }

    pub fn tuple_size(self) -> usize {
        self.desc().2
    }

    pub fn defaults(self) -> &'static [f32] {
        self.desc().3
    }

    pub fn from_name(name: &str) -> Option<PointAttrib> {
        PointAttrib::ALL.iter().copied().find(|a| a.name() == name)
    }

    fn index(self) -> usize {
        self as usize
    }
}

/// Offset and handle of one attribute, always set and cleared together.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CachedAttribute {
    attrib: Option<AttribRef>,
    handle: Option<AttribHandle>,
}

impl CachedAttribute {
    pub fn offset(&self) -> Option<AttribRef> {
        self.attrib
    }

    pub fn handle(&self) -> Option<AttribHandle> {
        self.handle
    }

    pub fn is_set(&self) -> bool {
        self.attrib.is_some()
    }

    /// Binds to `r`; clears the entry and returns false if `r` does not
    /// resolve in `detail`.
    pub fn set(&mut self, detail: &Detail, r: AttribRef) -> bool {
        match AttribHandle::bind(detail, r) {
            Some(h) => {
                self.attrib = Some(r);
                self.handle = Some(h);
                true
            }
            None => {
                self.clear();
                false
            }
        }
    }

    pub fn clear(&mut self) {
        self.attrib = None;
        self.handle = None;
    }
}

#[derive(Debug, Clone)]
pub struct OffsetCache {
    entries: [CachedAttribute; PointAttrib::COUNT],
    // dictionary generation of the last full recache
    generation: Option<u32>,
}

impl Default for OffsetCache {
    fn default() -> Self {
        Self {
            entries: [CachedAttribute::default(); PointAttrib::COUNT],
            generation: None,
        }
    }
}

impl OffsetCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, a: PointAttrib) -> &CachedAttribute {
        &self.entries[a.index()]
    }

    pub fn offset(&self, a: PointAttrib) -> Option<AttribRef> {
        self.entries[a.index()].offset()
    }

    pub fn handle(&self, a: PointAttrib) -> Option<AttribHandle> {
        self.entries[a.index()].handle()
    }

    pub fn set_offset(&mut self, a: PointAttrib, detail: &Detail, r: AttribRef) -> bool {
        self.entries[a.index()].set(detail, r)
    }

    pub fn clear_offset(&mut self, a: PointAttrib) {
        self.entries[a.index()].clear();
    }

    pub fn clear_all(&mut self) {
        for e in self.entries.iter_mut() {
            e.clear();
        }
        self.generation = None;
    }

    /// True when the detail's dictionary changed since the last full recache.
    pub fn is_stale(&self, detail: &Detail) -> bool {
        self.generation != Some(detail.generation())
    }

    /// Re-resolves every entry against `detail`.
    pub fn recache_offset(&mut self, detail: &Detail) {
        for a in PointAttrib::ALL.iter() {
            let e = &mut self.entries[a.index()];
            match detail.find_point_attrib(a.name(), a.storage(), a.tuple_size()) {
                Some(r) => {
                    e.set(detail, r);
                }
                None => e.clear(),
            }
        }
        self.generation = Some(detail.generation());
    }

    /// Resolves only the entries currently absent; set entries are kept as
    /// they are. Returns how many were newly found.
    pub fn cache_missing_internal_attributes(&mut self, detail: &Detail) -> usize {
        let mut found = 0;
        for a in PointAttrib::ALL.iter() {
            let e = &mut self.entries[a.index()];
            if e.is_set() {
                continue;
            }
            if let Some(r) = detail.find_point_attrib(a.name(), a.storage(), a.tuple_size()) {
                if e.set(detail, r) {
                    found += 1;
                }
            }
        }
        if self.generation.is_none() {
            self.generation = Some(detail.generation());
        }
        found
    }
}
