// PopContext
// copyright zipxing@hotmail.com 2022～2025

//! Frame cache of cooked contexts.
//!
//! Each stored frame holds one reference to its context, so a context
//! (and the detail it owns) lives while the cache or any other holder
//! keeps it. Eviction drops the cache's reference only.

use crate::{config::get_context_config, handle::ContextRef};
use log::debug;
use std::collections::BTreeMap;

#[derive(Debug)]
pub struct PopCache {
    frames: BTreeMap<i64, ContextRef>,
    capacity: usize,
}

impl Default for PopCache {
    fn default() -> Self {
        PopCache::new(get_context_config().cache_size)
    }
}

impl PopCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            frames: BTreeMap::new(),
            capacity: capacity.max(1),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Keeps a reference to `ctx` under `frame`, replacing what was there.
    /// The oldest frames are evicted beyond capacity.
    pub fn store(&mut self, frame: i64, ctx: &ContextRef) {
        if let Some(old) = self.frames.insert(frame, ctx.inc_ref()) {
            old.dec_ref();
        }
        while self.frames.len() > self.capacity {
            if let Some((f, evicted)) = self.frames.pop_first() {
                debug!("pop cache: evicting frame {}", f);
                evicted.dec_ref();
            }
        }
    }

    /// The cached context itself, shared.
    pub fn fetch(&self, frame: i64) -> Option<ContextRef> {
        self.frames.get(&frame).map(|c| c.inc_ref())
    }

    /// An independent copy of the cached context, safe to cook on without
    /// disturbing the cache.
    pub fn fork(&self, frame: i64) -> Option<ContextRef> {
        self.frames.get(&frame).map(|c| c.borrow().duplicate())
    }

    pub fn remove(&mut self, frame: i64) -> bool {
        match self.frames.remove(&frame) {
            Some(c) => {
                c.dec_ref();
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, frame: i64) -> bool {
        self.frames.contains_key(&frame)
    }

    /// Closest cached frame at or before `frame`.
    pub fn nearest_before(&self, frame: i64) -> Option<i64> {
        self.frames.range(..=frame).next_back().map(|(f, _)| *f)
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn clear(&mut self) {
        self.frames.clear();
    }
}
