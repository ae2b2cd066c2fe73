// PopContext
// copyright zipxing@hotmail.com 2022～2025

//! ContextData is the mutable state of one particle network cook:
//! time, the geometry detail, the attribute offset cache, the particle
//! primitive registry, both particle lists, a private seeded RNG,
//! id and population counters, per-node blind data, cook-control flags,
//! rule suppression and user variables.
//!
//! Whoever drives the network creates a context, hands it to
//! `PopNetwork::cook` through `ContextData::cook`, and every node mutates
//! it in place. Contexts are shared through `ContextRef` and observed
//! through `ContextDataHandle`.

mod blind;
mod flags;
mod slot;
mod uservar;

pub use blind::*;
pub use flags::*;
pub use slot::*;
pub use uservar::*;

use crate::{
    attrib_cache::{OffsetCache, PointAttrib},
    config::{get_context_config, ContextConfig},
    error::{PopError, Result},
    geo::{AttribHandle, AttribRef, Detail, PrimId, SharedDetail, Storage},
    handle::{ContextDataHandle, ContextRef, IndirectHandle},
    network::PopNetwork,
    node::NodeId,
    particle_list::ParticleList,
    rules,
    util::{Rand, Vec3},
};
use log::{debug, info, warn};
use std::{
    any::Any,
    collections::{HashMap, HashSet},
    fmt,
    rc::Rc,
};

/// Arguments of `ContextData::reset`.
#[derive(Debug, Default)]
pub struct ResetOptions {
    /// node cooked by `cook`
    pub cook_pop: Option<NodeId>,
    /// geometry to start from; becomes the owned detail
    pub detail: Option<Detail>,
    /// node cooked once, before the first solved cook, to seed particles
    pub init_pop: Option<NodeId>,
    /// keep the current geometry instead of discarding it
    pub keep_geo: bool,
    pub seed: u64,
    /// solve the first cook instead of only recording its time
    pub solve_immediately: bool,
    /// start time
    pub time: f32,
}

pub struct ContextData {
    owner: String,
    config: ContextConfig,

    time: f32,
    time_inc: f32,
    prev_time_inc: f32,
    default_time_inc: f32,

    detail: DetailSlot,
    cook_pop: Option<NodeId>,
    init_pop: Option<NodeId>,

    prim_parts: HashMap<NodeId, PrimId>,
    generators: HashMap<PrimId, NodeId>,
    init_prim_parts: HashSet<PrimId>,
    initializing: bool,
    needs_init: bool,
    first_cook_pending: bool,

    particle_list: ParticleList,
    init_particle_list: ParticleList,

    offsets: OffsetCache,

    rand: Rand,
    seed: u64,
    first_id: i32,
    next_id: i32,
    num_particles: i64,
    max_particles: i64,
    births_this_frame: usize,

    cook_flags: CookFlags,
    rule_suppression: RuleSuppression,

    user_vars: UserVarTable,
    blind: BlindDataTable,
    guides: HashMap<NodeId, Detail>,

    indirect: Rc<IndirectHandle>,
}

impl ContextData {
    /// New shared context using the process-wide configuration.
    pub fn new(owner: &str) -> ContextRef {
        Self::with_config(owner, get_context_config())
    }

    pub fn with_config(owner: &str, cfg: &ContextConfig) -> ContextRef {
        let c = ContextRef::new(|indirect| ContextData::blank(owner, cfg, indirect));
        info!("context '{}' created, max_particles={}", owner, cfg.max_particles);
        c
    }

    fn blank(owner: &str, cfg: &ContextConfig, indirect: Rc<IndirectHandle>) -> Self {
        let mut rand = Rand::new();
        rand.srand(cfg.seed);
        Self {
            owner: owner.to_string(),
            config: cfg.clone(),
            time: 0.0,
            time_inc: cfg.time_inc,
            prev_time_inc: cfg.time_inc,
            default_time_inc: cfg.time_inc,
            detail: DetailSlot::Unset,
            cook_pop: None,
            init_pop: None,
            prim_parts: HashMap::new(),
            generators: HashMap::new(),
            init_prim_parts: HashSet::new(),
            initializing: false,
            needs_init: true,
            first_cook_pending: true,
            particle_list: ParticleList::new(),
            init_particle_list: ParticleList::new(),
            offsets: OffsetCache::new(),
            rand,
            seed: cfg.seed,
            first_id: cfg.first_id,
            next_id: cfg.first_id,
            num_particles: 0,
            max_particles: cfg.max_particles,
            births_this_frame: 0,
            cook_flags: CookFlags::default(),
            rule_suppression: RuleSuppression::empty(),
            user_vars: UserVarTable::new(),
            blind: BlindDataTable::default(),
            guides: HashMap::new(),
            indirect,
        }
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Configuration the context was created with.
    pub fn config(&self) -> &ContextConfig {
        &self.config
    }

    pub(crate) fn indirect_handle(&self) -> &Rc<IndirectHandle> {
        &self.indirect
    }

    /// A weak handle bound to this context.
    pub fn handle(&self) -> ContextDataHandle {
        let mut h = ContextDataHandle::new();
        h.bind(self);
        h
    }

    // ---------------------------------------------------------------
    // reset
    // ---------------------------------------------------------------

    /// Reinitializes the context for a fresh simulation run.
    ///
    /// Reseeds the RNG and clears both particle lists, the primitive
    /// registry, the offset cache (recached on next use), blind data and
    /// guide geometry. Geometry is discarded unless `keep_geo` is set or a
    /// new detail is supplied; in both of those cases ids continue after
    /// the highest kept id, the particle count is taken from the kept
    /// points and the kept primitives are registered again under the node
    /// that generated them, so their particles keep simulating.
    pub fn reset(&mut self, opts: ResetOptions) {
        self.cook_pop = opts.cook_pop;
        self.init_pop = opts.init_pop;
        self.seed = opts.seed;
        self.rand.srand(opts.seed);

        self.particle_list.clear();
        self.init_particle_list.clear();
        self.prim_parts.clear();
        self.generators.clear();
        self.init_prim_parts.clear();
        self.offsets.clear_all();
        self.blind.clear();
        self.guides.clear();

        let kept = match opts.detail {
            Some(d) => {
                self.detail = DetailSlot::Owned(d);
                true
            }
            None if opts.keep_geo => true,
            None => {
                if let DetailSlot::Owned(d) = &mut self.detail {
                    d.clear();
                } else {
                    // never clear geometry we do not own
                    self.detail = DetailSlot::Unset;
                }
                self.user_vars.clear();
                false
            }
        };

        self.next_id = self.first_id;
        self.num_particles = 0;
        if kept {
            if let Some(d) = self.detail.get() {
                self.num_particles = d.num_points() as i64;
                if let Some(r) = d.find_point_attrib(PointAttrib::Id.name(), Storage::Int, 1) {
                    if let Some(h) = AttribHandle::bind(&d, r) {
                        let max_id = (0..d.num_points()).map(|pt| h.get_i(&d, pt, 0)).max();
                        if let Some(m) = max_id {
                            self.next_id = self.next_id.max(m + 1);
                        }
                    }
                }
            }
            self.rebuild_prim_registry();
        }

        self.time = opts.time;
        self.time_inc = self.default_time_inc;
        self.prev_time_inc = self.default_time_inc;
        self.births_this_frame = 0;
        self.initializing = false;
        self.needs_init = true;
        self.first_cook_pending = true;
        self.cook_flags.set(CookFlags::COOK_FIRST, opts.solve_immediately);

        info!(
            "context '{}' reset: seed={} keep_geo={} detail={} particles={}",
            self.owner,
            self.seed,
            opts.keep_geo,
            self.detail.state(),
            self.num_particles
        );
    }

    // primitives whose points carry no generator stay unregistered
    fn rebuild_prim_registry(&mut self) {
        let Some(d) = self.detail.get() else {
            return;
        };
        let Some(generator) = d
            .find_point_attrib(PointAttrib::Generator.name(), Storage::Int, 1)
            .and_then(|r| AttribHandle::bind(&d, r))
        else {
            return;
        };
        for pp in d.prim_parts() {
            let Some(pt) = pp.points().first() else {
                continue;
            };
            let g = generator.get_i(&d, *pt, 0);
            if g < 0 {
                continue;
            }
            let node = NodeId(g as u32);
            self.prim_parts.entry(node).or_insert(pp.id());
            self.generators.insert(pp.id(), node);
        }
        debug!(
            "{}: {} kept primitives registered again",
            self.owner,
            self.generators.len()
        );
    }

    /// Per-frame bookkeeping before the frame's first cook. Leaves seed,
    /// lists and caches alone.
    pub fn frame_reset(&mut self) {
        self.prev_time_inc = self.time_inc;
        self.births_this_frame = 0;
        self.guides.clear();
    }

    // ---------------------------------------------------------------
    // time
    // ---------------------------------------------------------------

    pub fn time(&self) -> f32 {
        self.time
    }

    pub fn time_inc(&self) -> f32 {
        self.time_inc
    }

    pub fn prev_time_inc(&self) -> f32 {
        self.prev_time_inc
    }

    pub fn set_time(&mut self, time: f32, time_inc: f32) {
        self.time = time;
        self.time_inc = time_inc;
    }

    fn advance_time(&mut self, time: f32) {
        self.time_inc = if !self.first_cook_pending && time > self.time {
            time - self.time
        } else {
            self.default_time_inc
        };
        self.time = time;
    }

    // ---------------------------------------------------------------
    // cooking
    // ---------------------------------------------------------------

    pub fn cook_pop(&self) -> Option<NodeId> {
        self.cook_pop
    }

    pub fn set_cook_pop(&mut self, pop: Option<NodeId>) {
        self.cook_pop = pop;
    }

    pub fn init_pop(&self) -> Option<NodeId> {
        self.init_pop
    }

    /// True only while the init node is being cooked.
    pub fn is_initializing(&self) -> bool {
        self.initializing
    }

    /// One cook pass of the cook node at `time`.
    ///
    /// Runs PREP, COOK, APPLY_RULES and REAP in that order, each gated by
    /// its cook flag. The first cook after a reset only records the time
    /// unless COOK_FIRST is set.
    pub fn cook(&mut self, net: &mut PopNetwork, time: f32) -> Result<()> {
        let pop = self.cook_pop.ok_or(PopError::NoCookPop)?;
        if !net.contains(pop) {
            return Err(PopError::UnknownNode(pop));
        }
        let first = self.first_cook_pending;
        self.advance_time(time);
        self.first_cook_pending = false;
        if first && !self.should_do_cook_first() {
            debug!("{}: first cook at t={} records time only", self.owner, time);
            return Ok(());
        }

        self.take_ownership();
        if self.needs_init {
            self.run_init(net)?;
        }
        if self.should_do_prep() {
            self.prep();
        }
        if self.should_do_cook() {
            net.cook(pop, self)?;
        }
        if self.should_do_apply_rules() {
            self.apply_rules()?;
        }
        if self.should_do_reap() {
            self.reap()?;
        }
        debug!(
            "{}: cooked {} at t={} dt={} particles={}",
            self.owner, pop, self.time, self.time_inc, self.num_particles
        );
        Ok(())
    }

    /// Recomputes guide geometry of every node up to the cook node at
    /// `time`. Nothing is simulated and the context clock is unchanged.
    pub fn cook_guide(&mut self, net: &mut PopNetwork, time: f32) -> Result<()> {
        let pop = self.cook_pop.ok_or(PopError::NoCookPop)?;
        let saved = self.time;
        self.time = time;
        let r = net.cook_guide(pop, self);
        self.time = saved;
        r
    }

    // cooking needs geometry of its own
    fn take_ownership(&mut self) {
        match self.detail.state() {
            DetailState::Owned => {}
            DetailState::Unset => {
                debug!("{}: creating owned detail for cook", self.owner);
                self.detail = DetailSlot::Owned(Detail::new());
            }
            DetailState::Borrowed => {
                self.own_ref_detail();
            }
        }
    }

    fn run_init(&mut self, net: &mut PopNetwork) -> Result<()> {
        self.needs_init = false;
        let Some(init) = self.init_pop else {
            return Ok(());
        };
        self.initializing = true;
        let r = net.cook(init, self);
        self.initializing = false;
        r?;
        info!(
            "{}: init pass by {} created {} primitives",
            self.owner,
            init,
            self.init_prim_parts.len()
        );
        Ok(())
    }

    fn prep(&mut self) {
        self.particle_list.clear();
        self.particle_list.merge(&self.init_particle_list);
        self.refresh_offsets();
    }

    /// Full recache when the dictionary changed, otherwise pick up what is
    /// missing.
    fn refresh_offsets(&mut self) {
        if let Some(d) = self.detail.get() {
            if self.offsets.is_stale(&d) {
                self.offsets.recache_offset(&d);
            } else {
                self.offsets.cache_missing_internal_attributes(&d);
            }
        }
    }

    fn apply_rules(&mut self) -> Result<()> {
        self.refresh_offsets();
        let parts = self.particle_list.parts();
        let offsets = &self.offsets;
        let mut d = self.detail.get_mut().ok_or(PopError::NoDetail)?;
        rules::apply_rules(&mut d, offsets, &parts, self.rule_suppression, self.time_inc);
        Ok(())
    }

    fn reap(&mut self) -> Result<usize> {
        self.refresh_offsets();
        let parts = self.particle_list.parts();
        let offsets = &self.offsets;
        let mut d = self.detail.get_mut().ok_or(PopError::NoDetail)?;
        let n = rules::reap(&mut d, offsets, &parts)?;
        drop(d);
        if n > 0 {
            self.bump_num_particles(-(n as i64));
            debug!("{}: reaped {} particles", self.owner, n);
        }
        Ok(n)
    }

    // ---------------------------------------------------------------
    // cook control
    // ---------------------------------------------------------------

    pub fn cook_flags(&self) -> CookFlags {
        self.cook_flags
    }

    pub fn set_cook_flags(&mut self, flags: CookFlags) {
        self.cook_flags = flags;
    }

    pub fn should_do_reap(&self) -> bool {
        self.cook_flags.contains(CookFlags::REAP)
    }

    pub fn should_do_prep(&self) -> bool {
        self.cook_flags.contains(CookFlags::PREP)
    }

    pub fn should_do_apply_rules(&self) -> bool {
        self.cook_flags.contains(CookFlags::APPLY_RULES)
    }

    pub fn should_do_cook(&self) -> bool {
        self.cook_flags.contains(CookFlags::COOK)
    }

    pub fn should_do_cook_first(&self) -> bool {
        self.cook_flags.contains(CookFlags::COOK_FIRST)
    }

    pub fn set_do_reap(&mut self, on: bool) {
        self.cook_flags.set(CookFlags::REAP, on);
    }

    pub fn set_do_prep(&mut self, on: bool) {
        self.cook_flags.set(CookFlags::PREP, on);
    }

    pub fn set_do_apply_rules(&mut self, on: bool) {
        self.cook_flags.set(CookFlags::APPLY_RULES, on);
    }

    pub fn set_do_cook(&mut self, on: bool) {
        self.cook_flags.set(CookFlags::COOK, on);
    }

    pub fn set_do_cook_first(&mut self, on: bool) {
        self.cook_flags.set(CookFlags::COOK_FIRST, on);
    }

    pub fn rule_suppression(&self) -> RuleSuppression {
        self.rule_suppression
    }

    pub fn set_rule_suppression(&mut self, mask: RuleSuppression) {
        self.rule_suppression = mask;
    }

    // ---------------------------------------------------------------
    // random numbers, ids and population
    // ---------------------------------------------------------------

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Uniform float in [0,1) from the context stream.
    pub fn random(&mut self) -> f32 {
        self.rand.random()
    }

    /// Like `random`, but with an extra hashing step for better
    /// independence between successive samples. Same stream.
    pub fn random_sample(&mut self) -> f32 {
        self.rand.random_sample()
    }

    pub fn gen_range(&mut self, min: f32, max: f32) -> f32 {
        self.rand.gen_range(min, max)
    }

    /// Returns the next particle id and advances the counter. Call it once
    /// per born particle, never speculatively.
    pub fn next_id(&mut self) -> i32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    pub fn allow_birth(&self) -> bool {
        self.num_particles < self.max_particles
    }

    /// Adjusts the particle count. Births and deaths must be reported
    /// symmetrically.
    pub fn bump_num_particles(&mut self, delta: i64) {
        let n = self.num_particles + delta;
        debug_assert!(n >= 0, "particle count went negative: {}", n);
        self.num_particles = n.max(0);
    }

    pub fn num_particles(&self) -> i64 {
        self.num_particles
    }

    pub fn max_particles(&self) -> i64 {
        self.max_particles
    }

    pub fn set_max_particles(&mut self, max: i64) {
        self.max_particles = max;
    }

    pub fn births_this_frame(&self) -> usize {
        self.births_this_frame
    }

    /// Births one particle into `part`.
    ///
    /// Returns `Ok(None)` when the population limit is reached. The new
    /// point gets position, velocity, a fresh id, (0, lifespan) life, a
    /// zero state and the generating node.
    pub fn birth_particle(&mut self, part: PrimId, pos: Vec3, vel: Vec3, lifespan: f32) -> Result<Option<usize>> {
        if !self.allow_birth() {
            return Ok(None);
        }
        let generator = *self
            .generators
            .get(&part)
            .ok_or(PopError::UnknownPrimitive(part))?;
        match self.detail.get() {
            Some(d) if d.prim_part(part).is_some() => {}
            Some(_) => return Err(PopError::UnknownPrimitive(part)),
            None => return Err(PopError::NoDetail),
        }
        self.refresh_offsets();
        for a in PointAttrib::BASE.iter() {
            if self.offsets.offset(*a).is_none() {
                self.add_attrib(*a)?;
            }
        }
        let id = self.next_id();

        let offsets = &self.offsets;
        let mut d = self.detail.get_mut().ok_or(PopError::NoDetail)?;
        let pt = d.append_point();
        d.position_handle().set_v3(&mut d, pt, pos);
        if let Some(h) = offsets.handle(PointAttrib::Velocity) {
            h.set_v3(&mut d, pt, vel);
        }
        if let Some(h) = offsets.handle(PointAttrib::Id) {
            h.set_i(&mut d, pt, 0, id);
        }
        if let Some(h) = offsets.handle(PointAttrib::Life) {
            h.set_v2(&mut d, pt, [0.0, lifespan]);
        }
        if let Some(h) = offsets.handle(PointAttrib::State) {
            h.set_i(&mut d, pt, 0, 0);
        }
        if let Some(h) = offsets.handle(PointAttrib::Generator) {
            h.set_i(&mut d, pt, 0, generator.0 as i32);
        }
        if let Some(p) = d.prim_part_mut(part) {
            p.push_point(pt);
        }
        drop(d);

        self.bump_num_particles(1);
        self.births_this_frame += 1;
        Ok(Some(pt))
    }

    /// Marks a particle DYING; the next reap removes it.
    pub fn kill_particle(&mut self, pt: usize) -> Result<()> {
        self.refresh_offsets();
        let h = self
            .offsets
            .handle(PointAttrib::State)
            .ok_or_else(|| PopError::AttribMissing(PointAttrib::State.name().to_string()))?;
        let mut d = self.detail.get_mut().ok_or(PopError::NoDetail)?;
        if pt >= d.num_points() {
            return Err(PopError::PointOutOfRange {
                index: pt,
                count: d.num_points(),
            });
        }
        let s = ParticleState::from_bits_retain(h.get_i(&d, pt, 0) as u32) | ParticleState::DYING;
        h.set_i(&mut d, pt, 0, s.bits() as i32);
        Ok(())
    }

    // ---------------------------------------------------------------
    // geometry ownership
    // ---------------------------------------------------------------

    pub fn detail_state(&self) -> DetailState {
        self.detail.state()
    }

    pub fn detail(&self) -> Option<DetailRef<'_>> {
        self.detail.get()
    }

    /// Write access to the detail. A borrowed detail is copied into an
    /// owned one first and the lender's copy is left untouched.
    pub fn detail_mut(&mut self) -> Option<DetailMut<'_>> {
        self.detail.get_mut()
    }

    /// Lends the context a detail it does not own, as a fallback until the
    /// context gets geometry of its own. Refused (false) once any detail
    /// is set.
    pub fn set_ref_detail(&mut self, gdp: SharedDetail) -> bool {
        match self.detail.state() {
            DetailState::Unset => {
                self.detail = DetailSlot::Borrowed(gdp);
                debug!("{}: using reference detail", self.owner);
                true
            }
            s => {
                warn!("{}: set_ref_detail refused, detail already {}", self.owner, s);
                false
            }
        }
    }

    /// Gives the context its own detail, returning a previously owned one.
    /// A borrowed detail is released untouched.
    pub fn set_detail(&mut self, d: Detail) -> Option<Detail> {
        self.offsets.clear_all();
        match std::mem::replace(&mut self.detail, DetailSlot::Owned(d)) {
            DetailSlot::Owned(old) => Some(old),
            _ => None,
        }
    }

    /// Replaces a borrowed detail by a private copy of it. False when there
    /// is nothing borrowed.
    pub fn own_ref_detail(&mut self) -> bool {
        let copy = match &self.detail {
            DetailSlot::Borrowed(s) => s.borrow().clone(),
            _ => return false,
        };
        self.detail = DetailSlot::Owned(copy);
        debug!("{}: reference detail copied into owned detail", self.owner);
        true
    }

    // ---------------------------------------------------------------
    // attribute offsets
    // ---------------------------------------------------------------

    pub fn offsets(&self) -> &OffsetCache {
        &self.offsets
    }

    pub fn offset(&self, a: PointAttrib) -> Option<AttribRef> {
        self.offsets.offset(a)
    }

    pub fn attrib_handle(&self, a: PointAttrib) -> Option<AttribHandle> {
        self.offsets.handle(a)
    }

    /// Binds `a` to `r`; the handle is bound in the same step. False when
    /// `r` does not resolve in the current detail.
    pub fn set_offset(&mut self, a: PointAttrib, r: AttribRef) -> bool {
        match self.detail.get() {
            Some(d) => self.offsets.set_offset(a, &d, r),
            None => false,
        }
    }

    pub fn clear_offset(&mut self, a: PointAttrib) {
        self.offsets.clear_offset(a);
    }

    /// Re-derives every cached offset. Required after anything that may
    /// renumber the detail's attributes, such as a merge.
    pub fn recache_offset(&mut self) {
        match self.detail.get() {
            Some(d) => self.offsets.recache_offset(&d),
            None => self.offsets.clear_all(),
        }
    }

    /// Resolves only offsets currently absent. User attributes are not
    /// considered.
    pub fn cache_missing_internal_attributes(&mut self) -> usize {
        match self.detail.get() {
            Some(d) => self.offsets.cache_missing_internal_attributes(&d),
            None => 0,
        }
    }

    /// Adds a well-known attribute to the detail (or reuses it) and caches
    /// its offset.
    pub fn add_attrib(&mut self, a: PointAttrib) -> Result<AttribRef> {
        let mut d = self.detail.get_mut().ok_or(PopError::NoDetail)?;
        let r = d.add_point_attrib(a.name(), a.storage(), a.tuple_size(), a.defaults())?;
        self.offsets.set_offset(a, &d, r);
        Ok(r)
    }

    /// Adds the attributes every particle carries.
    pub fn add_all_attribs(&mut self) -> Result<()> {
        for a in PointAttrib::BASE.iter() {
            self.add_attrib(*a)?;
        }
        Ok(())
    }

    // ---------------------------------------------------------------
    // user variables
    // ---------------------------------------------------------------

    pub fn user_vars(&self) -> &UserVarTable {
        &self.user_vars
    }

    pub fn user_var_serial(&self) -> u32 {
        self.user_vars.serial()
    }

    /// Forces compiled expressions to resolve their local variables again.
    pub fn bump_user_var_serial(&mut self) {
        self.user_vars.touch();
    }

    /// Adds a user point attribute and registers it as a local variable.
    pub fn add_user_attrib(
        &mut self,
        name: &str,
        storage: Storage,
        tuple_size: usize,
        defaults: &[f32],
    ) -> Result<UserVarId> {
        let mut d = self.detail.get_mut().ok_or(PopError::NoDetail)?;
        d.add_point_attrib(name, storage, tuple_size, defaults)?;
        Ok(self.user_vars.add(name, storage, tuple_size))
    }

    /// Removes a user attribute and its variable. Offsets are recached as
    /// the dictionary was renumbered.
    pub fn remove_user_attrib(&mut self, name: &str) -> bool {
        if self.user_vars.id_of(name).is_none() {
            return false;
        }
        if let Some(mut d) = self.detail.get_mut() {
            d.remove_point_attrib(name);
        }
        self.user_vars.remove(name);
        self.recache_offset();
        true
    }

    // ---------------------------------------------------------------
    // particle primitive registry
    // ---------------------------------------------------------------

    /// The particle primitive of `node`, created on first request.
    pub fn get_prim_part(&mut self, node: NodeId) -> Result<PrimId> {
        if let Some(p) = self.prim_parts.get(&node) {
            return Ok(*p);
        }
        let mut d = self.detail.get_mut().ok_or(PopError::NoDetail)?;
        let p = d.add_prim_part();
        drop(d);
        self.prim_parts.insert(node, p);
        self.generators.insert(p, node);
        if self.initializing {
            self.init_prim_parts.insert(p);
        }
        debug!("{}: {} created {} (init={})", self.owner, node, p, self.initializing);
        Ok(p)
    }

    pub fn has_prim_part(&self, node: NodeId) -> Option<PrimId> {
        self.prim_parts.get(&node).copied()
    }

    pub fn get_generator(&self, part: PrimId) -> Option<NodeId> {
        self.generators.get(&part).copied()
    }

    pub fn is_init_prim_part(&self, part: PrimId) -> bool {
        self.init_prim_parts.contains(&part)
    }

    // ---------------------------------------------------------------
    // particle lists
    // ---------------------------------------------------------------

    pub fn particle_list(&self) -> &ParticleList {
        &self.particle_list
    }

    pub fn particle_list_mut(&mut self) -> &mut ParticleList {
        &mut self.particle_list
    }

    pub fn init_particle_list(&self) -> &ParticleList {
        &self.init_particle_list
    }

    /// Adds `part` once to the list of the current pass: the init list
    /// while initializing, the cook list otherwise. False if already there.
    pub fn add_to_particle_list(&mut self, part: PrimId, pop: NodeId) -> bool {
        let list = if self.initializing {
            &mut self.init_particle_list
        } else {
            &mut self.particle_list
        };
        if list.find(part).is_some() {
            return false;
        }
        list.add(part, pop);
        true
    }

    /// Collects the primitives generated by `sources` into the current
    /// list. Returns how many were added.
    pub fn build_particle_list(&mut self, node: NodeId, sources: &[NodeId]) -> usize {
        let mut added = 0;
        for src in sources {
            if let Some(part) = self.has_prim_part(*src) {
                if self.add_to_particle_list(part, *src) {
                    added += 1;
                }
            }
        }
        if added > 0 {
            debug!("{}: {} gathered {} primitives", self.owner, node, added);
        }
        added
    }

    /// Primitives a node fed by `upstream` acts on: the init-time
    /// primitives, which enter every cook at PREP, then those generated by
    /// the upstream nodes, each once.
    pub fn input_parts(&self, upstream: &[NodeId]) -> Vec<PrimId> {
        let mut parts = self.init_particle_list.parts();
        for node in upstream {
            if let Some(p) = self.has_prim_part(*node) {
                if !parts.contains(&p) {
                    parts.push(p);
                }
            }
        }
        parts
    }

    /// Calls `f` for every point of `parts`.
    pub fn for_each_particle_mut<F>(&mut self, parts: &[PrimId], mut f: F) -> Result<()>
    where
        F: FnMut(&mut Detail, &OffsetCache, usize),
    {
        self.refresh_offsets();
        let offsets = &self.offsets;
        let mut d = self.detail.get_mut().ok_or(PopError::NoDetail)?;
        for part in parts {
            let points = match d.prim_part(*part) {
                Some(p) => p.points().to_vec(),
                None => continue,
            };
            for pt in points {
                f(&mut *d, offsets, pt);
            }
        }
        Ok(())
    }

    // ---------------------------------------------------------------
    // blind data
    // ---------------------------------------------------------------

    pub fn set_blind_data(&mut self, node: NodeId, data: Box<dyn Any>) -> Option<Box<dyn Any>> {
        self.blind.set(node, data)
    }

    pub fn get_blind_data(&self, node: NodeId) -> Option<&dyn Any> {
        self.blind.get(node)
    }

    pub fn blind_data<T: Any>(&self, node: NodeId) -> Option<&T> {
        self.blind.get(node).and_then(|b| b.downcast_ref::<T>())
    }

    pub fn blind_data_mut<T: Any>(&mut self, node: NodeId) -> Option<&mut T> {
        self.blind.get_mut(node).and_then(|b| b.downcast_mut::<T>())
    }

    /// Takes the node's blind data out of the context.
    pub fn steal_blind_data(&mut self, node: NodeId) -> Option<Box<dyn Any>> {
        self.blind.steal(node)
    }

    pub fn has_blind_data(&self, node: NodeId) -> bool {
        self.blind.contains(node)
    }

    // ---------------------------------------------------------------
    // guide geometry
    // ---------------------------------------------------------------

    pub fn guide(&self, node: NodeId) -> Option<&Detail> {
        self.guides.get(&node)
    }

    pub fn num_guides(&self) -> usize {
        self.guides.len()
    }

    pub(crate) fn store_guide(&mut self, node: NodeId, guide: Detail) {
        self.guides.insert(node, guide);
    }

    // ---------------------------------------------------------------
    // copies
    // ---------------------------------------------------------------

    /// An independent context with a private copy of the geometry, the
    /// particle lists retargeted onto it, and the same RNG state, counters,
    /// flags and user variables. Blind data and guides are not copied.
    pub fn duplicate(&self) -> ContextRef {
        let owner = format!("{}_copy", self.owner);
        ContextRef::new(|indirect| {
            let mut c = ContextData::blank(&owner, &self.config, indirect);
            c.time = self.time;
            c.time_inc = self.time_inc;
            c.prev_time_inc = self.prev_time_inc;
            c.default_time_inc = self.default_time_inc;
            if let Some(d) = self.detail.get() {
                c.detail = DetailSlot::Owned(d.clone());
            }
            c.cook_pop = self.cook_pop;
            c.init_pop = self.init_pop;
            c.prim_parts = self.prim_parts.clone();
            c.generators = self.generators.clone();
            c.init_prim_parts = self.init_prim_parts.clone();
            c.needs_init = self.needs_init;
            c.first_cook_pending = self.first_cook_pending;
            if let Some(d) = c.detail.get() {
                c.particle_list.copy_new_gdp(&self.particle_list, &d);
                c.init_particle_list.copy_new_gdp(&self.init_particle_list, &d);
                c.offsets.recache_offset(&d);
            }
            c.rand = self.rand.clone();
            c.seed = self.seed;
            c.first_id = self.first_id;
            c.next_id = self.next_id;
            c.num_particles = self.num_particles;
            c.max_particles = self.max_particles;
            c.births_this_frame = self.births_this_frame;
            c.cook_flags = self.cook_flags;
            c.rule_suppression = self.rule_suppression;
            c.user_vars = self.user_vars.clone();
            c
        })
    }
}

impl Drop for ContextData {
    fn drop(&mut self) {
        // every handle sharing the indirect object reads None from now on
        self.indirect.invalidate();
        debug!(
            "context '{}' destroyed with {} detail",
            self.owner,
            self.detail.state()
        );
    }
}

impl fmt::Debug for ContextData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextData")
            .field("owner", &self.owner)
            .field("time", &self.time)
            .field("time_inc", &self.time_inc)
            .field("detail", &self.detail)
            .field("cook_pop", &self.cook_pop)
            .field("particles", &self.num_particles)
            .field("next_id", &self.next_id)
            .field("cook_flags", &self.cook_flags)
            .field("rule_suppression", &self.rule_suppression)
            .field("user_var_serial", &self.user_vars.serial())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn owned_context() -> ContextRef {
        let c = ContextData::with_config("test", &ContextConfig::default());
        c.borrow_mut().reset(ResetOptions {
            detail: Some(Detail::new()),
            ..Default::default()
        });
        c
    }

    #[test]
    fn test_next_id_and_birth_gate() {
        let c = ContextData::with_config("ids", &ContextConfig::default());
        let mut d = c.borrow_mut();
        d.reset(ResetOptions {
            cook_pop: Some(NodeId(0)),
            detail: Some(Detail::new()),
            seed: 42,
            solve_immediately: true,
            ..Default::default()
        });
        assert_eq!(d.next_id(), 1);
        assert_eq!(d.next_id(), 2);
        assert_eq!(d.next_id(), 3);
        d.bump_num_particles(3);
        assert!(d.allow_birth());
        let max = d.max_particles();
        d.bump_num_particles(max);
        assert!(!d.allow_birth());
    }

    #[test]
    fn test_ref_detail_only_when_unset() {
        let c = ContextData::with_config("ref", &ContextConfig::default());
        let shared = Detail::new().into_shared();
        let mut d = c.borrow_mut();
        assert_eq!(d.detail_state(), DetailState::Unset);
        assert!(d.set_ref_detail(shared.clone()));
        assert_eq!(d.detail_state(), DetailState::Borrowed);
        assert!(!d.set_ref_detail(Detail::new().into_shared()));
        assert!(d.own_ref_detail());
        assert_eq!(d.detail_state(), DetailState::Owned);
        assert!(!d.set_ref_detail(shared));
        assert!(!d.own_ref_detail());
    }

    #[test]
    fn test_reset_keep_geo_continues_ids() {
        let c = owned_context();
        let mut d = c.borrow_mut();
        let p = d.get_prim_part(NodeId(1)).unwrap();
        for _ in 0..3 {
            d.birth_particle(p, [0.0; 3], [0.0; 3], 1.0).unwrap();
        }
        assert_eq!(d.num_particles(), 3);
        d.reset(ResetOptions {
            keep_geo: true,
            ..Default::default()
        });
        assert_eq!(d.num_particles(), 3);
        assert_eq!(d.next_id(), 4);
        // registered again from the generator attribute
        assert_eq!(d.has_prim_part(NodeId(1)), Some(p));
        assert_eq!(d.get_generator(p), Some(NodeId(1)));
        assert!(d.particle_list().is_empty());

        d.reset(ResetOptions::default());
        assert_eq!(d.num_particles(), 0);
        assert_eq!(d.detail().unwrap().num_points(), 0);
        assert_eq!(d.next_id(), 1);
    }

    #[test]
    fn test_birth_sets_attributes() {
        let c = owned_context();
        let mut d = c.borrow_mut();
        let p = d.get_prim_part(NodeId(7)).unwrap();
        let pt = d.birth_particle(p, [1.0, 2.0, 3.0], [0.0, 1.0, 0.0], 2.5).unwrap().unwrap();
        assert_eq!(d.get_generator(p), Some(NodeId(7)));
        let id = d.attrib_handle(PointAttrib::Id).unwrap();
        let life = d.attrib_handle(PointAttrib::Life).unwrap();
        let gen = d.attrib_handle(PointAttrib::Generator).unwrap();
        let g = d.detail().unwrap();
        assert_eq!(g.position_handle().get_v3(&g, pt), [1.0, 2.0, 3.0]);
        assert_eq!(id.get_i(&g, pt, 0), 1);
        assert_eq!(life.get_v2(&g, pt), [0.0, 2.5]);
        assert_eq!(gen.get_i(&g, pt, 0), 7);
        assert_eq!(g.prim_part(p).unwrap().points(), &[pt]);
    }

    #[test]
    fn test_birth_into_unknown_prim() {
        let c = owned_context();
        let e = c
            .borrow_mut()
            .birth_particle(PrimId(9), [0.0; 3], [0.0; 3], 1.0)
            .unwrap_err();
        assert_eq!(e, PopError::UnknownPrimitive(PrimId(9)));
    }

    #[test]
    fn test_prim_registry_memoizes() {
        let c = owned_context();
        let mut d = c.borrow_mut();
        assert!(d.has_prim_part(NodeId(2)).is_none());
        let a = d.get_prim_part(NodeId(2)).unwrap();
        let b = d.get_prim_part(NodeId(2)).unwrap();
        assert_eq!(a, b);
        assert_eq!(d.has_prim_part(NodeId(2)), Some(a));
        assert!(!d.is_init_prim_part(a));
    }

    #[test]
    fn test_prim_part_needs_detail() {
        let c = ContextData::with_config("nodetail", &ContextConfig::default());
        assert_eq!(c.borrow_mut().get_prim_part(NodeId(0)), Err(PopError::NoDetail));
    }

    #[test]
    fn test_blind_data_typed() {
        let c = owned_context();
        let mut d = c.borrow_mut();
        d.set_blind_data(NodeId(1), Box::new(vec![1u8, 2]));
        assert_eq!(d.blind_data::<Vec<u8>>(NodeId(1)).map(|v| v.len()), Some(2));
        assert!(d.blind_data::<String>(NodeId(1)).is_none());
        d.blind_data_mut::<Vec<u8>>(NodeId(1)).unwrap().push(3);
        let b = d.steal_blind_data(NodeId(1)).unwrap();
        assert_eq!(*b.downcast::<Vec<u8>>().unwrap(), vec![1, 2, 3]);
        assert!(!d.has_blind_data(NodeId(1)));
    }

    #[test]
    fn test_user_attrib_serial_and_recache() {
        let c = owned_context();
        let mut d = c.borrow_mut();
        d.add_all_attribs().unwrap();
        let s0 = d.user_var_serial();
        d.add_user_attrib("temperature", Storage::Float, 1, &[20.0]).unwrap();
        assert_eq!(d.user_var_serial(), s0 + 1);
        assert!(d.remove_user_attrib("temperature"));
        assert!(!d.remove_user_attrib("temperature"));
        assert_eq!(d.user_var_serial(), s0 + 2);
        // offsets were recached against the renumbered dictionary
        let v = d.offset(PointAttrib::Velocity).unwrap();
        assert_eq!(d.detail().unwrap().attrib_info(v).unwrap().0, "v");
    }

    #[test]
    fn test_kill_particle_sets_dying() {
        let c = owned_context();
        let mut d = c.borrow_mut();
        let p = d.get_prim_part(NodeId(1)).unwrap();
        let pt = d.birth_particle(p, [0.0; 3], [0.0; 3], 0.0).unwrap().unwrap();
        d.kill_particle(pt).unwrap();
        let h = d.attrib_handle(PointAttrib::State).unwrap();
        let g = d.detail().unwrap();
        assert!(ParticleState::from_bits_retain(h.get_i(&g, pt, 0) as u32).contains(ParticleState::DYING));
        drop(g);
        assert!(matches!(d.kill_particle(10), Err(PopError::PointOutOfRange { .. })));
    }

    #[test]
    fn test_frame_reset_keeps_seed_and_lists() {
        let c = owned_context();
        let mut d = c.borrow_mut();
        let p = d.get_prim_part(NodeId(1)).unwrap();
        d.add_to_particle_list(p, NodeId(1));
        d.birth_particle(p, [0.0; 3], [0.0; 3], 1.0).unwrap();
        d.set_time(1.0, 0.5);
        d.frame_reset();
        assert_eq!(d.prev_time_inc(), 0.5);
        assert_eq!(d.births_this_frame(), 0);
        assert_eq!(d.particle_list().len(), 1);
    }
}
