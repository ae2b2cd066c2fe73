// PopContext
// copyright zipxing@hotmail.com 2022～2025

//! Stock particle operators: a source that births particles, a force
//! that accumulates acceleration and a killer that retires old particles.

use crate::{
    attrib_cache::PointAttrib,
    context::{ContextData, ParticleState},
    error::Result,
    geo::Detail,
    node::{CookSite, PopNode},
    util::{v3_add_scaled, Vec3},
};

/// Births `rate` particles per second around `origin`.
///
/// The fractional part of a cook's births carries over to the next cook
/// through the context's blind data, so it restarts with every reset.
#[derive(Debug, Clone)]
pub struct SourcePop {
    pub name: String,
    pub rate: f32,
    pub origin: Vec3,
    /// half extent of the random box around `origin`
    pub jitter: f32,
    pub velocity: Vec3,
    pub lifespan: f32,
    /// lifespan is drawn from lifespan +/- variance
    pub life_variance: f32,
}

impl SourcePop {
    pub fn new(name: &str, rate: f32) -> Self {
        Self {
            name: name.to_string(),
            rate,
            origin: [0.0; 3],
            jitter: 0.0,
            velocity: [0.0; 3],
            lifespan: 0.0,
            life_variance: 0.0,
        }
    }
}

impl PopNode for SourcePop {
    fn name(&self) -> &str {
        &self.name
    }

    fn cook_pop(&mut self, site: CookSite, ctx: &mut ContextData) -> Result<()> {
        let part = ctx.get_prim_part(site.id)?;
        ctx.add_to_particle_list(part, site.id);
        let residue = ctx.blind_data::<f32>(site.id).copied().unwrap_or(0.0);
        let needed = self.rate * ctx.time_inc() + residue;
        let count = needed.floor().max(0.0);
        ctx.set_blind_data(site.id, Box::new(needed - count));

        let j = self.jitter;
        for _ in 0..count as usize {
            if !ctx.allow_birth() {
                break;
            }
            let offset = [ctx.gen_range(-j, j), ctx.gen_range(-j, j), ctx.gen_range(-j, j)];
            let pos = v3_add_scaled(self.origin, offset, 1.0);
            let var = self.life_variance;
            let life = (self.lifespan + ctx.gen_range(-var, var)).max(0.0);
            ctx.birth_particle(part, pos, self.velocity, life)?;
        }
        Ok(())
    }

    fn cook_guide(&mut self, _site: CookSite, _ctx: &ContextData, guide: &mut Detail) -> Result<()> {
        let pt = guide.append_point();
        guide.position_handle().set_v3(guide, pt, self.origin);
        Ok(())
    }
}

/// Adds `force / mass` to the acceleration of every particle coming from
/// the node's inputs.
#[derive(Debug, Clone)]
pub struct ForcePop {
    pub name: String,
    pub force: Vec3,
}

impl ForcePop {
    pub fn new(name: &str, force: Vec3) -> Self {
        Self {
            name: name.to_string(),
            force,
        }
    }
}

impl PopNode for ForcePop {
    fn name(&self) -> &str {
        &self.name
    }

    fn cook_pop(&mut self, site: CookSite, ctx: &mut ContextData) -> Result<()> {
        ctx.build_particle_list(site.id, site.upstream);
        ctx.add_attrib(PointAttrib::Accel)?;
        let parts = ctx.input_parts(site.upstream);
        let force = self.force;
        ctx.for_each_particle_mut(&parts, |d, offsets, pt| {
            let Some(accel) = offsets.handle(PointAttrib::Accel) else {
                return;
            };
            let inv_mass = match offsets.handle(PointAttrib::Mass) {
                Some(m) if m.get_f(d, pt, 0) > 0.0 => 1.0 / m.get_f(d, pt, 0),
                _ => 1.0,
            };
            let a = accel.get_v3(d, pt);
            accel.set_v3(d, pt, v3_add_scaled(a, force, inv_mass));
        })
    }

    fn cook_guide(&mut self, _site: CookSite, _ctx: &ContextData, guide: &mut Detail) -> Result<()> {
        // arrow from the origin along the force
        let p = guide.position_handle();
        let a = guide.append_point();
        let b = guide.append_point();
        p.set_v3(guide, a, [0.0; 3]);
        p.set_v3(guide, b, self.force);
        let prim = guide.add_prim_part();
        if let Some(pp) = guide.prim_part_mut(prim) {
            pp.push_point(a);
            pp.push_point(b);
        }
        Ok(())
    }
}

/// Marks particles coming from the node's inputs DYING once their age
/// reaches `max_age`.
#[derive(Debug, Clone)]
pub struct KillPop {
    pub name: String,
    pub max_age: f32,
}

impl KillPop {
    pub fn new(name: &str, max_age: f32) -> Self {
        Self {
            name: name.to_string(),
            max_age,
        }
    }
}

impl PopNode for KillPop {
    fn name(&self) -> &str {
        &self.name
    }

    fn cook_pop(&mut self, site: CookSite, ctx: &mut ContextData) -> Result<()> {
        ctx.build_particle_list(site.id, site.upstream);
        ctx.add_attrib(PointAttrib::State)?;
        let parts = ctx.input_parts(site.upstream);
        let max_age = self.max_age;
        ctx.for_each_particle_mut(&parts, |d, offsets, pt| {
            let (Some(life), Some(state)) = (offsets.handle(PointAttrib::Life), offsets.handle(PointAttrib::State)) else {
                return;
            };
            if life.get_f(d, pt, 0) >= max_age {
                let s = ParticleState::from_bits_retain(state.get_i(d, pt, 0) as u32) | ParticleState::DYING;
                state.set_i(d, pt, 0, s.bits() as i32);
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::ContextConfig,
        context::ResetOptions,
        network::PopNetwork,
        node::NodeId,
    };

    #[test]
    fn test_source_respects_max_particles() {
        let mut net = PopNetwork::new();
        let src = net.add_node(Box::new(SourcePop::new("src", 40.0)));
        let cfg = ContextConfig {
            max_particles: 4,
            time_inc: 0.25,
            ..Default::default()
        };
        let c = ContextData::with_config("cap", &cfg);
        let mut ctx = c.borrow_mut();
        ctx.reset(ResetOptions {
            cook_pop: Some(src),
            solve_immediately: true,
            ..Default::default()
        });
        ctx.cook(&mut net, 0.0).unwrap();
        assert_eq!(ctx.num_particles(), 4);
        assert_eq!(ctx.births_this_frame(), 4);
    }

    #[test]
    fn test_source_carries_residue() {
        let mut net = PopNetwork::new();
        let src = net.add_node(Box::new(SourcePop::new("src", 2.0)));
        let cfg = ContextConfig {
            time_inc: 0.25,
            ..Default::default()
        };
        let c = ContextData::with_config("residue", &cfg);
        let mut ctx = c.borrow_mut();
        ctx.reset(ResetOptions {
            cook_pop: Some(src),
            solve_immediately: true,
            ..Default::default()
        });
        // 0.5 per cook
        ctx.cook(&mut net, 0.0).unwrap();
        assert_eq!(ctx.num_particles(), 0);
        assert_eq!(ctx.blind_data::<f32>(src), Some(&0.5));
        ctx.cook(&mut net, 0.25).unwrap();
        assert_eq!(ctx.num_particles(), 1);
    }

    #[test]
    fn test_force_scales_by_mass() {
        let mut net = PopNetwork::new();
        let src = net.add_node(Box::new(SourcePop::new("src", 4.0)));
        let force = net.add_node(Box::new(ForcePop::new("f", [0.0, -4.0, 0.0])));
        net.connect(src, force).unwrap();
        let cfg = ContextConfig {
            time_inc: 0.25,
            ..Default::default()
        };
        let c = ContextData::with_config("force", &cfg);
        let mut ctx = c.borrow_mut();
        ctx.reset(ResetOptions {
            cook_pop: Some(force),
            detail: Some(Detail::new()),
            solve_immediately: true,
            ..Default::default()
        });
        ctx.add_attrib(PointAttrib::Mass).unwrap();
        // suppress rules so the accumulated accel stays visible
        ctx.set_do_apply_rules(false);
        ctx.cook(&mut net, 0.0).unwrap();
        let mass = ctx.attrib_handle(PointAttrib::Mass).unwrap();
        let accel = ctx.attrib_handle(PointAttrib::Accel).unwrap();
        let d = ctx.detail().unwrap();
        assert_eq!(mass.get_f(&d, 0, 0), 1.0);
        assert_eq!(accel.get_v3(&d, 0), [0.0, -4.0, 0.0]);
    }

    #[test]
    fn test_force_only_reaches_its_inputs() {
        let mut net = PopNetwork::new();
        let stray = net.add_node(Box::new(SourcePop::new("stray", 4.0)));
        let fed = net.add_node(Box::new(SourcePop::new("fed", 4.0)));
        let force = net.add_node(Box::new(ForcePop::new("f", [0.0, -4.0, 0.0])));
        let sink = net.add_node(Box::new(KillPop::new("sink", 100.0)));
        net.connect(fed, force).unwrap();
        net.connect(stray, sink).unwrap();
        net.connect(force, sink).unwrap();
        let cfg = ContextConfig {
            time_inc: 0.25,
            ..Default::default()
        };
        let c = ContextData::with_config("reach", &cfg);
        let mut ctx = c.borrow_mut();
        ctx.reset(ResetOptions {
            cook_pop: Some(sink),
            solve_immediately: true,
            ..Default::default()
        });
        ctx.set_do_apply_rules(false);
        ctx.cook(&mut net, 0.0).unwrap();

        let accel = ctx.attrib_handle(PointAttrib::Accel).unwrap();
        let stray_pt = ctx.detail().unwrap().prim_part(ctx.has_prim_part(stray).unwrap()).unwrap().points()[0];
        let fed_pt = ctx.detail().unwrap().prim_part(ctx.has_prim_part(fed).unwrap()).unwrap().points()[0];
        let d = ctx.detail().unwrap();
        assert_eq!(accel.get_v3(&d, stray_pt), [0.0, 0.0, 0.0]);
        assert_eq!(accel.get_v3(&d, fed_pt), [0.0, -4.0, 0.0]);
        // the sink sees both sources through the force
        assert_eq!(ctx.particle_list().len(), 2);
    }

    #[test]
    fn test_guides() {
        let mut src = SourcePop::new("src", 1.0);
        src.origin = [1.0, 2.0, 3.0];
        let c = ContextData::with_config("guide", &ContextConfig::default());
        let ctx = c.borrow();
        let site = CookSite {
            id: NodeId(0),
            inputs: &[],
            upstream: &[],
        };
        let mut g = Detail::new();
        src.cook_guide(site, &ctx, &mut g).unwrap();
        assert_eq!(g.position_handle().get_v3(&g, 0), [1.0, 2.0, 3.0]);

        let mut f = ForcePop::new("f", [0.0, 1.0, 0.0]);
        let mut g = Detail::new();
        f.cook_guide(site, &ctx, &mut g).unwrap();
        assert_eq!(g.num_points(), 2);
        assert_eq!(g.prim_parts().count(), 1);
    }
}
