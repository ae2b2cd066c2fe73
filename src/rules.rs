// PopContext
// copyright zipxing@hotmail.com 2022～2025

//! Built-in per-particle rules, run after the nodes of a cook.
//!
//! Order per particle: accel into velocity, drag, position, rotation,
//! age, death. DYING particles are left alone; STOPPED and STUCK ones
//! only age. Each rule is skipped when its `RuleSuppression` bit is set,
//! and VELOCITY suppresses both ACCEL and DRAG. Rules whose attribute is
//! absent from the offset cache are skipped silently.

use crate::{
    attrib_cache::{OffsetCache, PointAttrib},
    context::{ParticleState, RuleSuppression},
    error::Result,
    geo::{Detail, PrimId},
    util::{quat_integrate, v3_add_scaled, v3_scale},
};

fn state_of(d: &Detail, offsets: &OffsetCache, pt: usize) -> ParticleState {
    match offsets.handle(PointAttrib::State) {
        Some(h) => ParticleState::from_bits_retain(h.get_i(d, pt, 0) as u32),
        None => ParticleState::empty(),
    }
}

/// Applies the rules to every point of `parts`. Returns how many particles
/// were updated.
pub fn apply_rules(
    d: &mut Detail,
    offsets: &OffsetCache,
    parts: &[PrimId],
    mask: RuleSuppression,
    dt: f32,
) -> usize {
    let p = d.position_handle();
    let v = offsets.handle(PointAttrib::Velocity);
    let accel = offsets.handle(PointAttrib::Accel);
    let drag = offsets.handle(PointAttrib::Drag);
    let orient = offsets.handle(PointAttrib::Orient);
    let w = offsets.handle(PointAttrib::AngVel);
    let life = offsets.handle(PointAttrib::Life);
    let state = offsets.handle(PointAttrib::State);

    let no_vel = mask.contains(RuleSuppression::VELOCITY);
    let mut count = 0;
    for part in parts {
        let points = match d.prim_part(*part) {
            Some(pp) => pp.points().to_vec(),
            None => continue,
        };
        for pt in points {
            let s = state_of(d, offsets, pt);
            if s.contains(ParticleState::DYING) {
                continue;
            }
            let frozen = s.intersects(ParticleState::STOPPED | ParticleState::STUCK);

            if !frozen {
                if let Some(vh) = v {
                    let mut vel = vh.get_v3(d, pt);
                    if !no_vel && !mask.contains(RuleSuppression::ACCEL) {
                        if let Some(ah) = accel {
                            vel = v3_add_scaled(vel, ah.get_v3(d, pt), dt);
                            // forces accumulate again next cook
                            ah.set_v3(d, pt, [0.0; 3]);
                        }
                    }
                    if !no_vel && !mask.contains(RuleSuppression::DRAG) {
                        if let Some(dh) = drag {
                            let k = (1.0 - dh.get_f(d, pt, 0) * dt).max(0.0);
                            vel = v3_scale(vel, k);
                        }
                    }
                    if !no_vel {
                        vh.set_v3(d, pt, vel);
                    }
                    if !mask.contains(RuleSuppression::POSITION) {
                        let pos = p.get_v3(d, pt);
                        p.set_v3(d, pt, v3_add_scaled(pos, vel, dt));
                    }
                }
                if !mask.contains(RuleSuppression::ROTATION) {
                    if let (Some(oh), Some(wh)) = (orient, w) {
                        let q = quat_integrate(oh.get_v4(d, pt), wh.get_v3(d, pt), dt);
                        oh.set_v4(d, pt, q);
                    }
                }
            }

            if let Some(lh) = life {
                let [mut age, span] = lh.get_v2(d, pt);
                if !mask.contains(RuleSuppression::AGE) {
                    age += dt;
                    lh.set_f(d, pt, 0, age);
                }
                if !mask.contains(RuleSuppression::DEATH) && span > 0.0 && age >= span {
                    if let Some(sh) = state {
                        sh.set_i(d, pt, 0, (s | ParticleState::DYING).bits() as i32);
                    }
                }
            }
            count += 1;
        }
    }
    count
}

/// Deletes the DYING points of `parts`. Returns the number removed.
pub fn reap(d: &mut Detail, offsets: &OffsetCache, parts: &[PrimId]) -> Result<usize> {
    if offsets.handle(PointAttrib::State).is_none() {
        return Ok(0);
    }
    let mut dead = vec![];
    for part in parts {
        if let Some(pp) = d.prim_part(*part) {
            for pt in pp.points() {
                if state_of(d, offsets, *pt).contains(ParticleState::DYING) {
                    dead.push(*pt);
                }
            }
        }
    }
    if dead.is_empty() {
        return Ok(0);
    }
    d.delete_points(&dead)
}
