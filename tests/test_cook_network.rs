use pop_context::{
    ContextConfig, ContextData, ContextRef, CookFlags, Detail, DetailState, ForcePop, KillPop,
    NodeId, PointAttrib, PopCache, PopError, PopNetwork, ResetOptions, RuleSuppression, SourcePop,
};

fn cfg() -> ContextConfig {
    ContextConfig {
        time_inc: 0.25,
        ..Default::default()
    }
}

/// source -> gravity -> kill
fn network() -> (PopNetwork, NodeId, NodeId, NodeId) {
    let mut net = PopNetwork::new();
    let mut src = SourcePop::new("source", 8.0);
    src.velocity = [1.0, 0.0, 0.0];
    let src = net.add_node(Box::new(src));
    let gravity = net.add_node(Box::new(ForcePop::new("gravity", [0.0, -8.0, 0.0])));
    let kill = net.add_node(Box::new(KillPop::new("kill", 0.6)));
    net.connect(src, gravity).unwrap();
    net.connect(gravity, kill).unwrap();
    (net, src, gravity, kill)
}

fn start(cook_pop: NodeId, solve_immediately: bool) -> ContextRef {
    let c = ContextData::with_config("popnet", &cfg());
    c.borrow_mut().reset(ResetOptions {
        cook_pop: Some(cook_pop),
        seed: 7,
        solve_immediately,
        ..Default::default()
    });
    c
}

#[test]
fn test_first_cook_records_time_only() {
    let (mut net, _, _, kill) = network();
    let c = start(kill, false);
    let mut ctx = c.borrow_mut();
    ctx.cook(&mut net, 0.0).unwrap();
    assert_eq!(ctx.num_particles(), 0);
    assert_eq!(ctx.detail_state(), DetailState::Unset);
    ctx.cook(&mut net, 0.25).unwrap();
    assert_eq!(ctx.num_particles(), 2);
    assert_eq!(ctx.time_inc(), 0.25);
}

#[test]
fn test_cook_moves_and_kills() {
    let (mut net, src, _, kill) = network();
    let c = start(kill, true);
    let mut ctx = c.borrow_mut();

    ctx.cook(&mut net, 0.0).unwrap();
    assert_eq!(ctx.num_particles(), 2);
    let part = ctx.has_prim_part(src).unwrap();
    assert_eq!(ctx.get_generator(part), Some(src));
    assert_eq!(ctx.particle_list().len(), 1);
    {
        let v = ctx.attrib_handle(PointAttrib::Velocity).unwrap();
        let d = ctx.detail().unwrap();
        // v = (1, 0, 0) + (0, -8, 0) * 0.25
        assert_eq!(v.get_v3(&d, 0), [1.0, -2.0, 0.0]);
        assert_eq!(d.position_handle().get_v3(&d, 0), [0.25, -0.5, 0.0]);
    }

    // the first pair reaches 0.75 on the second cook below and is killed
    // and reaped during the third
    for f in 1..=3 {
        ctx.frame_reset();
        ctx.cook(&mut net, f as f32 * 0.25).unwrap();
    }
    assert_eq!(ctx.num_particles(), 6);
    assert_eq!(ctx.detail().unwrap().num_points(), 6);
    assert_eq!(ctx.births_this_frame(), 2);
}

#[test]
fn test_flags_gate_phases() {
    let (mut net, _, _, kill) = network();
    let c = start(kill, true);
    let mut ctx = c.borrow_mut();
    ctx.set_do_cook(false);
    ctx.cook(&mut net, 0.0).unwrap();
    assert_eq!(ctx.num_particles(), 0);

    ctx.set_cook_flags(CookFlags::default() | CookFlags::COOK_FIRST);
    ctx.set_rule_suppression(RuleSuppression::POSITION);
    ctx.cook(&mut net, 0.25).unwrap();
    assert_eq!(ctx.num_particles(), 2);
    let d = ctx.detail().unwrap();
    assert_eq!(d.position_handle().get_v3(&d, 0), [0.0, 0.0, 0.0]);
}

#[test]
fn test_init_pass_runs_once() {
    let mut net = PopNetwork::new();
    let seed_src = net.add_node(Box::new(SourcePop::new("init", 12.0)));
    let kill = net.add_node(Box::new(KillPop::new("kill", 100.0)));
    let c = ContextData::with_config("init", &cfg());
    let mut ctx = c.borrow_mut();
    ctx.reset(ResetOptions {
        cook_pop: Some(kill),
        init_pop: Some(seed_src),
        solve_immediately: true,
        ..Default::default()
    });
    ctx.cook(&mut net, 0.0).unwrap();
    ctx.cook(&mut net, 0.25).unwrap();
    // 12 * 0.25 births in the single init pass only
    assert_eq!(ctx.num_particles(), 3);
    let part = ctx.has_prim_part(seed_src).unwrap();
    assert!(ctx.is_init_prim_part(part));
    assert_eq!(ctx.init_particle_list().len(), 1);
    // init particles are simulated every cook
    assert_eq!(ctx.particle_list().parts(), vec![part]);
}

#[test]
fn test_cook_takes_ownership_of_borrowed_detail() {
    let (mut net, _, _, kill) = network();
    let shared = Detail::new().into_shared();
    let c = ContextData::with_config("borrow", &cfg());
    let mut ctx = c.borrow_mut();
    assert!(ctx.set_ref_detail(shared.clone()));
    ctx.reset(ResetOptions {
        cook_pop: Some(kill),
        keep_geo: true,
        solve_immediately: true,
        ..Default::default()
    });
    assert_eq!(ctx.detail_state(), DetailState::Borrowed);
    ctx.cook(&mut net, 0.0).unwrap();
    assert_eq!(ctx.detail_state(), DetailState::Owned);
    assert_eq!(shared.borrow().num_points(), 0);
    assert_eq!(ctx.detail().unwrap().num_points(), 2);
}

#[test]
fn test_cook_errors() {
    let (mut net, _, _, _) = network();
    let c = ContextData::with_config("errors", &cfg());
    let mut ctx = c.borrow_mut();
    assert_eq!(ctx.cook(&mut net, 0.0), Err(PopError::NoCookPop));
    ctx.reset(ResetOptions {
        cook_pop: Some(NodeId(42)),
        ..Default::default()
    });
    assert_eq!(ctx.cook(&mut net, 0.0), Err(PopError::UnknownNode(NodeId(42))));
}

#[test]
fn test_guides_leave_clock_alone() {
    let (mut net, src, gravity, kill) = network();
    let c = start(kill, true);
    let mut ctx = c.borrow_mut();
    ctx.cook(&mut net, 0.0).unwrap();
    ctx.cook_guide(&mut net, 5.0).unwrap();
    assert_eq!(ctx.time(), 0.0);
    assert_eq!(ctx.num_particles(), 2);
    assert_eq!(ctx.guide(src).unwrap().num_points(), 1);
    assert_eq!(ctx.guide(gravity).unwrap().num_points(), 2);
    assert!(ctx.guide(kill).is_none());
    ctx.frame_reset();
    assert_eq!(ctx.num_guides(), 0);
}

#[test]
fn test_cache_fork_resumes_identically() {
    let (mut net, _, _, kill) = network();
    let c = start(kill, true);
    let mut cache = PopCache::new(4);
    c.borrow_mut().cook(&mut net, 0.0).unwrap();
    // a snapshot, not the live context
    cache.store(0, &c.borrow().duplicate());

    c.borrow_mut().cook(&mut net, 0.25).unwrap();
    let fork = cache.fork(0).unwrap();
    fork.borrow_mut().cook(&mut net, 0.25).unwrap();

    let (a, b) = (c.borrow(), fork.borrow());
    assert_eq!(a.num_particles(), b.num_particles());
    let (da, db) = (a.detail().unwrap(), b.detail().unwrap());
    assert_eq!(*da, *db);
}

#[test]
fn test_kept_geometry_keeps_simulating() {
    let mut net = PopNetwork::new();
    let mut s = SourcePop::new("source", 4.0);
    s.velocity = [1.0, 0.0, 0.0];
    let src = net.add_node(Box::new(s));
    let c = start(src, true);
    let mut ctx = c.borrow_mut();
    ctx.cook(&mut net, 0.0).unwrap();
    let part = ctx.has_prim_part(src).unwrap();

    ctx.reset(ResetOptions {
        cook_pop: Some(src),
        keep_geo: true,
        solve_immediately: true,
        ..Default::default()
    });
    assert_eq!(ctx.num_particles(), 1);
    assert_eq!(ctx.has_prim_part(src), Some(part));
    assert_eq!(ctx.get_generator(part), Some(src));

    ctx.cook(&mut net, 0.0).unwrap();
    ctx.cook(&mut net, 0.25).unwrap();
    assert_eq!(ctx.num_particles(), 3);
    let d = ctx.detail().unwrap();
    assert_eq!(d.prim_parts().count(), 1);
    assert_eq!(d.prim_part(part).unwrap().points().len(), 3);
    // 0.25 from the first run, two more steps after the reset
    assert_eq!(d.position_handle().get_v3(&d, 0), [0.75, 0.0, 0.0]);
}
