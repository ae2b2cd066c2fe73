use pop_context::{
    ContextConfig, ContextData, ContextDataHandle, Detail, ResetOptions, Storage,
    UserVarResolveInfo, VarBindings,
};

fn context(name: &str) -> pop_context::ContextRef {
    let c = ContextData::with_config(name, &ContextConfig::default());
    c.borrow_mut().reset(ResetOptions {
        detail: Some(Detail::new()),
        ..Default::default()
    });
    c
}

#[test]
fn test_all_copies_invalidated_together() {
    let c = context("shared");
    let h1 = c.handle();
    let h2 = h1.clone();
    let mut h3 = ContextDataHandle::new();
    h3.bind(&c.borrow());
    assert!(h1.is_live() && h2.is_live() && h3.is_live());
    assert_eq!(c.ref_count(), 1);

    drop(c);
    assert!(h1.get_context_data().is_none());
    assert!(h2.get_context_data().is_none());
    assert!(h3.get_context_data().is_none());

    // still a valid, copyable handle
    let h4 = h3.clone();
    assert!(h4.is_bound());
    assert!(!h4.is_live());
}

#[test]
fn test_handle_never_revives() {
    let c = context("first");
    let mut h = c.handle();
    drop(c);
    let d = context("second");
    assert!(h.get_context_data().is_none());
    h.bind(&d.borrow());
    assert!(h.get_context_data().unwrap().ptr_eq(&d));
    h.unbind();
    assert!(h.get_context_data().is_none());
    assert_eq!(d.ref_count(), 1);
}

#[test]
fn test_resolve_info_round_trip() {
    let c = context("vars");
    let mut ri = UserVarResolveInfo::new();
    assert!(ri.update(&c.borrow()));
    assert!(!ri.update(&c.borrow()));

    c.borrow_mut().bump_user_var_serial();
    assert!(ri.update(&c.borrow()));
    assert!(!ri.update(&c.borrow()));

    c.borrow_mut()
        .add_user_attrib("density", Storage::Float, 1, &[1.0])
        .unwrap();
    assert!(ri.update(&c.borrow()));
    assert_eq!(ri.serial(), c.borrow().user_var_serial());
}

#[test]
fn test_resolve_info_after_destroy() {
    let a = context("a");
    let mut ri = UserVarResolveInfo::new();
    assert!(ri.update(&a.borrow()));
    drop(a);
    // a new context at serial 0 is still a different context
    let b = context("b");
    assert!(ri.update(&b.borrow()));
    assert!(!ri.update(&b.borrow()));
}

#[test]
fn test_var_bindings_follow_user_vars() {
    let c = context("expr");
    let mut vars = VarBindings::new(&["density", "heat"]);
    assert!(vars.resolve(&c.borrow()));
    assert!(!vars.is_bound(0));

    {
        let mut ctx = c.borrow_mut();
        ctx.add_user_attrib("density", Storage::Float, 1, &[2.5]).unwrap();
        ctx.add_user_attrib("heat", Storage::Int, 1, &[7.0]).unwrap();
        ctx.detail_mut().unwrap().append_point();
    }
    assert!(vars.resolve(&c.borrow()));
    assert!(!vars.resolve(&c.borrow()));
    assert_eq!(vars.value(&c.borrow(), 0, 0), Some(2.5));
    assert_eq!(vars.value(&c.borrow(), 1, 0), Some(7.0));

    assert!(c.borrow_mut().remove_user_attrib("density"));
    // stale until resolved again
    assert_eq!(vars.value(&c.borrow(), 1, 0), None);
    assert!(vars.resolve(&c.borrow()));
    assert!(!vars.is_bound(0));
    assert_eq!(vars.value(&c.borrow(), 1, 0), Some(7.0));
    assert_eq!(vars.resolve_count(), 3);
}
