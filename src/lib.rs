// PopContext
// copyright zipxing@hotmail.com 2022～2025

//! PopContext is the cooking context of a particle operator (POP) network.
//!
//! A network of particle operators is cooked once per timestep against one
//! shared, mutable `ContextData`: current time, the geometry detail, an
//! attribute offset cache, the particle primitive registry, the particle
//! lists of the cook, a private seeded random stream, id and population
//! counters, per-node blind data, cook-control flags and rule suppression.
//!
//! Contexts are reference counted through `ContextRef`; the last release
//! destroys the context together with the detail it owns. Code that must
//! not keep a context alive holds a `ContextDataHandle` instead, which
//! reads `None` once the context is gone. Compiled expressions keep a
//! `UserVarResolveInfo` to know when their local-variable bindings went
//! stale.
//!
//! # Example
//!
//! ```ignore
//! let mut net = PopNetwork::new();
//! let src = net.add_node(Box::new(SourcePop::new("source1", 100.0)));
//! let gravity = net.add_node(Box::new(ForcePop::new("gravity", [0.0, -9.8, 0.0])));
//! net.connect(src, gravity)?;
//!
//! let ctx = ContextData::new("popnet1");
//! ctx.borrow_mut().reset(ResetOptions {
//!     cook_pop: Some(gravity),
//!     seed: 42,
//!     solve_immediately: true,
//!     ..Default::default()
//! });
//! for frame in 0..48 {
//!     let mut c = ctx.borrow_mut();
//!     c.frame_reset();
//!     c.cook(&mut net, frame as f32 / 24.0)?;
//! }
//! ```

/// well-known particle attributes and the offset cache over them
pub mod attrib_cache;

/// frame cache of cooked contexts
pub mod cache;

/// process-wide context defaults, loaded from toml
pub mod config;

/// ContextData: the shared state of one cook
pub mod context;

/// error type
pub mod error;

/// local-variable bindings of compiled expressions
pub mod expr;

/// minimal geometry model: details, point attributes, particle primitives
pub mod geo;

/// ContextRef and the weak ContextDataHandle
pub mod handle;

/// log
pub mod log;

/// particle operator interface
pub mod node;

/// stock operators: source, force, kill
pub mod nodes;

/// operator graph and cook order
pub mod network;

/// ordered (particle primitive, operator) pairs
pub mod particle_list;

/// built-in per-particle rules and reaping
pub mod rules;

/// RNG and vector helpers
pub mod util;

pub use attrib_cache::{CachedAttribute, OffsetCache, PointAttrib};
pub use cache::PopCache;
pub use config::{get_context_config, init_context_config, ContextConfig};
pub use context::{
    CookFlags, ContextData, DetailState, ParticleState, ResetOptions, RuleSuppression,
    UserVarResolveInfo,
};
pub use error::{PopError, Result};
pub use expr::VarBindings;
pub use geo::{AttribHandle, AttribRef, Detail, PrimId, SharedDetail, Storage};
pub use handle::{ContextDataHandle, ContextRef};
pub use network::PopNetwork;
pub use node::{CookSite, NodeId, PopNode};
pub use nodes::{ForcePop, KillPop, SourcePop};
pub use particle_list::{ParticleList, ParticleNode};
